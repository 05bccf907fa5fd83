use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use webprobe::engine::navigation_planner::NavigationPlanner;
use webprobe::engine::url_discovery::UrlDiscoveryService;
use webprobe::events::{spawn_event_logger, EventBus};
use webprobe::providers::llm::MockLLMProvider;
use webprobe::providers::{
    AnthropicProvider, BrowserPort, HttpBrowser, HttpBrowserFactory, LLMProvider,
    LlmDecisionOracle, OllamaProvider, OpenAIProvider,
};
use webprobe::types::NavigationState;
use webprobe::{AgentSupervisor, Config};

#[derive(Parser)]
#[command(name = "webprobe")]
#[command(about = "Autonomous LLM-driven web exploration and bug discovery", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "Config file (.toml, .yaml or .yml)")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explore one or more start pages with a pool of agents
    Explore {
        #[arg(required = true, help = "Start URLs")]
        urls: Vec<String>,
        #[arg(long)]
        objective: Option<String>,
        #[arg(long)]
        max_steps: Option<u32>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long, help = "anthropic, openai, ollama or mock")]
        provider: Option<String>,
        #[arg(long, help = "Write the full report as JSON")]
        output: Option<PathBuf>,
    },
    /// Scan one page and print the navigation plan for its links
    Discover {
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Explore {
            urls,
            objective,
            max_steps,
            concurrency,
            provider,
            output,
        } => {
            if let Some(objective) = objective {
                config.exploration.objective = objective;
            }
            if let Some(max_steps) = max_steps {
                config.exploration.max_steps = max_steps;
                config.supervisor.max_steps_per_agent = max_steps;
            }
            if let Some(concurrency) = concurrency {
                config.supervisor.max_concurrency = concurrency;
            }
            if let Some(provider) = provider {
                config.llm_provider = provider;
            }
            config.validate()?;
            explore(&config, &urls, output).await?
        }
        Commands::Discover { url } => discover(&config, &url).await?,
    }

    Ok(())
}

fn build_llm(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    let provider: Arc<dyn LLMProvider> = match config.llm_provider.as_str() {
        "anthropic" => {
            let key = config
                .anthropic_api_key
                .clone()
                .ok_or_else(|| anyhow!("ANTHROPIC_API_KEY is not set"))?;
            let provider = AnthropicProvider::new(key);
            Arc::new(match &config.model {
                Some(model) => provider.with_model(model.clone()),
                None => provider,
            })
        }
        "openai" => {
            let key = config
                .openai_api_key
                .clone()
                .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))?;
            let provider = OpenAIProvider::new(key);
            Arc::new(match &config.model {
                Some(model) => provider.with_model(model.clone()),
                None => provider,
            })
        }
        "ollama" => Arc::new(OllamaProvider::new(None, config.model.clone())),
        "mock" => Arc::new(MockLLMProvider::with_response(
            r#"{"action": "done", "reasoning": "mock provider explores nothing"}"#.to_string(),
        )),
        other => return Err(anyhow!("unknown llm provider '{}'", other)),
    };
    Ok(provider)
}

async fn explore(config: &Config, urls: &[String], output: Option<PathBuf>) -> Result<()> {
    let oracle = Arc::new(LlmDecisionOracle::new(build_llm(config)?));
    let browsers = Arc::new(HttpBrowserFactory::new(config.browser.clone()));
    let bus = EventBus::default();
    let logger = spawn_event_logger(&bus);

    let supervisor = AgentSupervisor::new(
        config.supervisor.clone(),
        config.exploration.clone(),
        browsers,
        oracle,
    )
    .with_events(Arc::new(bus.clone()));

    println!("Exploring {} start page(s): {}", urls.len(), config.exploration.objective);
    let report = supervisor.run(urls).await?;

    println!(
        "\nStopped ({:?}) after {} steps across {} agent runs ({} failed)",
        report.stopped_reason, report.total_steps, report.agents_run, report.tasks_failed
    );
    println!("Visited {} page(s)", report.visited_urls.len());
    if report.findings.is_empty() {
        println!("No findings.");
    } else {
        println!("Findings:");
        for finding in &report.findings {
            println!("  {}", finding.summary_line());
        }
    }

    if let Some(path) = output {
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        println!("Report written to {}", path.display());
    }

    drop(supervisor);
    drop(bus);
    let _ = logger.await;
    Ok(())
}

async fn discover(config: &Config, url: &str) -> Result<()> {
    let browser = HttpBrowser::new(&config.browser)?;
    browser.initialize().await?;
    let navigated = browser.navigate(url).await?;
    if !navigated.success {
        return Err(anyhow!(
            "could not load {}: {}",
            url,
            navigated.error.unwrap_or_default()
        ));
    }

    let mut discovery = UrlDiscoveryService::new(config.exploration.url_discovery.clone())?;
    discovery.set_base_url(url)?;
    let added = discovery.scan_page(&browser, url).await?;
    discovery.mark_visited(url);
    browser.close().await?;

    let unvisited = discovery.get_unvisited_urls();
    let state = NavigationState::default();
    let planner = NavigationPlanner::new();
    let plan = planner.create_plan(&unvisited, &state);

    println!("Discovered {} URL(s) on {}", added, url);
    for phase in &plan.phases {
        if phase.urls.is_empty() {
            continue;
        }
        let status = match &phase.blocked_reason {
            Some(reason) => format!(" (locked: {})", reason),
            None => String::new(),
        };
        println!("\n{}{}", phase.name, status);
        for entry in &phase.urls {
            println!("  [{:>2}] {}", entry.priority_score, entry.normalized_url);
        }
    }
    println!("\n{}", planner.summarize_frontier(&unvisited, &state));
    Ok(())
}
