use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::engine::loop_detection::LoopDetectionConfig;
use crate::engine::retry::RetryConfig;
use crate::engine::url_discovery::UrlDiscoveryConfig;
use crate::error::ExplorationError;
use crate::supervisor::SupervisorConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm_provider: String,
    pub model: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub exploration: ExplorationConfig,
    pub supervisor: SupervisorConfig,
    pub browser: BrowserConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_provider: "anthropic".to_string(),
            model: None,
            openai_api_key: None,
            anthropic_api_key: None,
            exploration: ExplorationConfig::default(),
            supervisor: SupervisorConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationConfig {
    pub objective: String,
    pub max_steps: u32,
    // Ask the checkpoint callback every N steps. 0 disables periodic checkpoints.
    pub checkpoint_interval: u32,
    pub confidence_threshold: f32,
    pub checkpoint_on_critical_findings: bool,
    pub enable_personas: bool,
    pub max_persona_suggestions: usize,
    pub dedup_similarity_threshold: f64,
    pub loop_detection: LoopDetectionConfig,
    pub page_exit: PageExitCriteria,
    pub retry: RetryConfig,
    pub url_discovery: UrlDiscoveryConfig,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            objective: "Explore the application and report anything that looks broken".to_string(),
            max_steps: 50,
            checkpoint_interval: 0,
            confidence_threshold: 0.3,
            checkpoint_on_critical_findings: true,
            enable_personas: true,
            max_persona_suggestions: 5,
            dedup_similarity_threshold: 0.6,
            loop_detection: LoopDetectionConfig::default(),
            page_exit: PageExitCriteria::default(),
            retry: RetryConfig::default(),
            url_discovery: UrlDiscoveryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageExitCriteria {
    pub max_actions_per_page: u32,
    pub max_time_per_page_secs: u64,
    pub max_bugs_per_page: u32,
    // Exit criteria are only considered once more than this many steps ran on the page.
    pub min_steps_before_exit: u32,
}

impl Default for PageExitCriteria {
    fn default() -> Self {
        Self {
            max_actions_per_page: 10,
            max_time_per_page_secs: 120,
            max_bugs_per_page: 5,
            min_steps_before_exit: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub step_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: 30_000,
            user_agent: "webprobe/1.0".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let config = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&raw)
                .with_context(|| format!("parsing YAML config {}", path.display()))?,
            "toml" => toml::from_str(&raw)
                .with_context(|| format!("parsing TOML config {}", path.display()))?,
            other => {
                return Err(ExplorationError::config(format!(
                    "unsupported config format '{}' (expected .toml, .yaml or .yml)",
                    other
                ))
                .into())
            }
        };

        Ok(config)
    }

    /// Defaults, then the optional file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = Some(key);
        }
        if let Ok(provider) = std::env::var("WEBPROBE_PROVIDER") {
            self.llm_provider = provider;
        }
        if let Ok(model) = std::env::var("WEBPROBE_MODEL") {
            self.model = Some(model);
        }
        if let Some(steps) = env_number("WEBPROBE_MAX_STEPS") {
            self.exploration.max_steps = steps as u32;
        }
        if let Some(concurrency) = env_number("WEBPROBE_CONCURRENCY") {
            self.supervisor.max_concurrency = concurrency as usize;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let exploration = &self.exploration;

        if exploration.max_steps == 0 {
            return Err(ExplorationError::config("exploration.max_steps must be positive").into());
        }
        if self.supervisor.global_max_steps == 0 || self.supervisor.max_steps_per_agent == 0 {
            return Err(ExplorationError::config(
                "supervisor.global_max_steps and supervisor.max_steps_per_agent must be positive",
            )
            .into());
        }
        if self.supervisor.max_concurrency == 0 {
            return Err(
                ExplorationError::config("supervisor.max_concurrency must be positive").into(),
            );
        }
        if exploration.retry.max_attempts == 0 {
            return Err(
                ExplorationError::config("exploration.retry.max_attempts must be positive").into(),
            );
        }
        if !(exploration.dedup_similarity_threshold > 0.0
            && exploration.dedup_similarity_threshold <= 1.0)
        {
            return Err(ExplorationError::config(
                "exploration.dedup_similarity_threshold must be in (0, 1]",
            )
            .into());
        }
        if !(exploration.confidence_threshold > 0.0 && exploration.confidence_threshold <= 1.0) {
            return Err(ExplorationError::config(
                "exploration.confidence_threshold must be in (0, 1]",
            )
            .into());
        }
        if exploration.loop_detection.action_loop_threshold == 0
            || exploration.loop_detection.tool_loop_threshold == 0
        {
            return Err(
                ExplorationError::config("loop detection thresholds must be positive").into(),
            );
        }
        for pattern in &exploration.url_discovery.custom_priority_patterns {
            Regex::new(pattern).map_err(|e| {
                ExplorationError::config(format!("invalid custom priority pattern '{}': {}", pattern, e))
            })?;
        }

        Ok(())
    }
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
