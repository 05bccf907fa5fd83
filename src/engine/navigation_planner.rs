use serde::{Deserialize, Serialize};

use super::url_discovery::DiscoveredUrl;
use crate::types::{NavigationState, UrlCategory};

const URLS_PER_PHASE_IN_SUMMARY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Open,
    Authenticated,
    CartItems,
    Closed,
}

struct PhaseDefinition {
    name: &'static str,
    categories: &'static [UrlCategory],
    gate: Gate,
}

const PHASES: &[PhaseDefinition] = &[
    PhaseDefinition {
        name: "Authentication",
        categories: &[UrlCategory::Auth],
        gate: Gate::Open,
    },
    PhaseDefinition {
        name: "Core Features",
        categories: &[UrlCategory::Product],
        gate: Gate::Open,
    },
    PhaseDefinition {
        name: "Shopping Flow",
        categories: &[UrlCategory::Cart],
        gate: Gate::CartItems,
    },
    PhaseDefinition {
        name: "User Features",
        categories: &[UrlCategory::User],
        gate: Gate::Authenticated,
    },
    PhaseDefinition {
        name: "Admin",
        categories: &[UrlCategory::Admin],
        gate: Gate::Closed,
    },
    PhaseDefinition {
        name: "Informational",
        categories: &[UrlCategory::Info],
        gate: Gate::Open,
    },
    PhaseDefinition {
        name: "Other",
        categories: &[UrlCategory::Other],
        gate: Gate::Open,
    },
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationPhase {
    pub name: String,
    pub categories: Vec<UrlCategory>,
    pub urls: Vec<DiscoveredUrl>,
    pub eligible: bool,
    pub blocked_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExplorationPlan {
    pub phases: Vec<ExplorationPhase>,
}

impl ExplorationPlan {
    pub fn next_phase(&self) -> Option<&ExplorationPhase> {
        self.phases
            .iter()
            .find(|p| p.eligible && !p.urls.is_empty())
    }

    pub fn total_urls(&self) -> usize {
        self.phases.iter().map(|p| p.urls.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationSuggestion {
    pub url: String,
    pub category: UrlCategory,
    pub phase: String,
    pub rationale: String,
}

/// Groups the frontier into ordered phases and picks where to go next.
///
/// Cart pages wait until something is in the cart, account pages until the
/// agent is signed in, and admin pages are never suggested.
#[derive(Debug, Clone, Default)]
pub struct NavigationPlanner;

impl NavigationPlanner {
    pub fn new() -> Self {
        Self
    }

    // `unvisited` is expected in frontier order (most urgent first); that order is kept per phase.
    pub fn create_plan(&self, unvisited: &[DiscoveredUrl], state: &NavigationState) -> ExplorationPlan {
        let phases = PHASES
            .iter()
            .map(|def| {
                let urls: Vec<DiscoveredUrl> = unvisited
                    .iter()
                    .filter(|u| !u.visited && def.categories.contains(&u.category))
                    .cloned()
                    .collect();
                let blocked_reason = blocked_reason(def.gate, state);
                ExplorationPhase {
                    name: def.name.to_string(),
                    categories: def.categories.to_vec(),
                    urls,
                    eligible: blocked_reason.is_none(),
                    blocked_reason,
                }
            })
            .collect();

        ExplorationPlan { phases }
    }

    pub fn suggest_next_url(
        &self,
        unvisited: &[DiscoveredUrl],
        state: &NavigationState,
    ) -> Option<NavigationSuggestion> {
        let plan = self.create_plan(unvisited, state);
        let phase = plan.next_phase()?;
        let target = phase.urls.first()?;

        let mut rationale = format!(
            "{} phase has {} unvisited URL(s); '{}' has the best priority ({})",
            phase.name,
            phase.urls.len(),
            target.normalized_url,
            target.priority_score
        );
        let skipped: Vec<&str> = plan
            .phases
            .iter()
            .filter(|p| !p.eligible && !p.urls.is_empty())
            .map(|p| p.name.as_str())
            .collect();
        if !skipped.is_empty() {
            rationale.push_str(&format!("; waiting on {}", skipped.join(", ")));
        }

        Some(NavigationSuggestion {
            url: target.normalized_url.clone(),
            category: target.category,
            phase: phase.name.clone(),
            rationale,
        })
    }

    pub fn summarize_frontier(&self, unvisited: &[DiscoveredUrl], state: &NavigationState) -> String {
        if unvisited.is_empty() {
            return "No unvisited URLs discovered yet.".to_string();
        }

        let plan = self.create_plan(unvisited, state);
        let mut lines = vec![format!("{} unvisited URL(s):", plan.total_urls())];
        for phase in plan.phases.iter().filter(|p| !p.urls.is_empty()) {
            let shown: Vec<&str> = phase
                .urls
                .iter()
                .take(URLS_PER_PHASE_IN_SUMMARY)
                .map(|u| u.normalized_url.as_str())
                .collect();
            let more = phase.urls.len().saturating_sub(shown.len());
            let mut line = format!("- {} ({}): {}", phase.name, phase.urls.len(), shown.join(", "));
            if more > 0 {
                line.push_str(&format!(" and {} more", more));
            }
            if let Some(reason) = &phase.blocked_reason {
                line.push_str(&format!(" [locked: {}]", reason));
            }
            lines.push(line);
        }

        if let Some(suggestion) = self.suggest_next_url(unvisited, state) {
            lines.push(format!("Suggested next: {}", suggestion.url));
        }
        lines.join("\n")
    }
}

fn blocked_reason(gate: Gate, state: &NavigationState) -> Option<String> {
    match gate {
        Gate::Open => None,
        Gate::Authenticated if state.is_authenticated => None,
        Gate::Authenticated => Some("requires a signed-in session".to_string()),
        Gate::CartItems if state.has_items_in_cart => None,
        Gate::CartItems => Some("requires items in the cart".to_string()),
        Gate::Closed => Some("admin pages are not explored".to_string()),
    }
}
