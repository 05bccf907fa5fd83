use anyhow::Result;
use async_trait::async_trait;

use super::{lock, same_page, HandlerDeps, StateHandler};
use crate::error::ExplorationError;
use crate::types::{AgentContext, ExplorationState, LlmPageContext};

pub struct ExtractingPageHandler;

#[async_trait]
impl StateHandler for ExtractingPageHandler {
    fn state(&self) -> ExplorationState {
        ExplorationState::ExtractingPage
    }

    async fn run(&self, ctx: &mut AgentContext, deps: &HandlerDeps) -> Result<ExplorationState> {
        let page = deps
            .browser
            .extract_page_state()
            .await
            .map_err(|e| ExplorationError::PageExtraction(format!("{:#}", e)))?;

        let arrived = ctx
            .current_url
            .as_deref()
            .map(|current| !same_page(current, &page.url))
            .unwrap_or(true);

        if arrived {
            if ctx.current_url.is_some() {
                let progress = &ctx.page_progress;
                log::info!(
                    "[{}] left {} after {} actions, {} bugs, {}s",
                    ctx.agent_id,
                    progress.url,
                    progress.actions,
                    progress.bugs,
                    progress.elapsed_secs()
                );
            }
            lock(&deps.loop_detector).reset_action_history();
            ctx.enter_page(page.url.clone());

            let visited = {
                let mut discovery = lock(&deps.url_discovery);
                let added = discovery.add_links(&page.links, &page.url);
                log::debug!(
                    "[{}] {} links on {}, {} new",
                    ctx.agent_id,
                    page.links.len(),
                    page.url,
                    added
                );
                discovery.mark_visited(&page.url);
                discovery
                    .normalize(&page.url)
                    .unwrap_or_else(|| page.url.clone())
            };
            ctx.mark_visited(visited);
        }

        ctx.navigation.observe(&page);
        ctx.page_context = Some(LlmPageContext::from_page(&page));
        ctx.current_page = Some(page);

        Ok(ExplorationState::CollectingSuggestions)
    }
}
