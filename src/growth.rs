//! View-growth controller.
//!
//! When a scan pass finds no eligible candidate, the dispatcher asks for
//! more content: first by incremental extension (scroll), then by an
//! explicit advance control (next page). Returns whether anything changed;
//! a false return ends the run cleanly.

use std::sync::Arc;

use crate::board::{SourceProfile, Surface};
use crate::config::RunConfig;
use crate::util::settle;

pub struct GrowthController {
    surface: Arc<dyn Surface>,
    profile: Arc<SourceProfile>,
    config: RunConfig,
}

impl GrowthController {
    pub fn new(surface: Arc<dyn Surface>, profile: Arc<SourceProfile>, config: RunConfig) -> Self {
        Self {
            surface,
            profile,
            config,
        }
    }

    /// Try to grow the view. True when content was extended or the view
    /// advanced; false when both strategies are exhausted.
    pub async fn try_advance(&self) -> bool {
        if self.try_extend().await {
            return true;
        }
        self.try_next_control().await
    }

    /// Incremental extension: trigger loading and compare the content-size
    /// proxy, allowing several settle periods for slow content.
    async fn try_extend(&self) -> bool {
        let before = self.surface.content_size().await;
        for attempt in 1..=self.config.growth_attempts {
            self.surface.extend().await;
            settle(self.config.growth_settle).await;
            let after = self.surface.content_size().await;
            if after > before {
                tracing::debug!(before, after, attempt, "view extended");
                return true;
            }
        }
        tracing::debug!(size = before, "incremental extension exhausted");
        false
    }

    /// Explicit advance control, prioritized: known selectors first, then a
    /// textual scan over all action elements.
    async fn try_next_control(&self) -> bool {
        for selector in &self.profile.advance_selectors {
            if let Some(el) = self.surface.query(selector).await {
                if el.actionable() {
                    if self.surface.activate(&el).await {
                        tracing::info!(selector, "advanced to next view");
                        settle(self.config.growth_settle).await;
                        return true;
                    }
                    tracing::debug!(selector, "advance control rejected activation");
                }
            }
        }

        let elements = self.surface.query_all(&self.profile.action_selector).await;
        for el in elements {
            if !el.actionable() {
                continue;
            }
            let label = el.text.trim();
            if self.profile.advance_texts.iter().any(|t| label == t) {
                if self.surface.activate(&el).await {
                    tracing::info!(label, "advanced to next view via text match");
                    settle(self.config.growth_settle).await;
                    return true;
                }
            }
        }

        tracing::info!("no further content available");
        false
    }
}
