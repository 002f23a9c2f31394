//! Worker action executor.
//!
//! Runs once inside each spawned context at ready time, consumes the channel
//! slot, acts on the detail surface, and reports a terminal result. Every
//! fault is recovered locally into a `fail` result so the dispatcher's
//! timeout — not an unhandled fault — is always the worst case.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::board::{Element, SourceProfile, Surface};
use crate::channel::Channel;
use crate::config::RunConfig;
use crate::error::{Result, WorkerError};
use crate::filter::matched_terms;
use crate::model::{Outcome, Task, TaskResult, TaskStatus, TraceLevel};
use crate::util::settle;

/// Outcome of the control search on a detail page.
struct ControlSearch {
    contact: Option<Element>,
    apply: Option<Element>,
    /// Whether the body carried an already-handled marker.
    done_marker: bool,
    attempts: u32,
}

/// Executes the dispatched task inside one worker context.
pub struct WorkerExecutor {
    channel: Channel,
    surface: Arc<dyn Surface>,
    profile: Arc<SourceProfile>,
    config: RunConfig,
    /// The address this context was opened at.
    address: String,
}

impl WorkerExecutor {
    pub fn new(
        channel: Channel,
        surface: Arc<dyn Surface>,
        profile: Arc<SourceProfile>,
        config: RunConfig,
        address: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            surface,
            profile,
            config,
            address: address.into(),
        }
    }

    /// Run the executor to completion. Returns whether the context should
    /// self-terminate afterwards.
    pub async fn run(self) -> bool {
        let task = match self.channel.task().await {
            Ok(Some(task)) => task,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "worker could not read task slot");
                return false;
            }
        };

        // A worker only acts on a pending, fresh task addressed at its own
        // page. Anything else is somebody else's business: stay idle.
        if task.status == TaskStatus::Terminal {
            return false;
        }
        if !task.link_matches(&self.address) {
            tracing::debug!(task_link = %task.link, address = %self.address, "task not for this context");
            return false;
        }
        if !task.is_fresh(self.config.freshness_window, Utc::now()) {
            tracing::debug!(age = ?task.age(Utc::now()), "ignoring stale task");
            return false;
        }

        let (outcome, matched) = match self.execute(&task).await {
            Ok(done) => done,
            Err(e) => {
                self.trace(TraceLevel::Error, format!("task execution failed: {e}"))
                    .await;
                (Outcome::Fail, Vec::new())
            }
        };

        let result = TaskResult {
            seq: task.seq,
            outcome,
            matched_description_terms: matched,
        };
        if let Err(e) = self.channel.complete(&task, result).await {
            tracing::warn!(error = %e, "worker could not publish result");
        }

        if task.auto_close_worker {
            // Brief grace so the driver can observe the result before the
            // context disappears.
            settle(Duration::from_millis(500)).await;
            true
        } else {
            false
        }
    }

    /// Steps 2–5: settle, description filter, control search, action.
    async fn execute(&self, task: &Task) -> Result<(Outcome, Vec<String>)> {
        self.trace(TraceLevel::Info, "executing dispatched task").await;
        settle(self.config.settle_interval).await;

        let body = self.surface.body_text().await;
        let matched: Vec<String> = matched_terms(&body, &task.description_terms)
            .into_iter()
            .map(str::to_string)
            .collect();
        if !task.description_terms.is_empty() && matched.is_empty() {
            self.trace(TraceLevel::Skip, "description terms did not match")
                .await;
            return Ok((Outcome::Skip, Vec::new()));
        }

        let search = self.find_action_controls().await;

        match (search.contact, search.apply) {
            (contact, Some(apply)) => {
                if let Some(contact) = contact {
                    self.trace(TraceLevel::Info, "activating contact control")
                        .await;
                    // Best-effort: a rejected contact click does not stop
                    // the apply sequence.
                    self.surface.activate(&contact).await;
                    settle(self.config.settle_interval).await;
                }
                self.trace(TraceLevel::Info, "activating apply control").await;
                if !self.surface.activate(&apply).await {
                    return Err(WorkerError::ActivationRejected { label: apply.text }.into());
                }
                settle(self.config.settle_interval).await;
                self.resolve_confirmation().await;
                self.trace(TraceLevel::Success, "apply sequence completed")
                    .await;
                Ok((Outcome::SuccessApply, matched))
            }
            (Some(contact), None) => {
                self.trace(TraceLevel::Info, "activating contact control (no apply)")
                    .await;
                self.surface.activate(&contact).await;
                settle(Duration::from_secs(1)).await;
                self.trace(TraceLevel::Success, "contact completed").await;
                Ok((Outcome::SuccessChat, matched))
            }
            (None, None) if search.done_marker => {
                self.trace(TraceLevel::Info, "already-handled marker found")
                    .await;
                Ok((Outcome::SuccessChat, matched))
            }
            (None, None) => {
                self.trace(TraceLevel::Error, "no usable action control found")
                    .await;
                Err(WorkerError::ControlNotFound {
                    attempts: search.attempts,
                    spent: self.config.control_search_spacing * search.attempts,
                }
                .into())
            }
        }
    }

    /// Bounded retry over the profile's action controls, excluding variants
    /// already marked done. Breaks early when the body carries a done
    /// marker.
    async fn find_action_controls(&self) -> ControlSearch {
        let start = Instant::now();
        let mut attempts = 0;
        loop {
            let controls = self.surface.query_all(&self.profile.action_selector).await;
            let contact = self.pick_control(&controls, &self.profile.contact_patterns);
            let apply = self.pick_control(&controls, &self.profile.apply_patterns);
            if contact.is_some() || apply.is_some() {
                return ControlSearch {
                    contact,
                    apply,
                    done_marker: false,
                    attempts,
                };
            }

            let body = self.surface.body_text().await;
            if self.profile.done_markers.iter().any(|m| body.contains(m)) {
                return ControlSearch {
                    contact: None,
                    apply: None,
                    done_marker: true,
                    attempts,
                };
            }

            attempts += 1;
            if attempts >= self.config.control_search_attempts {
                tracing::debug!(
                    attempts,
                    spent = ?start.elapsed(),
                    "control search budget exhausted"
                );
                return ControlSearch {
                    contact: None,
                    apply: None,
                    done_marker: false,
                    attempts,
                };
            }
            settle(self.config.control_search_spacing).await;
        }
    }

    fn pick_control(&self, controls: &[Element], patterns: &[String]) -> Option<Element> {
        controls
            .iter()
            .find(|el| {
                let label = el.text.trim();
                el.actionable()
                    && patterns.iter().any(|p| label.contains(p.as_str()))
                    && !label.contains(&self.profile.done_variant_marker)
            })
            .cloned()
    }

    /// Activate a confirmation control if the apply action raised one.
    async fn resolve_confirmation(&self) {
        let controls = self.surface.query_all(&self.profile.action_selector).await;
        if let Some(confirm) = self.pick_control(&controls, &self.profile.confirm_patterns) {
            self.trace(TraceLevel::Info, "resolving confirmation control")
                .await;
            self.surface.activate(&confirm).await;
            settle(Duration::from_secs(1)).await;
        }
    }

    async fn trace(&self, level: TraceLevel, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(worker = %self.address, "{message}");
        if let Err(e) = self.channel.append_trace(level, message).await {
            tracing::warn!(error = %e, "could not append trace line");
        }
    }
}
