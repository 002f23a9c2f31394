//! Driver-side dispatcher and result waiter.
//!
//! Owns the run loop: scan, filter, dispatch one candidate at a time, wait
//! for its terminal result, fold the outcome into the ledger, and grow the
//! view when the current one is exhausted. At most one task is ever in
//! flight.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;

use crate::board::ContextSpawner;
use crate::channel::Channel;
use crate::config::RunConfig;
use crate::error::{DispatchError, Error, Result};
use crate::filter::FilterCriteria;
use crate::growth::GrowthController;
use crate::ledger::Ledger;
use crate::model::{
    Candidate, Outcome, OutcomeKind, RunStats, Task, TaskResult, TaskStatus, TraceLevel,
};
use crate::scanner::Scanner;

pub struct Dispatcher {
    scanner: Scanner,
    growth: GrowthController,
    channel: Channel,
    spawner: Arc<dyn ContextSpawner>,
    ledger: Ledger,
    criteria: FilterCriteria,
    config: RunConfig,
    /// Candidate ids dispatched this run, whatever their outcome. Keeps a
    /// failing candidate from being re-dispatched until the next run.
    attempted: HashSet<String>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scanner: Scanner,
        growth: GrowthController,
        channel: Channel,
        spawner: Arc<dyn ContextSpawner>,
        ledger: Ledger,
        criteria: FilterCriteria,
        config: RunConfig,
    ) -> Self {
        Self {
            scanner,
            growth,
            channel,
            spawner,
            ledger,
            criteria,
            config,
            attempted: HashSet::new(),
        }
    }

    /// Run to completion: until the daily limit is reached or neither the
    /// current view nor growth yields an eligible candidate.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            if self.daily_limit_reached() {
                tracing::info!(
                    limit = self.config.daily_limit,
                    "daily action limit reached; stopping"
                );
                break;
            }

            let (next, in_view) = self
                .scanner
                .next_eligible(&self.ledger, &self.criteria, &self.attempted)
                .await;

            let Some(candidate) = next else {
                tracing::info!(in_view, "view exhausted; trying to grow");
                if self.growth.try_advance().await {
                    continue;
                }
                tracing::info!("no further candidates; run complete");
                break;
            };

            match self.dispatch(&candidate).await {
                Ok(outcome) => {
                    tracing::info!(
                        candidate = %candidate.title,
                        %outcome,
                        "dispatch settled"
                    );
                }
                Err(Error::Dispatch(e @ DispatchError::MissingLink { .. })) => {
                    tracing::warn!(error = %e, "skipping unopenable candidate");
                }
                Err(e) => return Err(e),
            }
            self.attempted.insert(candidate.id.clone());
        }
        Ok(())
    }

    pub fn stats(&self) -> &RunStats {
        self.ledger.stats()
    }

    fn daily_limit_reached(&self) -> bool {
        self.config.daily_limit > 0 && self.ledger.stats().daily_count >= self.config.daily_limit
    }

    /// One full dispatch: place the task, open the worker context, wait for
    /// the result, and fold it into the ledger.
    async fn dispatch(&mut self, candidate: &Candidate) -> Result<Outcome> {
        if candidate.detail_link.is_empty() {
            return Err(DispatchError::MissingLink {
                id: candidate.id.clone(),
            }
            .into());
        }
        if let Some(existing) = self.channel.task().await? {
            if existing.status == TaskStatus::Pending
                && existing.is_fresh(self.config.freshness_window, Utc::now())
            {
                return Err(DispatchError::AlreadyInFlight {
                    link: existing.link,
                }
                .into());
            }
            // Leftover from a crashed or timed-out session.
            self.channel.clear_slot().await?;
        }

        let task = Task {
            seq: 0,
            candidate_id: candidate.id.clone(),
            link: candidate.detail_link.clone(),
            description_terms: self.criteria.description_terms.clone(),
            created_at: Utc::now(),
            auto_close_worker: self.config.auto_close_worker,
            status: TaskStatus::Pending,
        };
        let seq = self.channel.put_task(task).await?;
        tracing::info!(seq, candidate = %candidate.title, link = %candidate.detail_link, "dispatching");

        let handle = match self.spawner.open(&candidate.detail_link, false).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, "could not open worker context");
                self.channel.clear_slot().await?;
                self.ledger.record_outcome(Outcome::Fail).await?;
                return Ok(Outcome::Fail);
            }
        };

        let result = self.wait_for_result(seq).await?;
        let result = match result {
            Some(result) => result,
            None => {
                tracing::warn!(seq, timeout = ?self.config.overall_timeout, "no result in time; closing context");
                handle.close().await;
                self.channel.clear_slot().await?;
                TaskResult {
                    seq,
                    outcome: Outcome::Timeout,
                    matched_description_terms: vec![],
                }
            }
        };
        self.channel.clear_trace().await?;

        if let Some(kind) = OutcomeKind::from_outcome(result.outcome) {
            self.ledger.add(&candidate.id, kind).await?;
        }
        self.ledger.record_outcome(result.outcome).await?;

        if result.outcome.is_success() && !result.matched_description_terms.is_empty() {
            tracing::info!(
                candidate = %candidate.title,
                matched = ?result.matched_description_terms,
                "description terms matched"
            );
        }
        Ok(result.outcome)
    }

    /// Poll for the result of `seq`, relaying worker trace lines as they
    /// appear. `None` after the overall timeout.
    async fn wait_for_result(&self, seq: u64) -> Result<Option<TaskResult>> {
        let deadline = Instant::now() + self.config.overall_timeout;
        let mut last_seen_ms = 0;
        loop {
            self.relay_trace(&mut last_seen_ms).await?;
            if let Some(result) = self.channel.take_result(seq).await? {
                return Ok(Some(result));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Re-emit worker trace lines newer than `after_ms` on the driver's log.
    async fn relay_trace(&self, after_ms: &mut i64) -> Result<()> {
        for line in self.channel.trace_since(*after_ms).await? {
            *after_ms = line.at_ms;
            match line.level {
                TraceLevel::Debug => tracing::debug!(worker = true, "{}", line.message),
                TraceLevel::Info | TraceLevel::Skip => {
                    tracing::info!(worker = true, "{}", line.message)
                }
                TraceLevel::Success => tracing::info!(worker = true, done = true, "{}", line.message),
                TraceLevel::Warning => tracing::warn!(worker = true, "{}", line.message),
                TraceLevel::Error => tracing::error!(worker = true, "{}", line.message),
            }
        }
        Ok(())
    }
}
