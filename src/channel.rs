//! Coordination channel: a single-slot persisted mailbox plus a capped
//! trace log, layered on the key-value primitive.
//!
//! The store itself is last-write-wins with no fencing. The channel issues a
//! monotonic seq per task; a worker echoes it in its result and the waiter
//! accepts only a matching seq, which closes the staleness race that a bare
//! timestamp heuristic would leave open.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{ChannelError, Result, StoreError};
use crate::model::{Task, TaskResult, TaskStatus, TraceLevel, TraceLine};
use crate::store::KvStore;

/// Oldest-first eviction bound for the trace log.
const TRACE_CAP: usize = 50;

/// Shared mailbox between the driver and worker contexts.
#[derive(Clone)]
pub struct Channel {
    kv: Arc<dyn KvStore>,
    prefix: String,
}

impl Channel {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self::with_prefix(kv, "triage")
    }

    /// Namespace all keys under `prefix`, so independent sessions can share
    /// one store.
    pub fn with_prefix(kv: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.prefix)
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, suffix: &str) -> Result<Option<T>> {
        match self.kv.get(&self.key(suffix)).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => {
                let parsed = serde_json::from_value(value).map_err(StoreError::from)?;
                Ok(Some(parsed))
            }
        }
    }

    async fn write<T: serde::Serialize>(&self, suffix: &str, value: &T) -> Result<()> {
        let json = serde_json::to_value(value).map_err(StoreError::from)?;
        self.kv.set(&self.key(suffix), json).await?;
        Ok(())
    }

    /// Issue the next fencing seq.
    async fn next_seq(&self) -> Result<u64> {
        let current: u64 = self.read("seq").await?.unwrap_or(0);
        let next = current + 1;
        self.write("seq", &next).await?;
        Ok(next)
    }

    /// Place a task in the slot, assigning its seq. Returns the seq.
    ///
    /// Protocol discipline keeps writes single-owner; an occupied slot means
    /// a previous dispatch leaked, so it is logged and overwritten.
    pub async fn put_task(&self, mut task: Task) -> Result<u64> {
        if let Some(existing) = self.task().await? {
            tracing::warn!(
                stale_seq = existing.seq,
                "task slot already occupied; overwriting"
            );
        }
        let seq = self.next_seq().await?;
        task.seq = seq;
        task.status = TaskStatus::Pending;
        self.write("task", &task).await?;
        Ok(seq)
    }

    /// Current slot content, if any. The store is shared; a slot another
    /// writer corrupted surfaces as a channel fault, not a parse panic.
    pub async fn task(&self) -> Result<Option<Task>> {
        match self.kv.get(&self.key("task")).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => {
                let task = serde_json::from_value(value)
                    .map_err(|e| ChannelError::MalformedSlot(e.to_string()))?;
                Ok(Some(task))
            }
        }
    }

    /// Worker side: publish the terminal result for `task` and mark the
    /// slot terminal so late-arriving workers stay idle.
    pub async fn complete(&self, task: &Task, result: TaskResult) -> Result<()> {
        let mut terminal = task.clone();
        terminal.status = TaskStatus::Terminal;
        self.write("task", &terminal).await?;
        self.write("result", &result).await?;
        Ok(())
    }

    /// Waiter side: consume the result for the outstanding seq, clearing
    /// the slot on a hit. A result with a foreign seq is discarded.
    pub async fn take_result(&self, seq: u64) -> Result<Option<TaskResult>> {
        let Some(result): Option<TaskResult> = self.read("result").await? else {
            return Ok(None);
        };
        if result.seq != seq {
            tracing::warn!(got = result.seq, want = seq, "discarding result with foreign seq");
            self.kv.remove(&self.key("result")).await?;
            return Ok(None);
        }
        self.clear_slot().await?;
        Ok(Some(result))
    }

    /// Clear the task slot and any pending result.
    pub async fn clear_slot(&self) -> Result<()> {
        self.kv.remove(&self.key("task")).await?;
        self.kv.remove(&self.key("result")).await?;
        Ok(())
    }

    /// Append one line to the shared trace log, evicting the oldest beyond
    /// the cap.
    pub async fn append_trace(&self, level: TraceLevel, message: impl Into<String>) -> Result<()> {
        let mut lines: Vec<TraceLine> = self.read("trace").await?.unwrap_or_default();
        lines.push(TraceLine::new(level, message));
        if lines.len() > TRACE_CAP {
            let excess = lines.len() - TRACE_CAP;
            lines.drain(..excess);
        }
        self.write("trace", &lines).await
    }

    /// Trace lines newer than `after_ms`, oldest first.
    pub async fn trace_since(&self, after_ms: i64) -> Result<Vec<TraceLine>> {
        let lines: Vec<TraceLine> = self.read("trace").await?.unwrap_or_default();
        Ok(lines.into_iter().filter(|l| l.at_ms > after_ms).collect())
    }

    /// Drop the trace log (the waiter does this after each dispatch).
    pub async fn clear_trace(&self) -> Result<()> {
        self.kv.remove(&self.key("trace")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Outcome;
    use crate::store::MemoryKv;
    use chrono::Utc;

    fn channel() -> Channel {
        Channel::new(Arc::new(MemoryKv::new()))
    }

    fn task(link: &str) -> Task {
        Task {
            seq: 0,
            candidate_id: link.to_string(),
            link: link.to_string(),
            description_terms: vec![],
            created_at: Utc::now(),
            auto_close_worker: true,
            status: TaskStatus::Pending,
        }
    }

    #[tokio::test]
    async fn seq_is_monotonic() {
        let ch = channel();
        let a = ch.put_task(task("https://x/job/1")).await.unwrap();
        ch.clear_slot().await.unwrap();
        let b = ch.put_task(task("https://x/job/2")).await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn complete_then_take_clears_slot() {
        let ch = channel();
        let seq = ch.put_task(task("https://x/job/1")).await.unwrap();
        let stored = ch.task().await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Pending);

        ch.complete(
            &stored,
            TaskResult {
                seq,
                outcome: Outcome::SuccessChat,
                matched_description_terms: vec![],
            },
        )
        .await
        .unwrap();

        // Slot flips terminal before consumption.
        assert_eq!(ch.task().await.unwrap().unwrap().status, TaskStatus::Terminal);

        let result = ch.take_result(seq).await.unwrap().unwrap();
        assert_eq!(result.outcome, Outcome::SuccessChat);
        assert!(ch.task().await.unwrap().is_none());
        assert!(ch.take_result(seq).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn foreign_seq_result_is_discarded() {
        let ch = channel();
        let seq = ch.put_task(task("https://x/job/1")).await.unwrap();
        let stored = ch.task().await.unwrap().unwrap();
        ch.complete(
            &stored,
            TaskResult {
                seq: seq + 7,
                outcome: Outcome::Fail,
                matched_description_terms: vec![],
            },
        )
        .await
        .unwrap();

        assert!(ch.take_result(seq).await.unwrap().is_none());
        // The foreign result was dropped, not left to satisfy a later take.
        assert!(ch.take_result(seq + 7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn trace_is_capped_oldest_first() {
        let ch = channel();
        for i in 0..60 {
            ch.append_trace(TraceLevel::Info, format!("line {i}"))
                .await
                .unwrap();
        }
        let lines = ch.trace_since(0).await.unwrap();
        assert_eq!(lines.len(), 50);
        assert_eq!(lines.first().unwrap().message, "line 10");
        assert_eq!(lines.last().unwrap().message, "line 59");
    }

    #[tokio::test]
    async fn trace_since_filters_old_lines() {
        let ch = channel();
        ch.append_trace(TraceLevel::Info, "old").await.unwrap();
        let seen = ch.trace_since(0).await.unwrap();
        let last = seen.last().unwrap().at_ms;
        assert!(ch.trace_since(last).await.unwrap().is_empty());
    }
}
