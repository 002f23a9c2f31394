//! Idempotency and bookkeeping ledger.
//!
//! A capacity-bounded, insertion-ordered set of processed candidate ids with
//! FIFO eviction, a parallel outcome map, and the run counters. Loaded fully
//! into memory at run start and written back on each mutation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;

use crate::error::{Result, StoreError};
use crate::model::{Outcome, OutcomeKind, RunStats};
use crate::store::KvStore;

const PROCESSED_KEY: &str = "triage_processed";
const OUTCOMES_KEY: &str = "triage_outcomes";
const STATS_KEY: &str = "triage_stats";

/// Bounded processed-id set plus run statistics.
pub struct Ledger {
    kv: Arc<dyn KvStore>,
    capacity: usize,
    order: VecDeque<String>,
    present: HashSet<String>,
    outcomes: HashMap<String, OutcomeKind>,
    stats: RunStats,
}

impl Ledger {
    /// Load the ledger from the store, trimming any persisted overflow down
    /// to `capacity` (oldest first) and rolling the daily counter.
    pub async fn load(kv: Arc<dyn KvStore>, capacity: usize) -> Result<Self> {
        let order: VecDeque<String> = read_or_default(&kv, PROCESSED_KEY).await?;
        let outcomes: HashMap<String, OutcomeKind> = read_or_default(&kv, OUTCOMES_KEY).await?;
        let today = Utc::now().date_naive();
        let mut stats: RunStats = match kv.get(STATS_KEY).await? {
            Some(value) if !value.is_null() => {
                serde_json::from_value(value).map_err(StoreError::from)?
            }
            _ => RunStats::new(today),
        };
        stats.roll_day(today);

        let mut ledger = Self {
            kv,
            capacity,
            present: order.iter().cloned().collect(),
            order,
            outcomes,
            stats,
        };
        while ledger.order.len() > ledger.capacity {
            ledger.evict_oldest();
        }
        ledger.persist_records().await?;
        ledger.persist_stats().await?;
        Ok(ledger)
    }

    /// Whether `id` was already handled.
    pub fn has(&self, id: &str) -> bool {
        self.present.contains(id)
    }

    /// Record a handled id, evicting the oldest entry at capacity.
    pub async fn add(&mut self, id: &str, kind: OutcomeKind) -> Result<()> {
        if !self.present.contains(id) {
            self.order.push_back(id.to_string());
            self.present.insert(id.to_string());
            while self.order.len() > self.capacity {
                self.evict_oldest();
            }
        }
        self.outcomes.insert(id.to_string(), kind);
        self.persist_records().await
    }

    /// Recorded outcome classification for `id`.
    pub fn outcome(&self, id: &str) -> Option<OutcomeKind> {
        self.outcomes.get(id).copied()
    }

    /// Fold a terminal outcome into the counters and persist them.
    pub async fn record_outcome(&mut self, outcome: Outcome) -> Result<()> {
        self.stats.roll_day(Utc::now().date_naive());
        self.stats.record(outcome);
        self.persist_stats().await
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn evict_oldest(&mut self) {
        if let Some(evicted) = self.order.pop_front() {
            self.present.remove(&evicted);
            self.outcomes.remove(&evicted);
        }
    }

    async fn persist_records(&self) -> Result<()> {
        let order = serde_json::to_value(&self.order).map_err(StoreError::from)?;
        self.kv.set(PROCESSED_KEY, order).await?;
        let outcomes = serde_json::to_value(&self.outcomes).map_err(StoreError::from)?;
        self.kv.set(OUTCOMES_KEY, outcomes).await?;
        Ok(())
    }

    async fn persist_stats(&self) -> Result<()> {
        let stats = serde_json::to_value(&self.stats).map_err(StoreError::from)?;
        self.kv.set(STATS_KEY, stats).await?;
        Ok(())
    }
}

async fn read_or_default<T>(kv: &Arc<dyn KvStore>, key: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match kv.get(key).await? {
        Some(value) if !value.is_null() => {
            Ok(serde_json::from_value(value).map_err(StoreError::from)?)
        }
        _ => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKv;

    #[tokio::test]
    async fn add_and_has() {
        let kv = Arc::new(MemoryKv::new());
        let mut ledger = Ledger::load(kv, 10).await.unwrap();
        assert!(!ledger.has("a"));
        ledger.add("a", OutcomeKind::Apply).await.unwrap();
        assert!(ledger.has("a"));
        assert_eq!(ledger.outcome("a"), Some(OutcomeKind::Apply));
    }

    #[tokio::test]
    async fn fifo_eviction_at_capacity() {
        let kv = Arc::new(MemoryKv::new());
        let capacity = 5;
        let mut ledger = Ledger::load(kv, capacity).await.unwrap();
        for i in 0..8 {
            ledger
                .add(&format!("id-{i}"), OutcomeKind::Chat)
                .await
                .unwrap();
        }
        assert_eq!(ledger.len(), capacity);
        // The most recent `capacity` ids survive; the oldest were evicted.
        for i in 0..3 {
            assert!(!ledger.has(&format!("id-{i}")));
            assert_eq!(ledger.outcome(&format!("id-{i}")), None);
        }
        for i in 3..8 {
            assert!(ledger.has(&format!("id-{i}")));
        }
    }

    #[tokio::test]
    async fn duplicate_add_does_not_grow() {
        let kv = Arc::new(MemoryKv::new());
        let mut ledger = Ledger::load(kv, 10).await.unwrap();
        ledger.add("a", OutcomeKind::Chat).await.unwrap();
        ledger.add("a", OutcomeKind::Apply).await.unwrap();
        assert_eq!(ledger.len(), 1);
        // The classification may still be upgraded.
        assert_eq!(ledger.outcome("a"), Some(OutcomeKind::Apply));
    }

    #[tokio::test]
    async fn survives_reload() {
        let kv = Arc::new(MemoryKv::new());
        {
            let mut ledger = Ledger::load(Arc::clone(&kv) as Arc<dyn KvStore>, 10)
                .await
                .unwrap();
            ledger.add("a", OutcomeKind::Apply).await.unwrap();
            ledger.record_outcome(Outcome::SuccessApply).await.unwrap();
        }
        let ledger = Ledger::load(kv, 10).await.unwrap();
        assert!(ledger.has("a"));
        assert_eq!(ledger.stats().success_count, 1);
        assert_eq!(ledger.stats().daily_count, 1);
    }

    #[tokio::test]
    async fn reload_trims_to_smaller_capacity() {
        let kv = Arc::new(MemoryKv::new());
        {
            let mut ledger = Ledger::load(Arc::clone(&kv) as Arc<dyn KvStore>, 10)
                .await
                .unwrap();
            for i in 0..10 {
                ledger
                    .add(&format!("id-{i}"), OutcomeKind::Chat)
                    .await
                    .unwrap();
            }
        }
        let ledger = Ledger::load(kv, 4).await.unwrap();
        assert_eq!(ledger.len(), 4);
        assert!(ledger.has("id-9"));
        assert!(!ledger.has("id-5"));
    }
}
