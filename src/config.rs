//! Configuration types.
//!
//! One immutable value built at startup and threaded explicitly through each
//! component's constructor. Components never reach for global settings.

use std::time::Duration;

/// Run configuration for the triage pipeline.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Result waiter poll interval.
    pub poll_interval: Duration,
    /// Overall timeout for a single dispatch before the worker context is
    /// force-closed and a `timeout` outcome is synthesized.
    pub overall_timeout: Duration,
    /// Maximum permissible task age before a worker must ignore it.
    ///
    /// Sixty seconds covers slow context startup without letting a leaked
    /// task trigger an action much later.
    pub freshness_window: Duration,
    /// Settle interval after opening a detail context, and between control
    /// activations. Jittered ±20% at each use.
    pub settle_interval: Duration,
    /// Capacity of the processed-id ledger (FIFO eviction beyond this).
    pub idempotency_capacity: usize,
    /// Maximum successful actions per day (0 = unlimited).
    pub daily_limit: u32,
    /// Whether workers self-terminate their context after reporting.
    pub auto_close_worker: bool,
    /// Attempts when searching a detail page for action controls.
    pub control_search_attempts: u32,
    /// Spacing between control search attempts.
    pub control_search_spacing: Duration,
    /// Attempts at incremental content growth before falling back to an
    /// explicit advance control.
    pub growth_attempts: u32,
    /// Settle interval after a growth trigger or page advance.
    pub growth_settle: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            overall_timeout: Duration::from_secs(30),
            freshness_window: Duration::from_secs(60),
            settle_interval: Duration::from_secs(2),
            idempotency_capacity: 2000,
            daily_limit: 200,
            auto_close_worker: true,
            control_search_attempts: 10,
            control_search_spacing: Duration::from_secs(1),
            growth_attempts: 3,
            growth_settle: Duration::from_secs(2),
        }
    }
}

impl RunConfig {
    /// Read overrides from environment variables, falling back to defaults.
    ///
    /// Recognized: `AUTOTRIAGE_POLL_MS`, `AUTOTRIAGE_TIMEOUT_MS`,
    /// `AUTOTRIAGE_FRESHNESS_MS`, `AUTOTRIAGE_CAPACITY`,
    /// `AUTOTRIAGE_DAILY_LIMIT`, `AUTOTRIAGE_AUTO_CLOSE`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(ms) = env_u64("AUTOTRIAGE_POLL_MS") {
            cfg.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("AUTOTRIAGE_TIMEOUT_MS") {
            cfg.overall_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("AUTOTRIAGE_FRESHNESS_MS") {
            cfg.freshness_window = Duration::from_millis(ms);
        }
        if let Some(n) = env_u64("AUTOTRIAGE_CAPACITY") {
            cfg.idempotency_capacity = n as usize;
        }
        if let Some(n) = env_u64("AUTOTRIAGE_DAILY_LIMIT") {
            cfg.daily_limit = n as u32;
        }
        if let Ok(v) = std::env::var("AUTOTRIAGE_AUTO_CLOSE") {
            cfg.auto_close_worker = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        cfg
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
