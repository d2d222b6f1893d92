//! Dispatcher settings.
//!
//! `DispatcherConfig` deserializes with every field optional, so a host can
//! embed it in its own config file and only override what it needs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Statuses routed to `on_success`. Everything else is a failure once
    /// the PUT policies are done with it.
    pub success_statuses: Vec<u16>,
    /// Upper bound on re-fetch-and-resubmit rounds after a 409. Values below
    /// 1 are treated as 1.
    pub max_conflict_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Per-request timeout for transports that support one.
    pub timeout_ms: Option<u64>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            success_statuses: vec![200],
            max_conflict_retries: 3,
            backoff_base_ms: 50,
            backoff_max_ms: 1000,
            timeout_ms: None,
        }
    }
}

impl DispatcherConfig {
    pub fn with_success_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.success_statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries.max(1);
        self
    }

    pub fn with_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.backoff_base_ms = base_ms;
        self.backoff_max_ms = max_ms;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn is_success(&self, status: u16) -> bool {
        self.success_statuses.contains(&status)
    }

    /// Effective 409 retry budget; a 409 is always retried at least once.
    pub fn conflict_retries(&self) -> u32 {
        self.max_conflict_retries.max(1)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
