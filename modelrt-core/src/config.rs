//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Limits applied by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of events processed in one dispatch turn (0 =
    /// unbounded). Events queued beyond it are dropped with an error log.
    pub max_cascade: usize,
    /// History entries kept per state machine (0 = unbounded).
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cascade: 10_000,
            history_limit: 0,
        }
    }
}

impl EngineConfig {
    pub fn with_max_cascade(mut self, max_cascade: usize) -> Self {
        self.max_cascade = max_cascade;
        self
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }
}
