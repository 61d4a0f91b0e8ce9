//! Runtime configuration derived from the loaded settings
//!
//! Held by each session rather than in a process-wide singleton, so
//! independent sessions can run side by side with different limits.

use std::time::Duration;

use crate::models::config::SymfoldConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Request,
    Initialization,
    Shutdown,
}

impl OperationType {
    pub fn from_method(method: &str) -> Self {
        match method {
            "initialize" => Self::Initialization,
            "shutdown" => Self::Shutdown,
            _ => Self::Request,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// `None` waits for responses indefinitely
    base_timeout: Option<Duration>,
    pub shutdown_timeout: Duration,
    pub graceful_shutdown: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_timeout: Some(Duration::from_secs(30)),
            shutdown_timeout: Duration::from_secs(5),
            graceful_shutdown: true,
        }
    }
}

impl From<&SymfoldConfig> for RuntimeConfig {
    fn from(config: &SymfoldConfig) -> Self {
        Self {
            base_timeout: match config.lsp.timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            shutdown_timeout: Duration::from_secs(config.lsp.shutdown_timeout_secs),
            graceful_shutdown: config.lsp.graceful_shutdown,
        }
    }
}

impl RuntimeConfig {
    pub fn with_graceful(mut self, graceful: bool) -> Self {
        self.graceful_shutdown = graceful;
        self
    }

    /// Per-call limit. `shutdown` is always bounded by `shutdown_timeout`,
    /// even when the base limit is disabled.
    pub fn timeout_for(&self, method: &str) -> Option<Duration> {
        let multiplier = match OperationType::from_method(method) {
            OperationType::Shutdown => return Some(self.shutdown_timeout),
            OperationType::Initialization => 2,
            OperationType::Request => 1,
        };
        self.base_timeout.map(|base| base * multiplier)
    }
}
