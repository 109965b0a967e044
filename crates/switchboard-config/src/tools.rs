use std::time::Duration;

use serde::Deserialize;

use crate::duration;

/// Defaults applied to tool execution and tool-call round trips
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSettings {
    /// Per-call handler timeout
    #[serde(default = "default_timeout", deserialize_with = "duration::deserialize")]
    pub timeout: Duration,
    /// Maximum handlers running at once within a batch
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Maximum execute-and-resend cycles in a tool loop
    #[serde(default = "default_max_round_trips")]
    pub max_round_trips: usize,
    /// Abort a batch on the first failed call
    #[serde(default)]
    pub fail_fast: bool,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_concurrent: default_max_concurrent(),
            max_round_trips: default_max_round_trips(),
            fail_fast: false,
        }
    }
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_max_concurrent() -> usize {
    5
}

const fn default_max_round_trips() -> usize {
    5
}
