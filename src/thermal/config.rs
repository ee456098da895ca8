use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How ticks are scheduled relative to each other
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulePolicy {
    /// Wait one period after a tick finishes before starting the next
    #[default]
    FixedDelay,
    /// Fire on a fixed grid; a tick still running when the next is due
    /// causes that period to be skipped
    FixedRate,
    /// Fire on a fixed grid and spawn every tick, even if the previous
    /// one is still in flight
    Overlapping,
}

/// Configuration for the tick coordinator
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TickConfig {
    /// Tick period (milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default)]
    pub policy: SchedulePolicy,
}

fn default_interval_ms() -> u64 {
    1000
}

impl TickConfig {
    pub fn period(&self) -> Duration {
        // A zero period would spin; tokio's interval also rejects it
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            policy: SchedulePolicy::default(),
        }
    }
}
