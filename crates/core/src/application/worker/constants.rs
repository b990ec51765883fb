// Worker and scheduler constants (no magic values)
use std::time::Duration;

/// Sleep duration when no jobs are available (5s)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_secs(5);

/// Sleep duration after worker error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Scheduler tick (60s). Fire times drift by up to one tick.
pub const SCHEDULER_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Largest tick that still hits every due run: half of the smallest
/// configurable interval (1 hour)
pub const MAX_SCHEDULER_TICK_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Upper bound of the stagger applied to each module job of a batch (10s)
pub const DEFAULT_MAX_JITTER_MS: u64 = 10_000;
