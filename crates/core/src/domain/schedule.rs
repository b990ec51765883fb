// Release Schedule - singleton configuration of the recurring batch cycle

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

pub const MIN_INTERVAL_HOURS: u32 = 1;
pub const MAX_INTERVAL_HOURS: u32 = 24;
pub const MIN_BATCH_SIZE: u32 = 1;
pub const MAX_BATCH_SIZE: u32 = 100;

const HOUR_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSchedule {
    pub enabled: bool,
    pub interval_hours: u32,
    pub batch_size: u32,
    pub next_run_at: i64, // epoch ms
    pub last_run_at: Option<i64>,
}

impl ReleaseSchedule {
    /// Schedule used when nothing has been persisted yet: disabled, daily, 10 per batch
    pub fn initial(now_millis: i64) -> Self {
        Self {
            enabled: false,
            interval_hours: 24,
            batch_size: 10,
            next_run_at: now_millis + 24 * HOUR_MS,
            last_run_at: None,
        }
    }

    pub fn is_due(&self, now_millis: i64) -> bool {
        self.enabled && now_millis >= self.next_run_at
    }

    pub fn next_run_after(&self, now_millis: i64) -> i64 {
        now_millis + i64::from(self.interval_hours) * HOUR_MS
    }

    /// Record a firing at `now`: `lastRunAt = now`, `nextRunAt = now + interval`
    pub fn fired(&self, now_millis: i64) -> Self {
        Self {
            last_run_at: Some(now_millis),
            next_run_at: self.next_run_after(now_millis),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_interval(self.interval_hours)?;
        validate_batch_size(self.batch_size)
    }

    /// Apply an admin update; `nextRunAt` is recomputed when the interval changes
    /// or when the schedule is switched on.
    pub fn apply(&self, update: &ScheduleUpdate, now_millis: i64) -> Result<Self> {
        let mut next = self.clone();

        if let Some(hours) = update.interval_hours {
            validate_interval(hours)?;
            next.interval_hours = hours;
        }
        if let Some(size) = update.batch_size {
            validate_batch_size(size)?;
            next.batch_size = size;
        }
        if let Some(enabled) = update.enabled {
            next.enabled = enabled;
        }

        let interval_changed = next.interval_hours != self.interval_hours;
        let switched_on = next.enabled && !self.enabled;
        if interval_changed || switched_on {
            next.next_run_at = next.next_run_after(now_millis);
        }

        Ok(next)
    }
}

fn validate_interval(hours: u32) -> Result<()> {
    if !(MIN_INTERVAL_HOURS..=MAX_INTERVAL_HOURS).contains(&hours) {
        return Err(DomainError::ValidationError(format!(
            "intervalHours must be between {} and {}, got {}",
            MIN_INTERVAL_HOURS, MAX_INTERVAL_HOURS, hours
        )));
    }
    Ok(())
}

fn validate_batch_size(size: u32) -> Result<()> {
    if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&size) {
        return Err(DomainError::ValidationError(format!(
            "batchSize must be between {} and {}, got {}",
            MIN_BATCH_SIZE, MAX_BATCH_SIZE, size
        )));
    }
    Ok(())
}

/// Admin-supplied schedule change; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleUpdate {
    pub enabled: Option<bool>,
    pub interval_hours: Option<u32>,
    pub batch_size: Option<u32>,
}
