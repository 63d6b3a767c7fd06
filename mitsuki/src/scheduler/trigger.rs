//! Trigger definitions for scheduled tasks: fixed-rate and fixed-delay intervals plus six-field
//! cron expressions evaluated in an explicit time zone.

use crate::scheduler::SchedulerError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;
use std::time::Duration;

/// Timing specification of a scheduled task.
#[derive(Clone, Debug)]
pub enum Trigger {
    /// Attempt to start at `t0`, `t0 + interval`, `t0 + 2 * interval`, ... At most one execution
    /// is in flight; when an execution overruns its next slot, the successor starts as soon as
    /// possible after completion and missed slots are skipped, never duplicated.
    FixedRate {
        interval: Duration,
        initial_delay: Duration,
    },
    /// Next start = previous completion + `delay`.
    FixedDelay {
        delay: Duration,
        initial_delay: Duration,
    },
    /// Next start = next instant satisfying the expression in the given time zone.
    Cron {
        expression: String,
        schedule: Schedule,
        timezone: Tz,
    },
}

impl Trigger {
    pub fn fixed_rate(interval_ms: u64) -> Result<Self, SchedulerError> {
        if interval_ms == 0 {
            return Err(SchedulerError::InvalidTrigger(
                "fixed-rate interval must be positive".to_string(),
            ));
        }
        Ok(Trigger::FixedRate {
            interval: Duration::from_millis(interval_ms),
            initial_delay: Duration::ZERO,
        })
    }

    pub fn fixed_delay(delay_ms: u64) -> Result<Self, SchedulerError> {
        if delay_ms == 0 {
            return Err(SchedulerError::InvalidTrigger(
                "fixed-delay must be positive".to_string(),
            ));
        }
        Ok(Trigger::FixedDelay {
            delay: Duration::from_millis(delay_ms),
            initial_delay: Duration::ZERO,
        })
    }

    /// Parses a six-field cron expression (seconds, minutes, hours, day-of-month, month,
    /// day-of-week) or one of the `@yearly`/`@monthly`/`@weekly`/`@daily`/`@midnight`/`@hourly`
    /// macros, evaluated in the given time-zone-database zone.
    pub fn cron(expression: &str, timezone: &str) -> Result<Self, SchedulerError> {
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|_| SchedulerError::UnknownTimeZone(timezone.to_string()))?;

        let expanded = expand_macros(expression);
        let schedule =
            Schedule::from_str(expanded).map_err(|error| SchedulerError::InvalidCronExpression {
                expression: expression.to_string(),
                message: error.to_string(),
            })?;

        if schedule
            .after(&Utc::now().with_timezone(&timezone))
            .next()
            .is_none()
        {
            return Err(SchedulerError::InvalidCronExpression {
                expression: expression.to_string(),
                message: "expression yields no future instants".to_string(),
            });
        }

        Ok(Trigger::Cron {
            expression: expression.to_string(),
            schedule,
            timezone,
        })
    }

    /// Sets the delay before the first execution; ignored for cron triggers, whose first fire is
    /// determined by the expression.
    pub fn with_initial_delay(mut self, delay_ms: u64) -> Self {
        match &mut self {
            Trigger::FixedRate { initial_delay, .. } | Trigger::FixedDelay { initial_delay, .. } => {
                *initial_delay = Duration::from_millis(delay_ms);
            }
            Trigger::Cron { .. } => {}
        }
        self
    }

    /// For cron triggers, the next satisfying instant strictly after `after`; `None` for interval
    /// triggers or exhausted schedules.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Cron {
                schedule, timezone, ..
            } => schedule
                .after(&after.with_timezone(timezone))
                .next()
                .map(|instant| instant.with_timezone(&Utc)),
            _ => None,
        }
    }
}

fn expand_macros(expression: &str) -> &str {
    match expression.trim() {
        "@yearly" | "@annually" => "0 0 0 1 1 *",
        "@monthly" => "0 0 0 1 * *",
        "@weekly" => "0 0 0 * * SUN",
        "@daily" | "@midnight" => "0 0 0 * * *",
        "@hourly" => "0 0 * * * *",
        other => other,
    }
}
