//! Job schedules.
//!
//! A job either repeats on a fixed interval (the notifier's default, every
//! three minutes) or follows a six-field cron expression in a timezone.

use std::fmt;
use std::time::Duration;

use chrono_tz::Tz;
use tokio_cron_scheduler::Job;

use notifier_types::ScheduleSettings;

use crate::SchedulerError;

/// When a registered job fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSchedule {
    /// Fire every `every`, optionally once as soon as the scheduler starts.
    Interval {
        every: Duration,
        fire_immediately: bool,
    },
    /// Six-field cron expression: second minute hour day-of-month month day-of-week.
    ///
    /// `timezone` falls back to the scheduler's default when `None`.
    Cron {
        expr: String,
        timezone: Option<String>,
    },
}

impl JobSchedule {
    /// Fixed interval that also fires at start-up.
    pub fn every(every: Duration) -> Self {
        JobSchedule::Interval {
            every,
            fire_immediately: true,
        }
    }

    pub fn cron(expr: impl Into<String>, timezone: Option<String>) -> Self {
        JobSchedule::Cron {
            expr: expr.into(),
            timezone,
        }
    }

    /// Cron when `schedule.cron` is set, otherwise the fixed interval.
    pub fn from_settings(settings: &ScheduleSettings) -> Self {
        match &settings.cron {
            Some(expr) => JobSchedule::cron(expr.clone(), Some(settings.timezone.clone())),
            None => JobSchedule::every(settings.interval()),
        }
    }

    /// Whether the first run happens at start instead of after one period.
    pub fn fires_on_start(&self) -> bool {
        matches!(
            self,
            JobSchedule::Interval {
                fire_immediately: true,
                ..
            }
        )
    }

    pub(crate) fn validate(&self) -> Result<(), SchedulerError> {
        match self {
            JobSchedule::Interval { every, .. } => {
                if every.as_secs() == 0 {
                    return Err(SchedulerError::InvalidInterval(format!(
                        "{every:?} is shorter than one second"
                    )));
                }
                Ok(())
            }
            JobSchedule::Cron { expr, timezone } => {
                validate_cron_expression(expr)?;
                if let Some(tz) = timezone {
                    parse_timezone(tz)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for JobSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobSchedule::Interval { every, .. } => write!(f, "every {}s", every.as_secs()),
            JobSchedule::Cron {
                expr,
                timezone: Some(tz),
            } => write!(f, "cron '{expr}' ({tz})"),
            JobSchedule::Cron {
                expr,
                timezone: None,
            } => write!(f, "cron '{expr}'"),
        }
    }
}

/// Validate a cron expression.
///
/// The expression must use the 6-field format:
/// second minute hour day-of-month month day-of-week.
///
/// # Example
///
/// ```
/// use notifier_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 */3 * * * *").is_ok());
/// assert!(validate_cron_expression("0 30 4 * * *").is_ok());
///
/// assert!(validate_cron_expression("invalid").is_err());
/// assert!(validate_cron_expression("").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    // Building a throwaway job runs the same parser the scheduler uses.
    match Job::new_async(expr, |_uuid, _lock| Box::pin(async {})) {
        Ok(_) => Ok(()),
        Err(e) => Err(SchedulerError::InvalidCron(format!("'{expr}': {e}"))),
    }
}

/// Parse an IANA timezone name such as "America/New_York".
pub fn parse_timezone(name: &str) -> Result<Tz, SchedulerError> {
    name.parse::<Tz>()
        .map_err(|_| SchedulerError::InvalidTimezone(name.to_string()))
}
