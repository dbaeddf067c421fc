//! Schedule evaluation for due jobs.
//!
//! A job's next execution time comes from its cron expression when present
//! (evaluated in the job's timezone), else its fixed interval, else a
//! one-hour default. Evaluation problems degrade per job: an invalid
//! expression logs a warning and falls back, so one bad job cannot stall a
//! polling cycle.

use crate::entity::ScheduledJobConfig;
use crate::error::ScheduleError;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use croner::Cron;

/// Computes when a job should run next, strictly after `after`.
#[must_use]
pub fn next_execution_time(job: &ScheduledJobConfig, after: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(expression) = &job.cron_expression {
        let timezone = job.timezone.as_deref().and_then(|name| {
            match name.parse::<Tz>() {
                Ok(tz) => Some(tz),
                Err(_) => {
                    tracing::warn!(
                        job_id = %job.id,
                        timezone = name,
                        "unknown timezone, evaluating cron in UTC"
                    );
                    None
                }
            }
        });

        match next_cron_occurrence(expression, timezone, after) {
            Ok(next) => return next,
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    error = %e,
                    "cron evaluation failed, falling back to interval"
                );
            }
        }
    }

    if let Some(minutes) = job.interval_minutes {
        return after + Duration::minutes(i64::from(minutes));
    }

    after + Duration::hours(1)
}

/// Computes the first cron occurrence strictly after `after`, optionally in
/// the given timezone.
///
/// Day-of-week numbering follows standard cron: 0 is Sunday.
///
/// # Errors
///
/// Fails when the expression does not parse or no occurrence can be found.
pub fn next_cron_occurrence(
    expression: &str,
    timezone: Option<Tz>,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    let cron = Cron::new(expression)
        .parse()
        .map_err(|e| ScheduleError::InvalidCronExpression {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;

    match timezone {
        Some(tz) => cron
            .find_next_occurrence(&after.with_timezone(&tz), false)
            .map(|next| next.with_timezone(&Utc))
            .map_err(|e| ScheduleError::EvaluationFailed {
                expression: expression.to_string(),
                reason: e.to_string(),
            }),
        None => cron
            .find_next_occurrence(&after, false)
            .map_err(|e| ScheduleError::EvaluationFailed {
                expression: expression.to_string(),
                reason: e.to_string(),
            }),
    }
}
