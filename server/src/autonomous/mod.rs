use chrono::{DateTime, Duration, Utc};

mod auto_archive;
mod daily_summary;
mod digest_template;
mod follow_up;
mod meeting_prep;
mod re_evaluate;
mod runner;

pub use runner::*;

/// Outcome of one autonomous task attempt. Only `Ran` advances the task's
/// `last_run_utc`; a skipped task stays due.
pub enum TaskOutcome {
    Ran(String),
    Skipped(&'static str),
}

/// Interval gate: a task is due when it has never run or its minimum
/// interval has fully elapsed.
pub fn task_due(last_run: Option<DateTime<Utc>>, interval_minutes: i64, now: DateTime<Utc>) -> bool {
    match last_run {
        None => true,
        Some(last) => now - last >= Duration::minutes(interval_minutes),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_never_run_is_due() {
        let now = Utc.with_ymd_and_hms(2025, 2, 10, 12, 0, 0).unwrap();
        assert!(task_due(None, 60, now));
    }

    #[test]
    fn test_too_recent_is_not_due() {
        let now = Utc.with_ymd_and_hms(2025, 2, 10, 12, 0, 0).unwrap();
        let last = now - Duration::minutes(59);
        assert!(!task_due(Some(last), 60, now));
    }

    #[test]
    fn test_exact_interval_is_due() {
        let now = Utc.with_ymd_and_hms(2025, 2, 10, 12, 0, 0).unwrap();
        let last = now - Duration::minutes(60);
        assert!(task_due(Some(last), 60, now));
    }

    #[test]
    fn test_two_runs_are_at_least_interval_apart() {
        // Simulates the invariant: once last_run is written, the gate holds
        // until a full interval has passed.
        let interval = 1440;
        let first_run = Utc.with_ymd_and_hms(2025, 2, 10, 3, 0, 0).unwrap();
        let mut probe = first_run;
        let mut second_run = None;

        for _ in 0..2000 {
            probe += Duration::minutes(5);
            if task_due(Some(first_run), interval, probe) {
                second_run = Some(probe);
                break;
            }
        }

        assert!(second_run.unwrap() - first_run >= Duration::minutes(interval));
    }
}
