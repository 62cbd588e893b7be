use crate::domain::models::{SessionKind, TimerSession};
use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

pub const NO_TASK_ID: &str = "__none__";
const TOP_TASKS: usize = 10;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodBucket {
    pub date: String,
    pub total_minutes: f64,
    pub session_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskBucket {
    pub task_id: String,
    pub task_name: String,
    pub total_minutes: f64,
    pub session_count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSummary {
    pub total_minutes: f64,
    pub total_sessions: usize,
    pub avg_minutes_per_day: f64,
}

fn focused_work(sessions: &[TimerSession]) -> impl Iterator<Item = (&TimerSession, u32)> {
    sessions.iter().filter_map(|session| match (session.session_type, session.duration) {
        (SessionKind::Work, Some(seconds)) if seconds > 0 => Some((session, seconds)),
        _ => None,
    })
}

fn minutes(seconds: u32) -> f64 {
    f64::from(seconds) / 60.0
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn bucketize(
    sessions: &[TimerSession],
    keys: impl IntoIterator<Item = NaiveDate>,
    key_of: impl Fn(NaiveDate) -> NaiveDate,
) -> Vec<PeriodBucket> {
    let mut buckets: BTreeMap<NaiveDate, PeriodBucket> = keys
        .into_iter()
        .map(|date| {
            (
                date,
                PeriodBucket {
                    date: date.format("%Y-%m-%d").to_string(),
                    total_minutes: 0.0,
                    session_count: 0,
                },
            )
        })
        .collect();

    for (session, seconds) in focused_work(sessions) {
        if let Some(bucket) = buckets.get_mut(&key_of(session.started_at.date_naive())) {
            bucket.total_minutes += minutes(seconds);
            bucket.session_count += 1;
        }
    }
    buckets.into_values().collect()
}

/// One bucket per day for the `days` days ending on `today`.
pub fn aggregate_by_day(sessions: &[TimerSession], days: u32, today: NaiveDate) -> Vec<PeriodBucket> {
    let keys = (0..i64::from(days)).rev().map(|offset| today - Duration::days(offset));
    bucketize(sessions, keys, |date| date)
}

/// Monday-keyed buckets for the `weeks` weeks ending with the current one.
pub fn aggregate_by_week(sessions: &[TimerSession], weeks: u32, today: NaiveDate) -> Vec<PeriodBucket> {
    let current = week_start(today);
    let keys = (0..i64::from(weeks)).rev().map(|offset| current - Duration::weeks(offset));
    bucketize(sessions, keys, week_start)
}

pub fn aggregate_by_month(sessions: &[TimerSession], months: u32, today: NaiveDate) -> Vec<PeriodBucket> {
    let current = month_start(today);
    let keys = (0..months)
        .rev()
        .filter_map(|offset| current.checked_sub_months(Months::new(offset)));
    bucketize(sessions, keys, month_start)
}

/// Top tasks by focused minutes. Sessions without a task are grouped under
/// [`NO_TASK_ID`].
pub fn aggregate_by_task(sessions: &[TimerSession], task_names: &HashMap<String, String>) -> Vec<TaskBucket> {
    let mut buckets: HashMap<String, TaskBucket> = HashMap::new();
    for (session, seconds) in focused_work(sessions) {
        let task_id = session.task_id.clone().unwrap_or_else(|| NO_TASK_ID.to_string());
        let bucket = buckets.entry(task_id.clone()).or_insert_with(|| TaskBucket {
            task_name: task_names.get(&task_id).cloned().unwrap_or_else(|| {
                if task_id == NO_TASK_ID {
                    "No Task".to_string()
                } else {
                    task_id.clone()
                }
            }),
            task_id,
            total_minutes: 0.0,
            session_count: 0,
        });
        bucket.total_minutes += minutes(seconds);
        bucket.session_count += 1;
    }

    let mut ranked: Vec<TaskBucket> = buckets.into_values().collect();
    ranked.sort_by(|left, right| {
        right
            .total_minutes
            .total_cmp(&left.total_minutes)
            .then_with(|| left.task_id.cmp(&right.task_id))
    });
    ranked.truncate(TOP_TASKS);
    ranked
}

pub fn focus_summary(sessions: &[TimerSession]) -> FocusSummary {
    let mut total_minutes = 0.0;
    let mut total_sessions = 0usize;
    let mut days: HashSet<NaiveDate> = HashSet::new();
    for (session, seconds) in focused_work(sessions) {
        total_minutes += minutes(seconds);
        total_sessions += 1;
        days.insert(session.started_at.date_naive());
    }
    FocusSummary {
        total_minutes,
        total_sessions,
        avg_minutes_per_day: if days.is_empty() {
            0.0
        } else {
            total_minutes / days.len() as f64
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn session(id: i64, kind: SessionKind, started_at: &str, duration: Option<u32>, task_id: Option<&str>) -> TimerSession {
        TimerSession {
            id,
            task_id: task_id.map(ToOwned::to_owned),
            session_type: kind,
            started_at: DateTime::parse_from_rfc3339(started_at)
                .expect("valid datetime")
                .with_timezone(&Utc),
            completed_at: None,
            duration,
            completed: duration.is_some(),
        }
    }

    fn sample_sessions() -> Vec<TimerSession> {
        vec![
            session(1, SessionKind::Work, "2026-02-16T09:00:00Z", Some(1500), Some("task-a")),
            session(2, SessionKind::Work, "2026-02-16T10:00:00Z", Some(900), Some("task-b")),
            session(3, SessionKind::Break, "2026-02-16T10:30:00Z", Some(300), None),
            session(4, SessionKind::Work, "2026-02-18T09:00:00Z", Some(1200), None),
            session(5, SessionKind::Work, "2026-02-18T11:00:00Z", Some(0), Some("task-a")),
            session(6, SessionKind::Work, "2026-01-05T09:00:00Z", Some(600), Some("task-a")),
        ]
    }

    #[test]
    fn day_buckets_are_prefilled_and_skip_breaks() {
        let buckets = aggregate_by_day(&sample_sessions(), 3, date("2026-02-18"));
        let keys: Vec<&str> = buckets.iter().map(|bucket| bucket.date.as_str()).collect();
        assert_eq!(keys, vec!["2026-02-16", "2026-02-17", "2026-02-18"]);
        assert_eq!(buckets[0].total_minutes, 40.0);
        assert_eq!(buckets[0].session_count, 2);
        assert_eq!(buckets[1].session_count, 0);
        assert_eq!(buckets[2].total_minutes, 20.0);
        assert_eq!(buckets[2].session_count, 1);
    }

    #[test]
    fn week_buckets_start_on_monday() {
        let buckets = aggregate_by_week(&sample_sessions(), 2, date("2026-02-21"));
        let keys: Vec<&str> = buckets.iter().map(|bucket| bucket.date.as_str()).collect();
        assert_eq!(keys, vec!["2026-02-09", "2026-02-16"]);
        assert_eq!(buckets[1].session_count, 3);
        assert_eq!(buckets[1].total_minutes, 60.0);
    }

    #[test]
    fn month_buckets_cover_requested_range() {
        let buckets = aggregate_by_month(&sample_sessions(), 2, date("2026-02-18"));
        let keys: Vec<&str> = buckets.iter().map(|bucket| bucket.date.as_str()).collect();
        assert_eq!(keys, vec!["2026-01-01", "2026-02-01"]);
        assert_eq!(buckets[0].total_minutes, 10.0);
        assert_eq!(buckets[1].session_count, 3);
    }

    #[test]
    fn task_buckets_rank_by_minutes_and_name_missing_tasks() {
        let names = HashMap::from([("task-a".to_string(), "Write report".to_string())]);
        let buckets = aggregate_by_task(&sample_sessions(), &names);
        let ranked: Vec<(&str, &str)> = buckets
            .iter()
            .map(|bucket| (bucket.task_id.as_str(), bucket.task_name.as_str()))
            .collect();
        assert_eq!(
            ranked,
            vec![("task-a", "Write report"), (NO_TASK_ID, "No Task"), ("task-b", "task-b")]
        );
        assert_eq!(buckets[0].total_minutes, 35.0);
    }

    #[test]
    fn summary_averages_over_active_days() {
        let summary = focus_summary(&sample_sessions());
        assert_eq!(summary.total_sessions, 4);
        assert_eq!(summary.total_minutes, 70.0);
        assert!((summary.avg_minutes_per_day - 70.0 / 3.0).abs() < 1e-9);
        assert_eq!(focus_summary(&[]).avg_minutes_per_day, 0.0);
    }
}
