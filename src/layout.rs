use anyhow::Result;
use chrono::{DateTime, Duration, DurationRound, TimeZone};

use crate::model::Task;

/// Duration given to tasks without a usable estimate, in minutes.
pub const DEFAULT_ESTIMATE_MINUTES: u32 = 45;

/// A task placed on the timeline.
#[derive(Debug, Clone)]
pub struct ScheduledTask<Tz: TimeZone> {
    pub task: Task,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl<Tz: TimeZone> ScheduledTask<Tz> {
    pub fn duration(&self) -> Duration {
        self.end.clone() - self.start.clone()
    }
}

pub type Schedule<Tz> = Vec<ScheduledTask<Tz>>;

/// Minutes a task occupies on the timeline. An estimate of zero counts as
/// missing.
pub fn effective_minutes(task: &Task) -> u32 {
    match task.est_minutes {
        Some(minutes) if minutes > 0 => minutes,
        _ => DEFAULT_ESTIMATE_MINUTES,
    }
}

/// Pending tasks in the order they will be worked on: ascending priority,
/// ties kept in input order.
fn pending_in_order(tasks: &[Task]) -> Vec<&Task> {
    let mut pending: Vec<&Task> = tasks.iter().filter(|task| !task.done).collect();
    // sort_by_key is stable
    pending.sort_by_key(|task| task.priority);
    pending
}

/// Stack the pending tasks end to end starting at `anchor`.
///
/// Done tasks are dropped. The result has no gaps and no overlaps: every
/// entry starts where the previous one ended, and the first one starts at
/// `anchor`. Tasks that would end past the last representable instant are
/// left off the end.
pub fn layout<Tz: TimeZone>(tasks: &[Task], anchor: DateTime<Tz>) -> Schedule<Tz> {
    let mut cursor = anchor;
    let mut schedule = Vec::new();

    for task in pending_in_order(tasks) {
        let length = Duration::minutes(i64::from(effective_minutes(task)));
        let end = match cursor.clone().checked_add_signed(length) {
            Some(end) => end,
            None => break,
        };
        let start = std::mem::replace(&mut cursor, end.clone());
        schedule.push(ScheduledTask {
            task: task.clone(),
            start,
            end,
        });
    }

    schedule
}

/// Keep the pending tasks that fit in `budget`, in work order.
///
/// A task that does not fit in what is left is skipped and the next one is
/// tried.
pub fn fit_budget(tasks: &[Task], budget: Duration) -> Vec<Task> {
    let mut left = budget.num_minutes();
    let mut kept = Vec::new();

    for task in pending_in_order(tasks) {
        let minutes = i64::from(effective_minutes(task));
        if minutes <= left {
            kept.push(task.clone());
            left -= minutes;
        }
    }

    kept
}

/// Return `now` with seconds and sub-seconds cut to zero.
pub fn anchor_at<Tz: TimeZone>(now: DateTime<Tz>) -> Result<DateTime<Tz>> {
    let anchor = now.duration_trunc(Duration::minutes(1))?;
    Ok(anchor)
}
