use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, TimeZone};
use humantime::format_duration;
use prettytable::Table;
use rusqlite::Connection;
use std::convert::TryFrom;
use std::time::Duration as STDDuration;
use tracing::{debug, info};

use crate::assistant::Assistant;
use crate::layout::{self, Schedule, ScheduledTask};
use crate::model::{self, Task};

const TITLE_WIDTH: usize = 40;

const NO_PENDING: &str = "No pending tasks.";

pub fn add_task(
    db: &Connection,
    title: String,
    estimate: Option<STDDuration>,
    priority: Option<i64>,
) -> Result<()> {
    let est_minutes = match estimate {
        Some(estimate) => Some(
            u32::try_from(estimate.as_secs() / 60).context("Estimated duration is too long.")?,
        ),
        None => None,
    };
    let id = model::add_task(db, &title, est_minutes, priority)?;
    info!(id, "task added");

    let task = Task::new(id, title.trim(), priority.unwrap_or(model::DEFAULT_PRIORITY))
        .with_estimate(est_minutes.unwrap_or(model::DEFAULT_ESTIMATE));
    println!(
        "{}. {} ({} · {})",
        task.id,
        task.title,
        fmt_priority(&task),
        fmt_minutes(layout::effective_minutes(&task))
    );
    Ok(())
}

pub fn done(db: &Connection, id: i64) -> Result<()> {
    if model::mark_done(db, id)? {
        info!(id, "task done");
        list(db, None)
    } else {
        println!("There is no task with id {}.", id);
        Ok(())
    }
}

/// Lay out the pending tasks from the current minute and print them.
pub fn list(db: &Connection, budget: Option<STDDuration>) -> Result<()> {
    let tasks = model::tasks(db)?;
    let tasks = match budget {
        Some(budget) => {
            let budget = Duration::from_std(budget).context("Budget is too long.")?;
            layout::fit_budget(&tasks, budget)
        }
        None => tasks,
    };

    let anchor = layout::anchor_at(Local::now())?;
    let schedule = layout::layout(&tasks, anchor);
    debug!(entries = schedule.len(), "schedule laid out");

    match schedule_table(&schedule) {
        Some(table) => {
            table.printstd();
        }
        None => println!("{}", NO_PENDING),
    }

    Ok(())
}

/// Build the table for a schedule, one row per entry. None when there is
/// nothing to show.
fn schedule_table<Tz: TimeZone>(schedule: &Schedule<Tz>) -> Option<Table> {
    if schedule.is_empty() {
        return None;
    }

    let mut table = Table::new();
    table.add_row(row!["id", "task", "time", "priority", "duration"]);
    for entry in schedule {
        table.add_row(row![
            entry.task.id,
            fmt_title(&entry.task),
            fmt_span(entry),
            fmt_priority(&entry.task),
            fmt_duration(entry.duration()),
        ]);
    }
    Some(table)
}

/// Delete the done tasks from the journal.
pub fn clear(db: &Connection) -> Result<()> {
    let removed = model::clear_done(db)?;
    info!(removed, "done tasks cleared");
    match removed {
        0 => println!("There are no done tasks to remove."),
        1 => println!("Removed 1 done task."),
        n => println!("Removed {} done tasks.", n),
    }
    Ok(())
}

pub fn history(db: &Connection, query: Option<String>) -> Result<()> {
    let tasks = model::history(db, query.as_deref())?;
    if tasks.is_empty() {
        println!("History is empty.");
        return Ok(());
    }

    let mut table = Table::new();
    table.add_row(row!["", "id", "task", "priority", "duration", "created"]);
    for task in &tasks {
        let mark = if task.done { "✔" } else { "-" };
        table.add_row(row![
            mark,
            task.id,
            fmt_title(task),
            fmt_priority(task),
            fmt_minutes(layout::effective_minutes(task)),
            task.created_at.with_timezone(&Local).format("%F %R"),
        ]);
    }
    table.printstd();

    Ok(())
}

/// Relay a prompt to the assistant and print its answer. When the
/// assistant says it rebuilt the schedule, render it again. Returns whether
/// it did.
pub fn ask(db: &Connection, assistant: &Assistant, prompt: &str) -> Result<bool> {
    if prompt.trim().is_empty() {
        return Ok(false);
    }
    debug!(endpoint = assistant.endpoint(), "relaying prompt");

    let reply = assistant
        .ask(prompt)
        .context("Failed to get an answer from the assistant.")?;
    println!("{}", reply.text);

    if reply.refresh {
        info!("assistant rebuilt the schedule, refreshing");
        println!();
        list(db, None)?;
    }
    Ok(reply.refresh)
}

fn fmt_title(task: &Task) -> String {
    textwrap::fill(&task.title, TITLE_WIDTH)
}

fn fmt_priority(task: &Task) -> String {
    format!("p{}", task.priority)
}

fn fmt_minutes(minutes: u32) -> String {
    format_duration(STDDuration::from_secs(u64::from(minutes) * 60)).to_string()
}

fn fmt_duration(duration: Duration) -> String {
    match duration.to_std() {
        Ok(duration) => format_duration(duration).to_string(),
        Err(_) => "-".to_string(),
    }
}

/// Format the time span of an entry as local hour:minute.
fn fmt_span<Tz: TimeZone>(entry: &ScheduledTask<Tz>) -> String {
    let start: DateTime<Local> = entry.start.with_timezone(&Local);
    let end: DateTime<Local> = entry.end.with_timezone(&Local);
    format!("{} - {}", start.format("%H:%M"), end.format("%H:%M"))
}
