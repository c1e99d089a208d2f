use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::convert::TryFrom;

/// Priority given to tasks added without one.
pub const DEFAULT_PRIORITY: i64 = 2;

/// Estimate stored for tasks added without one, in minutes.
pub const DEFAULT_ESTIMATE: u32 = 45;

/// A single task, saved as an entry in the task table.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub priority: i64, // lower is sooner
    pub done: bool,
    pub est_minutes: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: i64, title: impl Into<String>, priority: i64) -> Self {
        Task {
            id,
            title: title.into(),
            priority,
            done: false,
            est_minutes: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_estimate(mut self, minutes: u32) -> Self {
        self.est_minutes = Some(minutes);
        self
    }
}

#[cfg(test)]
impl Task {
    pub fn completed(mut self) -> Self {
        self.done = true;
        self
    }
}

const TASK_COLUMNS: &str = "id, title, priority, done, est_minutes, created_at";

/// Initialize the journal database.
pub fn init_journal(db: &Connection) -> Result<()> {
    db.execute(
        "CREATE TABLE if not exists task (
                  id              INTEGER PRIMARY KEY AUTOINCREMENT,
                  title           TEXT NOT NULL,
                  priority        INTEGER NOT NULL DEFAULT 2,
                  done            INTEGER NOT NULL DEFAULT 0,
                  est_minutes     INTEGER,
                  created_at      TEXT NOT NULL
                  )",
        [],
    )
    .context("Failed to create task table.")?;

    db.execute(
        "CREATE INDEX if not exists done_priority ON task (done, priority)",
        [],
    )
    .context("Failed to create index on task table.")?;

    Ok(())
}

/// Return every task, ordered by priority and then by insertion.
pub fn tasks(db: &Connection) -> Result<Vec<Task>> {
    let mut stmt = db
        .prepare(&format!(
            "SELECT {} FROM task ORDER BY priority, id",
            TASK_COLUMNS
        ))
        .context("Failed to fetch tasks from database.")?;
    let mapped_rows = stmt
        .query_map([], |row| task_from_row(row))
        .context("Failed to fetch tasks from database.")?;

    let mut tasks = Vec::new();
    for task in mapped_rows {
        tasks.push(task.context("Failed to read task from database.")?);
    }

    Ok(tasks)
}

/// Add a task and return its id. Missing estimates and priorities get the
/// defaults.
pub fn add_task(
    db: &Connection,
    title: &str,
    est_minutes: Option<u32>,
    priority: Option<i64>,
) -> Result<i64> {
    let title = title.trim();
    if title.is_empty() {
        return Err(anyhow!("A task needs a title."));
    }

    db.execute(
        "INSERT INTO task (title, priority, done, est_minutes, created_at) VALUES(?1, ?2, 0, ?3, ?4)",
        params![
            title,
            priority.unwrap_or(DEFAULT_PRIORITY),
            est_minutes.unwrap_or(DEFAULT_ESTIMATE),
            Utc::now()
        ],
    )
    .context("Failed to insert task to database.")?;

    Ok(db.last_insert_rowid())
}

/// Mark the task as done. Returns false when no task has that id.
pub fn mark_done(db: &Connection, id: i64) -> Result<bool> {
    let changed = db
        .execute("UPDATE task set done = 1 where id = ?1", params![id])
        .with_context(|| format!("Failed to mark task {} as done in the database.", id))?;
    Ok(changed > 0)
}

/// Delete every done task. Returns how many were removed.
pub fn clear_done(db: &Connection) -> Result<usize> {
    let removed = db
        .execute("DELETE FROM task WHERE done = 1", [])
        .context("Failed to remove done tasks from database.")?;
    Ok(removed)
}

/// Return every task, done or not, newest first. With a query, only the
/// tasks whose title contains it (ignoring case).
pub fn history(db: &Connection, query: Option<&str>) -> Result<Vec<Task>> {
    let mut stmt = db
        .prepare(&format!(
            "SELECT {} FROM task ORDER BY created_at DESC, id DESC",
            TASK_COLUMNS
        ))
        .context("Failed to fetch history from database.")?;
    let mapped_rows = stmt
        .query_map([], |row| task_from_row(row))
        .context("Failed to fetch history from database.")?;

    let needle = query.map(str::to_lowercase);
    let mut tasks = Vec::new();
    for task in mapped_rows {
        let task = task.context("Failed to read task from database.")?;
        match &needle {
            Some(needle) if !task.title.to_lowercase().contains(needle.as_str()) => {}
            _ => tasks.push(task),
        }
    }

    Ok(tasks)
}

/// Return a task from a row in this order: [id, title, priority, done,
/// est_minutes, created_at]
pub fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    // negative or oversized estimates read back as missing
    let est_minutes = row
        .get::<_, Option<i64>>(4)?
        .and_then(|minutes| u32::try_from(minutes).ok())
        .filter(|minutes| *minutes > 0);

    let task = Task {
        id: row.get(0)?,
        title: row.get(1)?,
        priority: row.get(2)?,
        done: row.get(3)?,
        est_minutes,
        created_at: row.get::<_, DateTime<Utc>>(5)?,
    };
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn journal() -> Connection {
        let db = Connection::open_in_memory().unwrap();
        init_journal(&db).unwrap();
        db
    }

    #[test]
    fn init_twice_is_harmless() {
        let db = journal();
        init_journal(&db).unwrap();
    }

    #[test]
    fn add_applies_defaults() {
        let db = journal();
        let id = add_task(&db, "  Write report ", None, None).unwrap();

        let all = tasks(&db).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].title, "Write report");
        assert_eq!(all[0].priority, DEFAULT_PRIORITY);
        assert_eq!(all[0].est_minutes, Some(DEFAULT_ESTIMATE));
        assert!(!all[0].done);
    }

    #[test]
    fn blank_titles_are_rejected() {
        let db = journal();
        assert!(add_task(&db, "   ", None, None).is_err());
        assert!(tasks(&db).unwrap().is_empty());
    }

    #[test]
    fn tasks_come_back_by_priority_then_id() {
        let db = journal();
        let a = add_task(&db, "a", None, Some(3)).unwrap();
        let b = add_task(&db, "b", None, Some(1)).unwrap();
        let c = add_task(&db, "c", None, Some(3)).unwrap();
        let d = add_task(&db, "d", None, Some(1)).unwrap();

        let ids: Vec<i64> = tasks(&db).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![b, d, a, c]);
    }

    #[test]
    fn mark_done_sets_flag() {
        let db = journal();
        let id = add_task(&db, "walk", Some(20), None).unwrap();

        assert!(mark_done(&db, id).unwrap());
        assert!(tasks(&db).unwrap()[0].done);
    }

    #[test]
    fn mark_done_unknown_id_is_not_an_error() {
        let db = journal();
        assert!(!mark_done(&db, 42).unwrap());
    }

    #[test]
    fn clear_done_keeps_pending_tasks() {
        let db = journal();
        let walk = add_task(&db, "walk", None, Some(1)).unwrap();
        let read = add_task(&db, "read", None, Some(2)).unwrap();
        let cook = add_task(&db, "cook", None, Some(3)).unwrap();
        mark_done(&db, walk).unwrap();
        mark_done(&db, cook).unwrap();

        assert_eq!(clear_done(&db).unwrap(), 2);
        assert_eq!(clear_done(&db).unwrap(), 0);

        let left: Vec<i64> = history(&db, None).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(left, vec![read]);
    }

    #[test]
    fn unusable_estimates_read_as_missing() {
        let db = journal();
        db.execute(
            "INSERT INTO task (title, priority, done, est_minutes, created_at) VALUES('neg', 1, 0, -5, ?1)",
            params![Utc::now()],
        )
        .unwrap();
        db.execute(
            "INSERT INTO task (title, priority, done, est_minutes, created_at) VALUES('zero', 2, 0, 0, ?1)",
            params![Utc::now()],
        )
        .unwrap();
        db.execute(
            "INSERT INTO task (title, priority, done, est_minutes, created_at) VALUES('null', 3, 0, NULL, ?1)",
            params![Utc::now()],
        )
        .unwrap();

        let all = tasks(&db).unwrap();
        assert!(all.iter().all(|t| t.est_minutes.is_none()));
    }

    #[test]
    fn history_is_newest_first_and_filtered() {
        let db = journal();
        let first = add_task(&db, "Prepare report", None, None).unwrap();
        let second = add_task(&db, "Team meeting", None, Some(1)).unwrap();
        let third = add_task(&db, "Send REPORT", None, Some(3)).unwrap();
        mark_done(&db, first).unwrap();

        let all: Vec<i64> = history(&db, None).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(all, vec![third, second, first]);

        let found: Vec<i64> = history(&db, Some("Report"))
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(found, vec![third, first]);
    }

    #[test]
    fn journal_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.sqlite");
        {
            let db = Connection::open(&path).unwrap();
            init_journal(&db).unwrap();
            add_task(&db, "persisted", Some(30), Some(1)).unwrap();
        }

        let db = Connection::open(&path).unwrap();
        let all = tasks(&db).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "persisted");
        assert_eq!(all[0].est_minutes, Some(30));
    }
}
