use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::watch;

use crate::models::Task;

/// Bumping this drops and recreates the tasks table on the next open.
const SCHEMA_VERSION: i32 = 2;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(i64),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Durable keyed storage for tasks: one SQLite table, upsert/delete/lookup
/// plus a live view of all rows published through a watch channel.
pub struct TaskStore {
    conn: Mutex<Connection>,
    all_tx: watch::Sender<Vec<Task>>,
}

impl TaskStore {
    /// Open the default database, honoring TASKPAD_DB when set.
    pub fn open_default() -> Result<Self, StoreError> {
        let db_path = match std::env::var("TASKPAD_DB") {
            Ok(path) => PathBuf::from(path),
            Err(_) => {
                let home_dir = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home_dir).join(".taskpad.db")
            }
        };
        Self::open(&db_path)
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        let tasks = load_all(&conn)?;
        let (all_tx, _) = watch::channel(tasks);

        Ok(TaskStore {
            conn: Mutex::new(conn),
            all_tx,
        })
    }

    /// Live sequence of all tasks in id order. The receiver holds the
    /// current snapshot immediately and sees every later change.
    pub fn observe_all(&self) -> watch::Receiver<Vec<Task>> {
        self.all_tx.subscribe()
    }

    /// Current snapshot of all tasks in id order.
    pub fn all(&self) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn.lock().unwrap();
        load_all(&conn)
    }

    /// Insert-or-replace by id. An id of 0 means "not yet assigned": the
    /// store picks a fresh id and returns the task carrying it. A non-zero
    /// id replaces the existing row, or inserts fresh if the row is gone
    /// (which is how restore-after-delete reuses the original id).
    pub fn upsert(&self, task: &Task) -> Result<Task, StoreError> {
        let saved = {
            let conn = self.conn.lock().unwrap();
            if task.id == 0 {
                conn.execute(
                    "INSERT INTO tasks (title, label, priority, created_at, is_done)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![task.title, task.label, task.priority, task.created_at, task.is_done],
                )?;
                let mut saved = task.clone();
                saved.id = conn.last_insert_rowid();
                saved
            } else {
                conn.execute(
                    "INSERT OR REPLACE INTO tasks (id, title, label, priority, created_at, is_done)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        task.id,
                        task.title,
                        task.label,
                        task.priority,
                        task.created_at,
                        task.is_done
                    ],
                )?;
                task.clone()
            }
        };
        log::debug!("upserted task {}", saved.id);
        self.publish();
        Ok(saved)
    }

    /// Remove a task by identity. Deleting an already-absent task is a no-op.
    pub fn delete(&self, task: &Task) -> Result<(), StoreError> {
        let removed = {
            let conn = self.conn.lock().unwrap();
            conn.execute("DELETE FROM tasks WHERE id = ?1", params![task.id])?
        };
        if removed > 0 {
            log::debug!("deleted task {}", task.id);
            self.publish();
        }
        Ok(())
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<Task>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let task = conn
            .query_row(
                "SELECT id, title, label, priority, created_at, is_done
                 FROM tasks WHERE id = ?1",
                params![id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    /// Re-read the table and push the snapshot to observers.
    fn publish(&self) {
        match self.all() {
            Ok(tasks) => {
                self.all_tx.send_replace(tasks);
            }
            Err(e) => {
                // Observers keep the last good snapshot.
                log::warn!("failed to reload tasks after write: {}", e);
            }
        }
    }
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version != SCHEMA_VERSION {
        // Destructive reset on version bump; there is no migration path.
        if version != 0 {
            log::warn!(
                "schema version changed ({} -> {}), resetting tasks table",
                version,
                SCHEMA_VERSION
            );
        }
        conn.execute("DROP TABLE IF EXISTS tasks", [])?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            label TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            is_done INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    Ok(())
}

fn load_all(conn: &Connection) -> Result<Vec<Task>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, label, priority, created_at, is_done FROM tasks ORDER BY id",
    )?;
    let rows = stmt.query_map([], task_from_row)?;

    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row?);
    }
    Ok(tasks)
}

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        label: row.get(2)?,
        priority: row.get(3)?,
        created_at: row.get(4)?,
        is_done: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(title: &str, label: &str, priority: i64, created_at: i64) -> Task {
        Task {
            id: 0,
            title: title.to_string(),
            label: label.to_string(),
            priority,
            created_at,
            is_done: false,
        }
    }

    #[test]
    fn insert_assigns_fresh_id() {
        let store = TaskStore::open_in_memory().unwrap();
        let saved = store.upsert(&task("Call mom", "Personal", 1, 100)).unwrap();
        assert_ne!(saved.id, 0);
        assert_eq!(saved.title, "Call mom");
        assert!(!saved.is_done);

        let other = store.upsert(&task("Buy milk", "Groceries", 0, 200)).unwrap();
        assert_ne!(other.id, saved.id);
    }

    #[test]
    fn upsert_with_known_id_replaces_in_place() {
        let store = TaskStore::open_in_memory().unwrap();
        let saved = store.upsert(&task("Buy milk", "Groceries", 0, 100)).unwrap();

        let mut edited = saved.clone();
        edited.title = "Buy oat milk".to_string();
        edited.priority = 2;
        let replaced = store.upsert(&edited).unwrap();
        assert_eq!(replaced.id, saved.id);

        let all = store.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Buy oat milk");
        assert_eq!(all[0].created_at, 100);
    }

    #[test]
    fn delete_then_reinsert_reuses_original_id() {
        let store = TaskStore::open_in_memory().unwrap();
        let saved = store.upsert(&task("Write report", "Work", 2, 100)).unwrap();
        store.delete(&saved).unwrap();
        assert!(store.all().unwrap().is_empty());

        // Restore-after-delete: the upsert must accept the stale id as a
        // fresh insert, not reject it.
        let restored = store.upsert(&saved).unwrap();
        assert_eq!(restored, saved);
        assert_eq!(store.all().unwrap(), vec![saved]);
    }

    #[test]
    fn delete_missing_task_is_a_no_op() {
        let store = TaskStore::open_in_memory().unwrap();
        let mut ghost = task("Nothing", "Personal", 0, 100);
        ghost.id = 42;
        store.delete(&ghost).unwrap();
        assert!(store.all().unwrap().is_empty());
    }

    #[test]
    fn get_by_id_distinguishes_not_found() {
        let store = TaskStore::open_in_memory().unwrap();
        let saved = store.upsert(&task("Buy milk", "Groceries", 0, 100)).unwrap();
        assert_eq!(store.get_by_id(saved.id).unwrap(), Some(saved));
        assert_eq!(store.get_by_id(999).unwrap(), None);
    }

    #[test]
    fn observe_all_replays_current_snapshot() {
        let store = TaskStore::open_in_memory().unwrap();
        store.upsert(&task("Buy milk", "Groceries", 0, 100)).unwrap();

        // A late subscriber sees the current state, not history.
        let rx = store.observe_all();
        assert_eq!(rx.borrow().len(), 1);

        store.upsert(&task("Write report", "Work", 2, 200)).unwrap();
        assert_eq!(rx.borrow().len(), 2);
    }

    #[test]
    fn reopen_on_same_path_retains_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");

        {
            let store = TaskStore::open(&path).unwrap();
            store.upsert(&task("Buy milk", "Groceries", 0, 100)).unwrap();
        }

        let store = TaskStore::open(&path).unwrap();
        let all = store.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Buy milk");
    }

    #[test]
    fn version_bump_resets_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");

        {
            let store = TaskStore::open(&path).unwrap();
            store.upsert(&task("Old world", "Work", 1, 100)).unwrap();
        }

        // Simulate an older schema on disk.
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", 1).unwrap();
        }

        let store = TaskStore::open(&path).unwrap();
        assert!(store.all().unwrap().is_empty());
    }
}
