use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Interval, MissedTickBehavior};

use super::events::{EVENT_CHANNEL_CAPACITY, StoreEvent, broadcast_event};
use super::models::*;
use super::store::{DocumentStore, SNAPSHOT_BUFFER, Subscription};
use crate::errors::{BoardError, BoardResult};

/// Monotonic millisecond clock shared by every write of one store.
///
/// Never hands out the same value twice, even when the wall clock stalls
/// or steps backwards.
#[derive(Debug, Default)]
pub struct ServerClock {
    last_millis: AtomicI64,
}

impl ServerClock {
    pub fn starting_after(millis: i64) -> Self {
        Self {
            last_millis: AtomicI64::new(millis),
        }
    }

    pub fn tick(&self) -> Timestamp {
        let wall = Utc::now().timestamp_millis();
        let mut current = self.last_millis.load(Ordering::SeqCst);
        loop {
            let next = wall.max(current + 1);
            match self.last_millis.compare_exchange(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return millis_to_timestamp(next),
                Err(observed) => current = observed,
            }
        }
    }
}

fn millis_to_timestamp(millis: i64) -> Timestamp {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Async-safe handle to the board database.
///
/// Wraps `StoreDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, keeping synchronous SQLite
/// I/O off the async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<StoreDb>>,
}

impl DbHandle {
    pub fn new(db: StoreDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> BoardResult<R>
    where
        F: FnOnce(&StoreDb) -> BoardResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| BoardError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct StoreDb {
    conn: Connection,
    clock: Arc<ServerClock>,
}

impl StoreDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> BoardResult<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;
        Self::init(conn)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> BoardResult<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> BoardResult<Self> {
        // Other processes may hold the file briefly while writing.
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        run_migrations(&conn).context("Failed to run migrations")?;

        // Resume the clock past anything already written so timestamps stay
        // monotonic across restarts.
        let last_written: i64 = conn
            .query_row(
                "SELECT MAX(COALESCE((SELECT MAX(updated_at) FROM tasks), 0),
                            COALESCE((SELECT MAX(updated_at) FROM projects), 0))",
                [],
                |row| row.get(0),
            )
            .context("Failed to read last write timestamp")?;

        Ok(Self {
            conn,
            clock: Arc::new(ServerClock::starting_after(last_written)),
        })
    }

    pub fn clock(&self) -> Arc<ServerClock> {
        self.clock.clone()
    }

    // ── Project documents ─────────────────────────────────────────────

    pub fn insert_project(&self, new: &NewProject) -> BoardResult<Project> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = self.clock.tick().timestamp_millis();
        self.conn.execute(
            "INSERT INTO projects (id, name, owner_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, new.name, new.owner_id, now],
        )?;
        self.get_project(&id)?
            .ok_or(BoardError::ProjectNotFound { id })
    }

    pub fn get_project(&self, id: &str) -> BoardResult<Option<Project>> {
        let project = self
            .conn
            .query_row(
                "SELECT id, name, owner_id, created_at, updated_at FROM projects WHERE id = ?1",
                params![id],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    pub fn list_projects(&self, owner_id: &str) -> BoardResult<Vec<Project>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, owner_id, created_at, updated_at
             FROM projects WHERE owner_id = ?1 ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map(params![owner_id], project_from_row)?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?);
        }
        Ok(projects)
    }

    /// Delete the project and every task referencing it in one transaction.
    pub fn delete_project_cascade(&self, id: &str) -> BoardResult<(Project, usize)> {
        let project = self
            .get_project(id)?
            .ok_or_else(|| BoardError::ProjectNotFound { id: id.to_string() })?;

        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let tasks_removed = tx.execute("DELETE FROM tasks WHERE project_id = ?1", params![id])?;
        tx.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        tx.commit().context("Failed to commit project delete")?;

        Ok((project, tasks_removed))
    }

    // ── Task documents ────────────────────────────────────────────────

    pub fn insert_task(&self, new: &NewTask) -> BoardResult<Task> {
        if self.get_project(&new.project_id)?.is_none() {
            return Err(BoardError::ProjectNotFound {
                id: new.project_id.clone(),
            });
        }
        let id = uuid::Uuid::new_v4().to_string();
        let now = self.clock.tick().timestamp_millis();
        self.conn.execute(
            "INSERT INTO tasks (id, title, column_name, project_id, owner_id, position, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id,
                new.title,
                new.column.as_str(),
                new.project_id,
                new.owner_id,
                new.position,
                now
            ],
        )?;
        self.get_task(&id)?.ok_or(BoardError::TaskNotFound { id })
    }

    pub fn get_task(&self, id: &str) -> BoardResult<Option<Task>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, title, column_name, project_id, owner_id, position, created_at, updated_at
                 FROM tasks WHERE id = ?1",
                params![id],
                TaskRow::from_row,
            )
            .optional()?;
        row.map(TaskRow::into_task).transpose()
    }

    /// Tasks of a project in arrival order. Callers sort by position.
    pub fn list_tasks(&self, project_id: &str) -> BoardResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, column_name, project_id, owner_id, position, created_at, updated_at
             FROM tasks WHERE project_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![project_id], TaskRow::from_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?.into_task()?);
        }
        Ok(tasks)
    }

    /// Apply a patch atomically. Returns the task before and after.
    pub fn patch_task(&self, id: &str, patch: &TaskPatch) -> BoardResult<(Task, Task)> {
        let before = self
            .get_task(id)?
            .ok_or_else(|| BoardError::TaskNotFound { id: id.to_string() })?;
        let now = self.clock.tick().timestamp_millis();

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        if let Some(column) = patch.column {
            tx.execute(
                "UPDATE tasks SET column_name = ?1 WHERE id = ?2",
                params![column.as_str(), id],
            )?;
        }
        if let Some(position) = patch.position {
            tx.execute(
                "UPDATE tasks SET position = ?1 WHERE id = ?2",
                params![position, id],
            )?;
        }
        tx.execute(
            "UPDATE tasks SET updated_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        tx.commit().context("Failed to commit task update")?;

        let after = self
            .get_task(id)?
            .ok_or_else(|| BoardError::TaskNotFound { id: id.to_string() })?;
        Ok((before, after))
    }

    pub fn remove_task(&self, id: &str) -> BoardResult<Task> {
        let task = self
            .get_task(id)?
            .ok_or_else(|| BoardError::TaskNotFound { id: id.to_string() })?;
        self.conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(task)
    }
}

fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            column_name TEXT NOT NULL DEFAULT 'backlog',
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            owner_id TEXT NOT NULL,
            position INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
        ",
    )
}

fn project_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        created_at: millis_to_timestamp(row.get(3)?),
        updated_at: millis_to_timestamp(row.get(4)?),
    })
}

struct TaskRow {
    id: String,
    title: String,
    column_name: String,
    project_id: String,
    owner_id: String,
    position: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            column_name: row.get(2)?,
            project_id: row.get(3)?,
            owner_id: row.get(4)?,
            position: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_task(self) -> BoardResult<Task> {
        let column = Column::from_str(&self.column_name).map_err(|message| {
            BoardError::InvalidColumn {
                column: self.column_name.clone(),
                message,
            }
        })?;
        Ok(Task {
            id: self.id,
            title: self.title,
            column,
            project_id: self.project_id,
            owner_id: self.owner_id,
            position: self.position,
            created_at: millis_to_timestamp(self.created_at),
            updated_at: millis_to_timestamp(self.updated_at),
        })
    }
}

// ── DocumentStore implementation ──────────────────────────────────────

/// SQLite-backed document store with a broadcast change feed.
#[derive(Clone)]
pub struct SqliteStore {
    db: DbHandle,
    clock: Arc<ServerClock>,
    events: broadcast::Sender<StoreEvent>,
    poll_interval: Option<Duration>,
}

impl SqliteStore {
    pub fn new(db: StoreDb) -> Self {
        let clock = db.clock();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            db: DbHandle::new(db),
            clock,
            events,
            poll_interval: None,
        }
    }

    pub fn open(path: &Path) -> BoardResult<Self> {
        Ok(Self::new(StoreDb::new(path)?))
    }

    pub fn in_memory() -> BoardResult<Self> {
        Ok(Self::new(StoreDb::new_in_memory()?))
    }

    /// Also re-query every `interval`, pushing only result sets that
    /// differ from the last one delivered. Picks up writes made by other
    /// processes sharing the database file. A zero interval turns polling
    /// off.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Spawn the task that re-runs `query` and pushes the full result set
    /// whenever a change matching `key` is broadcast.
    fn spawn_subscription<T>(
        &self,
        key: String,
        query: fn(&StoreDb, &str) -> BoardResult<Vec<T>>,
        matches: fn(&StoreEvent, &str) -> bool,
    ) -> Subscription<T>
    where
        T: Clone + PartialEq + Send + 'static,
    {
        // Subscribe to the feed before the first query so no change can
        // slip between the initial snapshot and the listen loop.
        let mut feed = self.events.subscribe();
        let db = self.db.clone();
        let mut poll = self.poll_interval.map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);

        let forwarder = tokio::spawn(async move {
            let mut last: Option<Vec<T>> = None;
            let mut refresh = Refresh::Changed;

            'forward: loop {
                match query_snapshot(&db, &key, query).await {
                    Ok(docs) => {
                        let unchanged =
                            refresh == Refresh::Poll && last.as_ref() == Some(&docs);
                        if !unchanged {
                            last = Some(docs.clone());
                            if tx.send(docs).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => tracing::error!(%key, error = %e, "subscription query failed"),
                }

                refresh = loop {
                    tokio::select! {
                        _ = tx.closed() => break 'forward,
                        _ = next_tick(&mut poll) => break Refresh::Poll,
                        event = feed.recv() => match event {
                            Ok(event) if matches(&event, &key) => break Refresh::Changed,
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                tracing::warn!(%key, missed, "subscription lagged; re-querying");
                                break Refresh::Changed;
                            }
                            Err(broadcast::error::RecvError::Closed) => break 'forward,
                        },
                    }
                };
            }
            tracing::debug!(%key, "subscription closed");
        });

        Subscription::new(rx, forwarder)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    Changed,
    Poll,
}

async fn next_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn query_snapshot<T>(
    db: &DbHandle,
    key: &str,
    query: fn(&StoreDb, &str) -> BoardResult<Vec<T>>,
) -> BoardResult<Vec<T>>
where
    T: Send + 'static,
{
    let key = key.to_string();
    db.call(move |db| query(db, &key)).await
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn subscribe_tasks(&self, project_id: &str) -> BoardResult<Subscription<Task>> {
        tracing::debug!(project_id, "subscribing to tasks");
        Ok(self.spawn_subscription(
            project_id.to_string(),
            StoreDb::list_tasks,
            StoreEvent::touches_project,
        ))
    }

    async fn subscribe_projects(&self, owner_id: &str) -> BoardResult<Subscription<Project>> {
        tracing::debug!(owner_id, "subscribing to projects");
        Ok(self.spawn_subscription(
            owner_id.to_string(),
            StoreDb::list_projects,
            StoreEvent::touches_owner,
        ))
    }

    async fn create_task(&self, task: NewTask) -> BoardResult<Task> {
        let task = self.db.call(move |db| db.insert_task(&task)).await?;
        tracing::info!(task_id = %task.id, project_id = %task.project_id, column = %task.column, "task created");
        broadcast_event(&self.events, StoreEvent::TaskCreated { task: task.clone() });
        Ok(task)
    }

    async fn create_project(&self, project: NewProject) -> BoardResult<Project> {
        let project = self.db.call(move |db| db.insert_project(&project)).await?;
        tracing::info!(project_id = %project.id, name = %project.name, "project created");
        broadcast_event(
            &self.events,
            StoreEvent::ProjectCreated {
                project: project.clone(),
            },
        );
        Ok(project)
    }

    async fn update_task(&self, id: &str, patch: TaskPatch) -> BoardResult<()> {
        let task_id = id.to_string();
        let (before, after) = self
            .db
            .call(move |db| db.patch_task(&task_id, &patch))
            .await?;

        broadcast_event(
            &self.events,
            StoreEvent::TaskMoved {
                task_id: after.id,
                project_id: after.project_id,
                from_column: before.column,
                to_column: after.column,
                position: after.position,
            },
        );
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> BoardResult<()> {
        let task_id = id.to_string();
        let task = self.db.call(move |db| db.remove_task(&task_id)).await?;
        tracing::info!(task_id = %task.id, "task deleted");
        broadcast_event(
            &self.events,
            StoreEvent::TaskDeleted {
                task_id: task.id,
                project_id: task.project_id,
            },
        );
        Ok(())
    }

    async fn delete_project_cascade(&self, id: &str) -> BoardResult<usize> {
        let project_id = id.to_string();
        let (project, tasks_removed) = self
            .db
            .call(move |db| db.delete_project_cascade(&project_id))
            .await?;
        tracing::info!(project_id = %project.id, tasks_removed, "project deleted");
        broadcast_event(
            &self.events,
            StoreEvent::ProjectDeleted {
                project_id: project.id,
                owner_id: project.owner_id,
                tasks_removed,
            },
        );
        Ok(tasks_removed)
    }

    fn now(&self) -> Timestamp {
        self.clock.tick()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
