//! The document-store contract the board is written against.
//!
//! A store pushes the *entire* current result set of a filtered query to a
//! [`Subscription`] whenever a matching document changes, and offers
//! single-document create/update/delete plus a monotonic server clock.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::models::*;
use crate::errors::BoardResult;

/// Maximum number of undelivered snapshots buffered per subscription.
pub const SNAPSHOT_BUFFER: usize = 64;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stream every task whose `project_id` matches.
    async fn subscribe_tasks(&self, project_id: &str) -> BoardResult<Subscription<Task>>;

    /// Stream every project owned by `owner_id`.
    async fn subscribe_projects(&self, owner_id: &str) -> BoardResult<Subscription<Project>>;

    async fn create_task(&self, task: NewTask) -> BoardResult<Task>;

    async fn create_project(&self, project: NewProject) -> BoardResult<Project>;

    /// Apply a partial update; `updated_at` is stamped with [`DocumentStore::now`].
    async fn update_task(&self, id: &str, patch: TaskPatch) -> BoardResult<()>;

    async fn delete_task(&self, id: &str) -> BoardResult<()>;

    /// Delete a project and all of its tasks in one atomic batch.
    /// Returns the number of tasks removed.
    async fn delete_project_cascade(&self, id: &str) -> BoardResult<usize>;

    /// Server-assigned timestamp, strictly increasing across calls.
    fn now(&self) -> Timestamp;
}

/// A live query. Dropping it (or calling [`Subscription::cancel`])
/// unsubscribes: the forwarding task is aborted and no further snapshot
/// is delivered.
pub struct Subscription<T> {
    rx: mpsc::Receiver<Vec<T>>,
    forwarder: Option<JoinHandle<()>>,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::Receiver<Vec<T>>, forwarder: JoinHandle<()>) -> Self {
        Self {
            rx,
            forwarder: Some(forwarder),
        }
    }

    /// A subscription fed directly by the caller, with no forwarding task.
    pub fn from_receiver(rx: mpsc::Receiver<Vec<T>>) -> Self {
        Self { rx, forwarder: None }
    }

    /// Wait for the next full result set. `None` once the store side closed.
    pub async fn next(&mut self) -> Option<Vec<T>> {
        self.rx.recv().await
    }

    /// Take an already-delivered snapshot without waiting.
    pub fn try_next(&mut self) -> Option<Vec<T>> {
        self.rx.try_recv().ok()
    }

    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.forwarder.take() {
            handle.abort();
        }
        self.rx.close();
        // Discard anything that was already queued.
        while self.rx.try_recv().is_ok() {}
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
