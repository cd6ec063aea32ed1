use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::models::*;

/// Capacity of the store-wide change feed. Subscribers that fall further
/// behind than this re-query instead of replaying.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── Change feed message types ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum StoreEvent {
    TaskCreated {
        task: Task,
    },
    TaskMoved {
        task_id: TaskId,
        project_id: ProjectId,
        from_column: Column,
        to_column: Column,
        position: Option<i64>,
    },
    TaskDeleted {
        task_id: TaskId,
        project_id: ProjectId,
    },
    ProjectCreated {
        project: Project,
    },
    ProjectDeleted {
        project_id: ProjectId,
        owner_id: OwnerId,
        tasks_removed: usize,
    },
}

impl StoreEvent {
    /// Whether a task query filtered on `project_id` could see a different
    /// result set after this event.
    pub fn touches_project(&self, project_id: &str) -> bool {
        match self {
            StoreEvent::TaskCreated { task } => task.project_id == project_id,
            StoreEvent::TaskMoved { project_id: p, .. }
            | StoreEvent::TaskDeleted { project_id: p, .. }
            | StoreEvent::ProjectDeleted { project_id: p, .. } => p == project_id,
            StoreEvent::ProjectCreated { .. } => false,
        }
    }

    /// Whether a project query filtered on `owner_id` is affected.
    pub fn touches_owner(&self, owner_id: &str) -> bool {
        match self {
            StoreEvent::ProjectCreated { project } => project.owner_id == owner_id,
            StoreEvent::ProjectDeleted { owner_id: o, .. } => o == owner_id,
            _ => false,
        }
    }
}

// ── Broadcast helper ─────────────────────────────────────────────────

/// Publish a change to every live subscription.
/// Returns silently even if nothing is subscribed.
pub fn broadcast_event(tx: &broadcast::Sender<StoreEvent>, event: StoreEvent) {
    tracing::trace!(?event, "store change");
    let _ = tx.send(event); // Ignore error if no receivers
}

// ── Tests ────────────────────────────────────────────────────────────
