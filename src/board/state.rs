//! In-memory task list for the selected project.
//!
//! The list is replaced wholesale by every snapshot of the active
//! subscription. Between snapshots, drag moves are applied optimistically
//! and tracked as mutations that end up confirmed, or failed and rolled
//! back.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::models::*;
use super::ordering::DropTarget;

pub type MutationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    /// Applied locally, write in flight.
    Pending,
    /// Write succeeded.
    Confirmed,
    /// Write failed; the local move was rolled back.
    Failed,
}

/// Handle for an optimistic move returned by [`BoardState::apply_move`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    pub id: MutationId,
    pub task_id: TaskId,
    pub from_column: Column,
    pub to_column: Column,
}

#[derive(Debug)]
struct MoveRecord {
    task_id: TaskId,
    to_column: Column,
    state: MutationState,
    /// Task as it was and where it sat, until a snapshot supersedes it.
    rollback: Option<(usize, Task)>,
}

#[derive(Debug, Default)]
pub struct BoardState {
    project_id: Option<ProjectId>,
    generation: u64,
    tasks: Vec<Task>,
    mutations: BTreeMap<MutationId, MoveRecord>,
    next_mutation: MutationId,
}

impl BoardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Generation of the active subscription. Snapshots carrying any other
    /// generation are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Tasks of one column, in list order.
    pub fn tasks_in(&self, column: Column) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| t.column == column)
    }

    /// Switch to another project (or none): the list and every tracked
    /// mutation are discarded. Returns the new generation.
    pub fn select(&mut self, project_id: Option<ProjectId>) -> u64 {
        self.project_id = project_id;
        self.tasks.clear();
        self.mutations.clear();
        self.generation += 1;
        self.generation
    }

    /// Replace the list with a snapshot. Returns `false` (and changes
    /// nothing) when the snapshot belongs to an older subscription.
    pub fn replace_snapshot(&mut self, generation: u64, docs: Vec<Task>) -> bool {
        if generation != self.generation {
            tracing::debug!(
                generation,
                current = self.generation,
                "dropping stale snapshot"
            );
            return false;
        }

        // Last occurrence of an id wins.
        let mut index: HashMap<TaskId, usize> = HashMap::with_capacity(docs.len());
        let mut tasks: Vec<Task> = Vec::with_capacity(docs.len());
        for doc in docs {
            match index.get(&doc.id) {
                Some(&i) => tasks[i] = doc,
                None => {
                    index.insert(doc.id.clone(), tasks.len());
                    tasks.push(doc);
                }
            }
        }
        // Stable: equal positions keep arrival order.
        tasks.sort_by_key(Task::sort_key);
        self.tasks = tasks;

        // The snapshot is authoritative; pending moves have nothing left
        // to restore. A move it already shows in the target column is done.
        for record in self.mutations.values_mut() {
            record.rollback = None;
            if record.state == MutationState::Pending
                && self
                    .tasks
                    .iter()
                    .any(|t| t.id == record.task_id && t.column == record.to_column)
            {
                record.state = MutationState::Confirmed;
            }
        }
        true
    }

    /// Optimistically move a task. `None` when the task is unknown.
    pub fn apply_move(
        &mut self,
        task_id: &str,
        column: Column,
        target: &DropTarget,
    ) -> Option<PendingMove> {
        let from_index = self.tasks.iter().position(|t| t.id == task_id)?;
        let original = self.tasks.remove(from_index);

        let mut moved = original.clone();
        moved.column = column;

        let insert_at = match target {
            // Dropped on its own indicator: stays where it was.
            DropTarget::Before(before) if before == task_id => from_index,
            DropTarget::Before(before) => self
                .tasks
                .iter()
                .position(|t| &t.id == before)
                .unwrap_or(self.tasks.len()),
            DropTarget::End => self.tasks.len(),
        };
        self.tasks.insert(insert_at, moved);

        let id = self.next_mutation;
        self.next_mutation += 1;
        self.mutations.insert(
            id,
            MoveRecord {
                task_id: task_id.to_string(),
                to_column: column,
                state: MutationState::Pending,
                rollback: Some((from_index, original.clone())),
            },
        );

        Some(PendingMove {
            id,
            task_id: task_id.to_string(),
            from_column: original.column,
            to_column: column,
        })
    }

    /// The move's write succeeded with the given ordering key.
    pub fn confirm(&mut self, mutation: MutationId, position: i64) {
        let Some(record) = self.mutations.get_mut(&mutation) else {
            return;
        };
        record.state = MutationState::Confirmed;
        record.rollback = None;
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == record.task_id) {
            task.position = Some(position);
        }
    }

    /// The move's write failed: put the task back where it was, unless a
    /// snapshot already replaced the list. A move a snapshot confirmed stays
    /// confirmed.
    pub fn fail(&mut self, mutation: MutationId) {
        let Some(record) = self.mutations.get_mut(&mutation) else {
            return;
        };
        if record.state != MutationState::Pending {
            return;
        }
        record.state = MutationState::Failed;
        let Some((from_index, original)) = record.rollback.take() else {
            return;
        };
        if let Some(current) = self.tasks.iter().position(|t| t.id == original.id) {
            self.tasks.remove(current);
        }
        let at = from_index.min(self.tasks.len());
        self.tasks.insert(at, original);
    }

    pub fn mutation_state(&self, mutation: MutationId) -> Option<MutationState> {
        self.mutations.get(&mutation).map(|r| r.state)
    }

    /// Moves whose write has not resolved yet.
    pub fn pending_mutations(&self) -> usize {
        self.mutations
            .values()
            .filter(|r| r.state == MutationState::Pending)
            .count()
    }

    /// Add (or replace) a task created locally, ahead of the next snapshot.
    pub fn insert_local(&mut self, task: Task) {
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => self.tasks.push(task),
        }
    }

    pub fn remove_local(&mut self, task_id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != task_id);
        self.tasks.len() != before
    }
}
