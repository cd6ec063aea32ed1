//! Drop-position resolution and ordering-key assignment.
//!
//! A drop is resolved against the column's *slot anchors*: one drop
//! indicator above each card plus a trailing sentinel meaning "end of
//! column". Each anchor sits [`DROP_DISTANCE_OFFSET`] pixels below the top
//! edge of its indicator. The chosen slot is the nearest anchor strictly
//! below the pointer (the greatest negative `pointer_y - anchor`); when no
//! anchor is below the pointer the card is appended.
//!
//! Persisting a move writes `position = now` rather than a value between
//! the new neighbours. After the next snapshot the moved card therefore
//! sorts after every card whose position predates the move, whatever slot
//! it was dropped on.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use super::models::*;
use super::store::DocumentStore;
use crate::errors::BoardResult;

/// Vertical distance between an indicator's top edge and its anchor.
pub const DROP_DISTANCE_OFFSET: f64 = 50.0;

/// One candidate insertion point in a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotAnchor {
    /// Task this slot inserts before; `None` for the end-of-column sentinel.
    pub before: Option<TaskId>,
    /// Top edge of the slot's drop indicator.
    pub top: f64,
}

impl SlotAnchor {
    pub fn before(task_id: impl Into<TaskId>, top: f64) -> Self {
        Self {
            before: Some(task_id.into()),
            top,
        }
    }

    pub fn end(top: f64) -> Self {
        Self { before: None, top }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "task_id", rename_all = "snake_case")]
pub enum DropTarget {
    Before(TaskId),
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDrop {
    pub column: Column,
    pub target: DropTarget,
}

/// Source of slot anchors for a column, normally the rendered layout.
pub trait SlotGeometry {
    fn anchors(&self, column: Column) -> Vec<SlotAnchor>;
}

/// Produces ordering keys for moved and created tasks.
pub trait OrderingClock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Client wall clock in milliseconds, nudged forward so two calls never
/// return the same key.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl OrderingClock for SystemClock {
    fn now_millis(&self) -> i64 {
        let wall = chrono::Utc::now().timestamp_millis();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(wall.max(last + 1))
            })
            .unwrap_or(wall);
        wall.max(previous + 1)
    }
}

/// Resolve a drop using the default anchor offset.
pub fn resolve_drop(pointer_y: f64, column: Column, slots: &[SlotAnchor]) -> ResolvedDrop {
    resolve_drop_with_offset(pointer_y, column, slots, DROP_DISTANCE_OFFSET)
}

/// Pick the slot whose anchor is nearest strictly below `pointer_y`.
///
/// Equal offsets resolve to the later slot. With no qualifying slot the
/// last slot (the sentinel) wins; an empty slot list appends.
pub fn resolve_drop_with_offset(
    pointer_y: f64,
    column: Column,
    slots: &[SlotAnchor],
    distance_offset: f64,
) -> ResolvedDrop {
    let mut nearest: Option<(f64, &SlotAnchor)> = None;
    for slot in slots {
        let offset = pointer_y - (slot.top + distance_offset);
        if offset < 0.0 && nearest.is_none_or(|(best, _)| offset >= best) {
            nearest = Some((offset, slot));
        }
    }

    let chosen = nearest.map(|(_, slot)| slot).or_else(|| slots.last());
    let target = match chosen.and_then(|slot| slot.before.clone()) {
        Some(task_id) => DropTarget::Before(task_id),
        None => DropTarget::End,
    };
    ResolvedDrop { column, target }
}

/// Card metrics for a vertically stacked column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardMetrics {
    /// Offset of the first indicator from the top of the column.
    pub origin_top: f64,
    pub card_height: f64,
    pub indicator_height: f64,
}

impl Default for CardMetrics {
    fn default() -> Self {
        Self {
            origin_top: 0.0,
            card_height: 44.0,
            indicator_height: 4.0,
        }
    }
}

/// Layout of a board whose cards are stacked top to bottom in each
/// column, every card preceded by its drop indicator and the column
/// closed by the sentinel indicator.
#[derive(Debug, Clone, Default)]
pub struct StackedLayout {
    metrics: CardMetrics,
    columns: HashMap<Column, Vec<TaskId>>,
}

impl StackedLayout {
    pub fn new(metrics: CardMetrics) -> Self {
        Self {
            metrics,
            columns: HashMap::new(),
        }
    }

    /// Lay out `tasks` (already in display order) into their columns.
    pub fn with_tasks<'a>(mut self, tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        for task in tasks {
            self.columns
                .entry(task.column)
                .or_default()
                .push(task.id.clone());
        }
        self
    }

    /// Top edge of the indicator at `index` within a column.
    pub fn slot_top(&self, index: usize) -> f64 {
        let stride = self.metrics.indicator_height + self.metrics.card_height;
        self.metrics.origin_top + stride * index as f64
    }
}

impl SlotGeometry for StackedLayout {
    fn anchors(&self, column: Column) -> Vec<SlotAnchor> {
        let ids = self.columns.get(&column).map(Vec::as_slice).unwrap_or(&[]);
        let mut anchors: Vec<SlotAnchor> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| SlotAnchor::before(id.clone(), self.slot_top(i)))
            .collect();
        anchors.push(SlotAnchor::end(self.slot_top(ids.len())));
        anchors
    }
}

/// Resolves drops and writes the resulting move to the store.
#[derive(Clone)]
pub struct OrderingEngine {
    clock: Arc<dyn OrderingClock>,
    distance_offset: f64,
}

impl Default for OrderingEngine {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock::default()))
    }
}

impl OrderingEngine {
    pub fn new(clock: Arc<dyn OrderingClock>) -> Self {
        Self {
            clock,
            distance_offset: DROP_DISTANCE_OFFSET,
        }
    }

    pub fn with_distance_offset(mut self, distance_offset: f64) -> Self {
        self.distance_offset = distance_offset;
        self
    }

    pub fn distance_offset(&self) -> f64 {
        self.distance_offset
    }

    /// Ordering key for a task created or moved right now.
    pub fn next_position(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn resolve(
        &self,
        pointer_y: f64,
        column: Column,
        geometry: &dyn SlotGeometry,
    ) -> ResolvedDrop {
        let slots = geometry.anchors(column);
        resolve_drop_with_offset(pointer_y, column, &slots, self.distance_offset)
    }

    /// Issue the single write for a move: new column, `position = now`.
    /// Returns the position written.
    pub async fn persist_move<S>(&self, store: &S, task_id: &str, column: Column) -> BoardResult<i64>
    where
        S: DocumentStore + ?Sized,
    {
        let position = self.next_position();
        let patch = TaskPatch {
            column: Some(column),
            position: Some(position),
        };
        store.update_task(task_id, patch).await?;
        tracing::debug!(task_id, %column, position, "move persisted");
        Ok(position)
    }
}
