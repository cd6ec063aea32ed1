//! Kanban board: ordering, local state and store reconciliation.
//!
//! ## Overview
//!
//! A board shows the tasks of one selected project in four fixed columns.
//! Cards are dragged between and within columns; every drop is applied to
//! the local list at once and then written to the document store, whose
//! live subscription pushes the full, authoritative task list back.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐  drop(y, column)  ┌──────────────────────────────────────────┐
//! │  Front   │ ────────────────> │  session.rs  (BoardSession, single writer) │
//! │  end     │ <──────────────── │    ├─ ordering.rs  resolve_drop()          │
//! └──────────┘   BoardView       │    │               persist_move()          │
//!                                │    ├─ state.rs     BoardState             │
//!                                │    │   optimistic move → confirm | fail   │
//!                                │    └─ presentation.rs  ColumnView         │
//!                                │         ^                                │
//!                                │         │ Subscription<Task> snapshots    │
//!                                │         │                                │
//!                                │  store.rs  (DocumentStore trait)          │
//!                                │    └─ db.rs  SqliteStore + events.rs feed │
//!                                └──────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module         | Responsibility                                         |
//! |----------------|--------------------------------------------------------|
//! | `models`       | Shared types: `Task`, `Project`, `Column`, `TaskPatch` |
//! | `events`       | `StoreEvent` change feed + `broadcast_event()` helper  |
//! | `db`           | SQLite access via `DbHandle` (thin `Arc<Mutex<_>>`)    |
//!
//! ## Typical Flow (drag a card onto another column)
//!
//! 1. The front end reports the pointer position and the column under it.
//! 2. `OrderingEngine::resolve()` picks the slot from the column's anchors.
//! 3. `BoardState::apply_move()` splices the card in locally (pending).
//! 4. `OrderingEngine::persist_move()` writes `{column, position: now}`.
//! 5. The write confirms the move, or fails and rolls it back.
//! 6. The store broadcasts the change and the subscription delivers the
//!    re-sorted snapshot, which replaces the local list.

pub mod db;
pub mod events;
pub mod models;
pub mod ordering;
pub mod presentation;
pub mod session;
pub mod state;
pub mod store;

pub use db::SqliteStore;
pub use models::{Column, Project, Task};
pub use session::BoardSession;
pub use store::DocumentStore;
