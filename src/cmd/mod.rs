//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `init`    | `Init`           |
//! | `project` | `Project`        |
//! | `task`    | `Task`           |
//! | `board`   | `Board`          |
//! | `config`  | `Config`         |

pub mod board;
pub mod config;
pub mod init;
pub mod project;
pub mod task;

pub use board::cmd_board;
pub use config::cmd_config;
pub use init::cmd_init;
pub use project::cmd_project;
pub use task::cmd_task;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use taskboard::board::ordering::OrderingEngine;
use taskboard::board::{BoardSession, SqliteStore};
use taskboard::config::BoardConfig;

/// How long a command waits for the first snapshot of a subscription.
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the configured database, creating its directory if needed.
pub fn open_store(config: &BoardConfig) -> Result<SqliteStore> {
    let path = &config.store.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = SqliteStore::open(path)
        .with_context(|| format!("Failed to open board database {}", path.display()))?;
    Ok(store)
}

pub fn new_session(config: &BoardConfig, store: SqliteStore) -> BoardSession<SqliteStore> {
    let engine = OrderingEngine::default().with_distance_offset(config.board.drop_offset_px);
    BoardSession::new(Arc::new(store), config.board.owner_id.clone()).with_engine(engine)
}

/// Select `project_id` and wait for its first snapshot.
pub async fn load_board(session: &mut BoardSession<SqliteStore>, project_id: &str) -> Result<()> {
    session.select_project(Some(project_id.to_string())).await?;
    let applied = tokio::time::timeout(SNAPSHOT_TIMEOUT, session.next_snapshot())
        .await
        .context("Timed out loading the board")?;
    if !applied {
        anyhow::bail!("Board subscription for project {} closed", project_id);
    }
    Ok(())
}
