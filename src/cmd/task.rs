//! Task commands — `taskboard task`.

use anyhow::Result;
use taskboard::board::ordering::{DropTarget, ResolvedDrop};
use taskboard::config::BoardConfig;

use super::super::TaskCommands;

pub async fn cmd_task(config: &BoardConfig, command: TaskCommands) -> Result<()> {
    let store = super::open_store(config)?;
    let mut session = super::new_session(config, store);

    match command {
        TaskCommands::Add {
            project,
            column,
            title,
        } => {
            if let Some(project_id) = project {
                super::load_board(&mut session, &project_id).await?;
            }
            match session.add_task(column, &title).await? {
                Some(task) => println!(
                    "Added {} to {} {}",
                    console::style(&task.title).bold(),
                    column.title(),
                    console::style(&task.id).dim()
                ),
                None => anyhow::bail!("Task title must not be blank"),
            }
        }
        TaskCommands::Move {
            task_id,
            project,
            column,
            pointer_y,
            before,
        } => {
            super::load_board(&mut session, &project).await?;

            let moved = match (before, pointer_y) {
                (Some(before), _) => {
                    let drop = ResolvedDrop {
                        column,
                        target: DropTarget::Before(before),
                    };
                    session.move_task(&task_id, drop).await?
                }
                (None, Some(pointer_y)) => {
                    let layout = session.layout(config.card_metrics());
                    session
                        .drop_task(&task_id, column, pointer_y, &layout)
                        .await?
                }
                (None, None) => {
                    let drop = ResolvedDrop {
                        column,
                        target: DropTarget::End,
                    };
                    session.move_task(&task_id, drop).await?
                }
            };

            let Some(drop) = moved else {
                anyhow::bail!("Task {} not found in project {}", task_id, project);
            };
            let slot = match &drop.target {
                DropTarget::Before(id) => format!("before {}", id),
                DropTarget::End => "at the end".to_string(),
            };
            println!(
                "Moved {} to {} {}",
                console::style(&task_id).dim(),
                console::style(drop.column.title()).bold(),
                slot
            );
        }
        TaskCommands::Delete { task_id } => {
            session.delete_task(&task_id).await?;
            println!("Deleted task {}", task_id);
        }
    }

    Ok(())
}
