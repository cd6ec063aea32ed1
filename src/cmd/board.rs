//! Board display commands — `taskboard board`.

use anyhow::Result;
use taskboard::board::presentation::{BoardView, HeadingColor};
use taskboard::config::BoardConfig;

use super::super::BoardCommands;

pub async fn cmd_board(config: &BoardConfig, command: BoardCommands) -> Result<()> {
    match command {
        BoardCommands::Show { project, json } => {
            let store = super::open_store(config)?;
            let mut session = super::new_session(config, store);
            super::load_board(&mut session, &project).await?;

            let view = session.board_view();
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_board(&view);
            }
        }
        BoardCommands::Watch { project } => {
            let store = super::open_store(config)?.with_poll_interval(config.poll_interval());
            let mut session = super::new_session(config, store);
            session.select_project(Some(project.clone())).await?;
            tracing::info!(%project, "watching board");

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    applied = session.next_snapshot() => {
                        if !applied {
                            break;
                        }
                        println!("{}", serde_json::to_string(&session.board_view())?);
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_board(view: &BoardView) {
    for column in &view.columns {
        let heading = console::style(&column.title).bold();
        let heading = match column.heading_color {
            HeadingColor::Neutral => heading,
            HeadingColor::Yellow => heading.yellow(),
            HeadingColor::Blue => heading.blue(),
            HeadingColor::Emerald => heading.green(),
        };
        println!("{} {}", heading, console::style(column.count).dim());
        for task in &column.tasks {
            println!("  {}  {}", console::style(&task.id).dim(), task.title);
        }
        println!();
    }
}
