//! Project management commands — `taskboard project`.

use anyhow::{Context, Result};
use taskboard::board::DocumentStore;
use taskboard::config::BoardConfig;

use super::super::ProjectCommands;
use super::SNAPSHOT_TIMEOUT;

pub async fn cmd_project(config: &BoardConfig, command: ProjectCommands) -> Result<()> {
    let store = super::open_store(config)?;
    let mut session = super::new_session(config, store);

    match command {
        ProjectCommands::Create { name } => match session.create_project(&name).await? {
            Some(project) => {
                println!(
                    "Created project {} {}",
                    console::style(&project.name).bold(),
                    console::style(&project.id).dim()
                );
            }
            None => anyhow::bail!("Project name must not be blank"),
        },
        ProjectCommands::List { json } => {
            let mut projects = session.subscribe_projects().await?;
            let projects = tokio::time::timeout(SNAPSHOT_TIMEOUT, projects.next())
                .await
                .context("Timed out listing projects")?
                .unwrap_or_default();

            if json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else if projects.is_empty() {
                println!("No projects for owner {}", session.owner_id());
                println!("Run 'taskboard project create <name>' to add one.");
            } else {
                for project in &projects {
                    println!(
                        "{}  {}",
                        console::style(&project.id).dim(),
                        project.name
                    );
                }
            }
        }
        ProjectCommands::Delete { id } => {
            let removed = session.delete_project(&id).await?;
            let noun = if removed == 1 { "task" } else { "tasks" };
            println!("Deleted project {} ({} {})", id, removed, noun);
        }
    }

    Ok(())
}
