//! Scheduled task commands.

use anyhow::Result;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum SchedulerCommands {
    /// List registered tasks
    List,

    /// Show one task
    Get {
        /// Task ID (e.g. drain-email)
        id: String,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct TaskInfo {
    id: String,
    name: String,
    description: String,
    interval: String,
    last_run: Option<String>,
    next_run: String,
    running: bool,
    run_count: u64,
}

#[derive(Tabled, Serialize)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Every")]
    interval: String,
    #[tabled(rename = "Runs")]
    run_count: u64,
    #[tabled(rename = "Last run")]
    last_run: String,
    #[tabled(rename = "Next run")]
    next_run: String,
    #[tabled(rename = "State")]
    state: String,
}

impl From<TaskInfo> for TaskRow {
    fn from(task: TaskInfo) -> Self {
        Self {
            id: task.id,
            name: task.name,
            interval: task.interval,
            run_count: task.run_count,
            last_run: output::short_time(task.last_run.as_deref()),
            next_run: output::short_time(Some(&task.next_run)),
            state: if task.running { "running" } else { "idle" }.to_string(),
        }
    }
}

pub async fn execute(
    cmd: SchedulerCommands,
    client: &ApiClient,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        SchedulerCommands::List => {
            let tasks: Vec<TaskInfo> = client.get("/api/v1/scheduler/tasks").await?;

            match format {
                OutputFormat::Table => {
                    let rows: Vec<TaskRow> = tasks.into_iter().map(TaskRow::from).collect();
                    output::print_list(&rows, format)?;
                }
                _ => output::print_item(&tasks, format)?,
            }
        }

        SchedulerCommands::Get { id } => {
            let task: TaskInfo = client
                .get(&format!("/api/v1/scheduler/tasks/{}", id))
                .await?;

            match format {
                OutputFormat::Table => {
                    output::print_header(&format!("Task: {}", task.id));
                    output::print_detail("Name", &task.name);
                    if !task.description.is_empty() {
                        output::print_detail("Description", &task.description);
                    }
                    output::print_detail("Interval", &task.interval);
                    output::print_detail("Runs", &task.run_count.to_string());
                    output::print_detail("Last run", &output::short_time(task.last_run.as_deref()));
                    output::print_detail("Next run", &output::short_time(Some(&task.next_run)));
                    if task.running {
                        output::print_warning("A run is in progress");
                    }
                }
                _ => output::print_item(&task, format)?,
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_from_server_payload() {
        let task: TaskInfo = serde_json::from_value(serde_json::json!({
            "id": "drain-email",
            "name": "Email delivery",
            "description": "",
            "interval": "30s",
            "last_run": null,
            "next_run": "2024-03-01T12:00:30Z",
            "running": false,
            "run_count": 0
        }))
        .unwrap();

        let row = TaskRow::from(task);
        assert_eq!(row.interval, "30s");
        assert_eq!(row.last_run, "-");
        assert_eq!(row.next_run, "2024-03-01 12:00:30");
        assert_eq!(row.state, "idle");
    }
}
