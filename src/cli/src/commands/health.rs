//! Health check command.
//!
//! Queries `/health` and shows which pipelines are enabled.

use anyhow::Result;
use clap::Args;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Also list which pipelines are enabled
    #[arg(short, long)]
    detailed: bool,
}

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: serde_json::Value = client.get_raw("/health").await?;

    match format {
        OutputFormat::Table => {
            let status = health
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");

            output::print_header("Server Health");
            output::print_detail("Status", &output::colored_status(status));
            output::print_detail("API URL", client.base_url());

            if let Some(version) = health.get("version").and_then(|v| v.as_str()) {
                output::print_detail("Version", version);
            }
            if let Some(tasks) = health.get("scheduled_tasks").and_then(|v| v.as_u64()) {
                output::print_detail("Scheduled tasks", &tasks.to_string());
            }

            if args.detailed {
                if let Some(pipelines) = health.get("pipelines").and_then(|v| v.as_object()) {
                    output::print_header("Pipelines");
                    for (name, enabled) in pipelines {
                        let state = if enabled.as_bool().unwrap_or(false) {
                            "enabled"
                        } else {
                            "disabled"
                        };
                        output::print_detail(name, state);
                    }
                }
            }

            if status == "healthy" {
                output::print_success("Server is up");
            } else {
                output::print_error(&format!("Server status: {}", status));
            }
        }
        _ => output::print_item(&health, format)?,
    }

    Ok(())
}
