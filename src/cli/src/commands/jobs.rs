//! Job queue commands: status, lookup by ID and forced cleanup.

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum JobsCommands {
    /// Show pending and completed counts for both queues
    Status,

    /// Look up an image upload job
    Image {
        /// Job ID returned at enqueue time
        id: String,
    },

    /// Look up an email job
    Email {
        /// Job ID returned at enqueue time
        id: String,
    },

    /// Evict completed jobs beyond the retention limits
    Cleanup {
        /// Queue to clean up
        #[arg(value_enum)]
        queue: QueueKind,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum QueueKind {
    Image,
    Email,
}

impl QueueKind {
    fn segment(self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Email => "emails",
        }
    }
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
struct QueueStats {
    pending: usize,
    retrying: usize,
    completed: usize,
    succeeded: usize,
    failed: usize,
}

#[derive(Debug, Deserialize, Serialize)]
struct JobsStatus {
    image: Option<QueueStats>,
    email: Option<QueueStats>,
}

#[derive(Tabled, Serialize)]
struct QueueRow {
    #[tabled(rename = "Queue")]
    queue: String,
    #[tabled(rename = "Pending")]
    pending: String,
    #[tabled(rename = "Retrying")]
    retrying: String,
    #[tabled(rename = "Completed")]
    completed: String,
    #[tabled(rename = "Succeeded")]
    succeeded: String,
    #[tabled(rename = "Failed")]
    failed: String,
}

impl QueueRow {
    fn new(queue: &str, stats: Option<&QueueStats>) -> Self {
        let cell = |f: fn(&QueueStats) -> usize| {
            stats.map(|s| f(s).to_string()).unwrap_or_else(|| "-".into())
        };
        let name = match stats {
            Some(_) => queue.to_string(),
            None => format!("{} (disabled)", queue),
        };

        Self {
            queue: name,
            pending: cell(|s| s.pending),
            retrying: cell(|s| s.retrying),
            completed: cell(|s| s.completed),
            succeeded: cell(|s| s.succeeded),
            failed: cell(|s| s.failed),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct ImageJob {
    id: String,
    status: String,
    filename: String,
    content_type: String,
    public_url: String,
    size_bytes: usize,
    retries: u32,
    max_retries: u32,
    created_at: String,
    processed_at: Option<String>,
    failed_at: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
struct EmailJob {
    id: String,
    status: String,
    email_type: String,
    to: String,
    subject: String,
    retries: u32,
    max_retries: u32,
    created_at: String,
    sent_at: Option<String>,
    failed_at: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
struct CleanupResponse {
    queue: String,
    completed: usize,
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn execute(cmd: JobsCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        JobsCommands::Status => {
            let status: JobsStatus = client.get("/api/v1/jobs/status").await?;

            match format {
                OutputFormat::Table => {
                    let rows = vec![
                        QueueRow::new("image", status.image.as_ref()),
                        QueueRow::new("email", status.email.as_ref()),
                    ];
                    output::print_list(&rows, format)?;
                }
                _ => output::print_item(&status, format)?,
            }
        }

        JobsCommands::Image { id } => {
            let job: ImageJob = client.get(&format!("/api/v1/jobs/images/{}", id)).await?;

            match format {
                OutputFormat::Table => {
                    output::print_header(&format!("Image job: {}", job.id));
                    output::print_detail("Status", &output::colored_status(&job.status));
                    output::print_detail("File", &job.filename);
                    output::print_detail("Content type", &job.content_type);
                    output::print_detail("Public URL", &job.public_url);
                    output::print_detail("Bytes held", &job.size_bytes.to_string());
                    output::print_detail(
                        "Attempts",
                        &format!("{}/{}", job.retries, job.max_retries),
                    );
                    output::print_detail("Created", &output::short_time(Some(&job.created_at)));
                    output::print_detail(
                        "Processed",
                        &output::short_time(job.processed_at.as_deref()),
                    );
                    print_failure(job.failed_at.as_deref(), job.error.as_deref());
                }
                _ => output::print_item(&job, format)?,
            }
        }

        JobsCommands::Email { id } => {
            let job: EmailJob = client.get(&format!("/api/v1/jobs/emails/{}", id)).await?;

            match format {
                OutputFormat::Table => {
                    output::print_header(&format!("Email job: {}", job.id));
                    output::print_detail("Status", &output::colored_status(&job.status));
                    output::print_detail("Type", &job.email_type);
                    output::print_detail("To", &job.to);
                    output::print_detail("Subject", &job.subject);
                    output::print_detail(
                        "Attempts",
                        &format!("{}/{}", job.retries, job.max_retries),
                    );
                    output::print_detail("Created", &output::short_time(Some(&job.created_at)));
                    output::print_detail("Sent", &output::short_time(job.sent_at.as_deref()));
                    print_failure(job.failed_at.as_deref(), job.error.as_deref());
                }
                _ => output::print_item(&job, format)?,
            }
        }

        JobsCommands::Cleanup { queue } => {
            let resp: CleanupResponse = client
                .post(&format!("/api/v1/jobs/{}/cleanup", queue.segment()))
                .await?;

            match format {
                OutputFormat::Table => output::print_success(&format!(
                    "{} queue cleaned up, {} completed jobs retained",
                    resp.queue, resp.completed
                )),
                _ => output::print_item(&resp, format)?,
            }
        }
    }

    Ok(())
}

fn print_failure(failed_at: Option<&str>, error: Option<&str>) {
    if let Some(error) = error {
        output::print_detail("Last error", error);
    }
    if failed_at.is_some() {
        output::print_detail("Failed", &output::short_time(failed_at));
    }
}
