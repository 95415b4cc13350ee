//! Image processing pipeline.
//!
//! Public URLs are deterministic, so [`ImageQueue::enqueue_image`] can hand
//! one back before the upload has happened. Pending jobs survive a restart
//! through a JSON snapshot written at shutdown.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::job::{Job, JobHandler, JobState, JobStatus};
use super::queue::{QueueConfig, WorkQueue};
use crate::error::Result;
use crate::providers::{object_key, BlobStorage};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Infer an image content type from the filename extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("webp") => "image/webp",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("avif") => "image/avif",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// One image upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageJob {
    #[serde(flatten)]
    pub state: JobState,
    pub filename: String,
    pub content_type: String,
    /// Raw bytes; base64 in the snapshot, emptied once terminal
    #[serde(with = "base64_bytes", default)]
    pub image_data: Vec<u8>,
    pub public_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl Job for ImageJob {
    type Output = String;

    fn state(&self) -> &JobState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut JobState {
        &mut self.state
    }

    fn complete(&mut self, public_url: String) {
        self.state.status = JobStatus::Processed;
        self.processed_at = Some(Utc::now());
        self.public_url = public_url;
        self.release_payload();
    }

    fn release_payload(&mut self) {
        self.image_data = Vec::new();
    }

    fn succeeded_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Uploads each job's bytes through the configured [`BlobStorage`].
struct ImageUploader {
    storage: Arc<dyn BlobStorage>,
    bucket: String,
}

#[async_trait]
impl JobHandler<ImageJob> for ImageUploader {
    async fn handle(&self, job: &ImageJob) -> Result<String> {
        self.storage
            .upload(&self.bucket, &job.filename, &job.image_data, &job.content_type)
            .await
    }
}

/// What a caller gets back from [`ImageQueue::enqueue_image`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueuedImage {
    pub id: String,
    pub public_url: String,
}

/// Work queue of image uploads.
pub struct ImageQueue {
    queue: WorkQueue<ImageJob>,
    bucket: String,
    public_base: String,
}

impl std::fmt::Debug for ImageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageQueue")
            .field("queue", &self.queue)
            .field("bucket", &self.bucket)
            .field("public_base", &self.public_base)
            .finish()
    }
}

impl ImageQueue {
    pub fn new(
        config: QueueConfig,
        storage: Arc<dyn BlobStorage>,
        bucket: impl Into<String>,
        public_base: impl Into<String>,
    ) -> Self {
        let bucket = bucket.into();
        let uploader = ImageUploader {
            storage,
            bucket: bucket.clone(),
        };

        Self {
            queue: WorkQueue::new("image", config, Arc::new(uploader)),
            bucket,
            public_base: public_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn public_url_for(&self, filename: &str) -> String {
        format!("{}/{}", self.public_base, object_key(&self.bucket, filename))
    }

    /// Queue an upload and return its ID and the URL it will be served from.
    pub fn enqueue_image(
        &self,
        filename: impl Into<String>,
        image_data: Vec<u8>,
        content_type: Option<String>,
    ) -> EnqueuedImage {
        let filename = filename.into();
        let content_type =
            content_type.unwrap_or_else(|| content_type_for(&filename).to_string());
        let public_url = self.public_url_for(&filename);

        let job = ImageJob {
            state: JobState::default(),
            filename,
            content_type,
            image_data,
            public_url: public_url.clone(),
            processed_at: None,
        };

        let id = self.queue.enqueue(job);
        EnqueuedImage { id, public_url }
    }

    /// Write the pending jobs to `path` as JSON. Does nothing when there is
    /// nothing pending. Returns the number of jobs written.
    pub async fn persist_to_disk(&self, path: &Path) -> Result<usize> {
        let pending = self.queue.pending_snapshot();
        if pending.is_empty() {
            return Ok(0);
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec(&pending)?;
        tokio::fs::write(path, bytes).await?;

        info!(path = %path.display(), jobs = pending.len(), "Persisted pending image jobs");
        Ok(pending.len())
    }

    /// Append jobs from a snapshot written by [`persist_to_disk`](Self::persist_to_disk)
    /// and delete the file. A missing file restores nothing.
    pub async fn restore_from_disk(&self, path: &Path) -> Result<usize> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let jobs: Vec<ImageJob> = serde_json::from_slice(&bytes)?;
        let restored = self.queue.restore_pending(jobs);

        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove restored snapshot");
        }

        info!(path = %path.display(), jobs = restored, "Restored pending image jobs");
        Ok(restored)
    }
}

impl Deref for ImageQueue {
    type Target = WorkQueue<ImageJob>;

    fn deref(&self) -> &Self::Target {
        &self.queue
    }
}

/// Image job as exposed by the status endpoints. Bytes are never included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageJobView {
    pub id: String,
    pub status: JobStatus,
    pub filename: String,
    pub content_type: String,
    pub public_url: String,
    /// Bytes still held by the job
    pub size_bytes: usize,
    pub retries: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ImageJob> for ImageJobView {
    fn from(job: &ImageJob) -> Self {
        Self {
            id: job.state.id.clone(),
            status: job.state.status,
            filename: job.filename.clone(),
            content_type: job.content_type.clone(),
            public_url: job.public_url.clone(),
            size_bytes: job.image_data.len(),
            retries: job.state.retries,
            max_retries: job.state.max_retries,
            created_at: job.state.created_at,
            processed_at: job.processed_at,
            failed_at: job.state.failed_at,
            error: job.state.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullStorage;

    #[async_trait]
    impl BlobStorage for NullStorage {
        async fn upload(&self, bucket: &str, path: &str, _: &[u8], _: &str) -> Result<String> {
            Ok(format!("https://cdn.test/{}/{}", bucket, path))
        }
    }

    fn queue() -> ImageQueue {
        ImageQueue::new(
            QueueConfig::default(),
            Arc::new(NullStorage),
            "listings",
            "https://cdn.test/",
        )
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a.webp"), "image/webp");
        assert_eq!(content_type_for("a.PNG"), "image/png");
        assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("a.jpg"), "image/jpeg");
        assert_eq!(content_type_for("a.gif"), "image/gif");
        assert_eq!(content_type_for("a.avif"), "image/avif");
        assert_eq!(content_type_for("a.tiff"), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_for("noext"), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_enqueue_image_computes_url_up_front() {
        let queue = queue();
        let enqueued = queue.enqueue_image("u1/photo.png", vec![0; 16], None);

        assert_eq!(enqueued.public_url, "https://cdn.test/listings/u1/photo.png");
        let job = queue.get_by_id(&enqueued.id).unwrap();
        assert_eq!(job.content_type, "image/png");
        assert_eq!(job.public_url, enqueued.public_url);
    }

    #[test]
    fn test_public_url_encodes_reserved_characters() {
        let queue = queue();
        let enqueued = queue.enqueue_image("u1/photo#2.png", vec![0; 4], None);
        assert_eq!(enqueued.public_url, "https://cdn.test/listings/u1/photo%232.png");
        assert_eq!(
            queue.public_url_for("u1/a?b c.png"),
            "https://cdn.test/listings/u1/a%3Fb%20c.png"
        );
    }

    #[test]
    fn test_explicit_content_type_wins() {
        let queue = queue();
        let enqueued = queue.enqueue_image("blob", vec![1], Some("image/heic".into()));
        assert_eq!(queue.get_by_id(&enqueued.id).unwrap().content_type, "image/heic");
    }

    #[tokio::test]
    async fn test_processed_job_releases_bytes() {
        let queue = queue();
        let enqueued = queue.enqueue_image("a.webp", vec![9; 64], None);

        let done = queue.process_batch(10).await;
        assert_eq!(done.len(), 1);

        let view = ImageJobView::from(&queue.get_by_id(&enqueued.id).unwrap());
        assert_eq!(view.status, JobStatus::Processed);
        assert_eq!(view.size_bytes, 0);
        assert!(view.processed_at.is_some());
    }

    #[test]
    fn test_snapshot_encodes_bytes_as_base64() {
        let job = ImageJob {
            state: JobState::with_id("x"),
            filename: "a.png".into(),
            content_type: "image/png".into(),
            image_data: vec![1, 2, 3],
            public_url: "u".into(),
            processed_at: None,
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["image_data"], "AQID");
        assert_eq!(json["id"], "x");
    }
}
