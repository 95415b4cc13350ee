//! Tests for the pending image snapshot.
//!
//! Tests cover:
//! - Persist then restore into a fresh queue
//! - Missing and empty snapshots
//! - Snapshot survival across a job system restart

use async_trait::async_trait;
use bazaar_core::config::Config;
use bazaar_core::error::{ErrorCode, Result};
use bazaar_core::jobs::{ImageQueue, Job, JobStatus, JobSystem, QueueConfig};
use bazaar_core::providers::BlobStorage;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingStorage {
    uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl BlobStorage for RecordingStorage {
    async fn upload(&self, bucket: &str, path: &str, data: &[u8], _: &str) -> Result<String> {
        self.uploads.lock().push((path.to_string(), data.to_vec()));
        Ok(format!("https://cdn.test/{}/{}", bucket, path))
    }
}

fn queue(storage: Arc<RecordingStorage>) -> ImageQueue {
    ImageQueue::new(QueueConfig::default(), storage, "listings", "https://cdn.test")
}

#[tokio::test]
async fn test_persist_then_restore() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("images.json");

    let first = queue(Arc::new(RecordingStorage::default()));
    let a = first.enqueue_image("a.png", vec![0, 1, 2, 255], None);
    let b = first.enqueue_image("b.jpg", vec![42; 100], Some("image/jpeg".into()));

    assert_eq!(first.persist_to_disk(&path).await.unwrap(), 2);
    assert!(path.exists());

    let storage = Arc::new(RecordingStorage::default());
    let second = queue(storage.clone());
    assert_eq!(second.restore_from_disk(&path).await.unwrap(), 2);
    assert!(!path.exists());

    let restored = second.get_by_id(&a.id).unwrap();
    assert_eq!(restored.status(), JobStatus::Pending);
    assert_eq!(restored.image_data, vec![0, 1, 2, 255]);
    assert_eq!(restored.public_url, a.public_url);
    assert_eq!(second.get_by_id(&b.id).unwrap().content_type, "image/jpeg");

    second.process_batch(10).await;
    let uploads = storage.uploads.lock();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0], ("a.png".to_string(), vec![0, 1, 2, 255]));
}

#[tokio::test]
async fn test_snapshot_is_base64() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("images.json");

    let q = queue(Arc::new(RecordingStorage::default()));
    q.enqueue_image("hello.png", b"hello".to_vec(), None);
    q.persist_to_disk(&path).await.unwrap();

    let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(raw[0]["image_data"], "aGVsbG8=");
    assert_eq!(raw[0]["status"], "pending");
}

#[tokio::test]
async fn test_restore_missing_file() {
    let dir = TempDir::new().unwrap();
    let q = queue(Arc::new(RecordingStorage::default()));

    let restored = q.restore_from_disk(&dir.path().join("absent.json")).await.unwrap();
    assert_eq!(restored, 0);
    assert_eq!(q.pending_count(), 0);
}

#[tokio::test]
async fn test_empty_queue_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("images.json");

    let q = queue(Arc::new(RecordingStorage::default()));
    assert_eq!(q.persist_to_disk(&path).await.unwrap(), 0);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_corrupt_snapshot_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("images.json");
    std::fs::write(&path, b"{not json").unwrap();

    let q = queue(Arc::new(RecordingStorage::default()));
    let error = q.restore_from_disk(&path).await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::DeserializationError);
    assert_eq!(q.pending_count(), 0);
}

#[tokio::test]
async fn test_job_system_restart_keeps_pending_images() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.jobs.snapshot_path = dir.path().join("image_queue.json");
    config.jobs.image_interval = Duration::from_secs(3600);

    let storage = Arc::new(RecordingStorage::default());

    let before = JobSystem::new(&config, Some(storage.clone()), None);
    before.start().await.unwrap();
    let queued = before
        .image_queue()
        .unwrap()
        .enqueue_image("u1/sofa.webp", vec![5; 16], None);
    before.shutdown().await;
    assert!(config.jobs.snapshot_path.exists());

    let after = JobSystem::new(&config, Some(storage.clone()), None);
    after.start().await.unwrap();
    assert!(!config.jobs.snapshot_path.exists());

    let images = after.image_queue().unwrap();
    assert_eq!(images.pending_count(), 1);
    assert_eq!(images.get_by_id(&queued.id).unwrap().image_data.len(), 16);
    assert!(storage.uploads.lock().is_empty());

    after.shutdown().await;
}
