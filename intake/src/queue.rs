//! Durable local store for accepted tasks.
//!
//! The store is a single JSON array file consumed by an external process.
use crate::request::QueuedTask;
use async_trait::async_trait;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Appends a record after all previously enqueued records.
    async fn enqueue(&self, task: QueuedTask) -> Result<(), QueueError>;

    /// Removes and returns every record, oldest first.
    async fn drain(&self) -> Result<Vec<QueuedTask>, QueueError>;

    async fn len(&self) -> Result<usize, QueueError>;
}

/// Queue backed by a JSON array file.
///
/// Operations on the same `FileQueue` are serialized. Every write replaces the
/// file through an atomic rename, so readers never observe a partial array.
pub struct FileQueue {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileQueue {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_records<T, F>(&self, f: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T, QueueError> + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || f(&path))
            .await
            .map_err(|e| QueueError::Io(io::Error::other(e)))?
    }
}

#[async_trait]
impl TaskQueue for FileQueue {
    async fn enqueue(&self, task: QueuedTask) -> Result<(), QueueError> {
        self.with_records(move |path| {
            let mut records = read_records(path)?;
            records.push(task);
            write_records(path, &records)
        })
        .await
    }

    async fn drain(&self) -> Result<Vec<QueuedTask>, QueueError> {
        self.with_records(|path| {
            let records = read_records(path)?;
            if !records.is_empty() {
                write_records(path, &[])?;
            }
            Ok(records)
        })
        .await
    }

    async fn len(&self) -> Result<usize, QueueError> {
        self.with_records(|path| Ok(read_records(path)?.len())).await
    }
}

/// A missing or blank file is an empty queue.
fn read_records(path: &Path) -> Result<Vec<QueuedTask>, QueueError> {
    let mut contents = String::new();
    match File::open(path) {
        Ok(mut file) => file.read_to_string(&mut contents)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&contents)?)
}

fn write_records(path: &Path, records: &[QueuedTask]) -> Result<(), QueueError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, records)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    tracing::debug!(path = %path.display(), records = records.len(), "Wrote task queue");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{TaskRequest, iso_timestamp};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;

    fn record(nonce: &str) -> QueuedTask {
        let body = json!({
            "email": "a@b.com",
            "secret": "S",
            "task": "t1",
            "round": 1,
            "nonce": nonce,
            "brief": "b",
            "evaluation_url": "http://e",
            "extra": [1, 2]
        });
        let request = TaskRequest::from_slice(body.to_string().as_bytes()).unwrap();
        QueuedTask::new(request, Utc::now())
    }

    #[tokio::test]
    async fn test_enqueue_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let queue = FileQueue::new(dir.path().join("queue.json"));

        assert_eq!(queue.len().await.unwrap(), 0);
        for nonce in ["n1", "n2", "n3"] {
            queue.enqueue(record(nonce)).await.unwrap();
        }
        assert_eq!(queue.len().await.unwrap(), 3);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(queue.path()).unwrap()).unwrap();
        let nonces: Vec<_> = raw
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["nonce"].clone())
            .collect();
        assert_eq!(nonces, vec![json!("n1"), json!("n2"), json!("n3")]);
    }

    #[tokio::test]
    async fn test_drain_empties_queue() {
        let dir = tempfile::tempdir().unwrap();
        let queue = FileQueue::new(dir.path().join("queue.json"));
        queue.enqueue(record("n1")).await.unwrap();
        queue.enqueue(record("n2")).await.unwrap();

        let drained = queue.drain().await.unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].fields["nonce"], json!("n1"));
        assert_eq!(drained[0].fields["secret"], json!("S"));
        assert_eq!(drained[0].fields["extra"], json!([1, 2]));
        assert_eq!(queue.len().await.unwrap(), 0);
        assert_eq!(std::fs::read_to_string(queue.path()).unwrap().trim(), "[]");
        assert!(queue.drain().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_file_is_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "\n").unwrap();

        let queue = FileQueue::new(&path);
        assert_eq!(queue.len().await.unwrap(), 0);
        queue.enqueue(record("n1")).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "{not json").unwrap();

        let queue = FileQueue::new(&path);
        let result = queue.enqueue(record("n1")).await;
        assert!(matches!(result, Err(QueueError::Json(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[tokio::test]
    async fn test_concurrent_enqueue_loses_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(FileQueue::new(dir.path().join("queue.json")));

        let mut handles = Vec::new();
        for i in 0..20 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue.enqueue(record(&format!("n{i}"))).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(queue.len().await.unwrap(), 20);
    }

    #[test]
    fn test_records_keep_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let now = Utc::now();
        let mut task = record("n1");
        task.timestamp = iso_timestamp(now);

        write_records(&path, std::slice::from_ref(&task)).unwrap();
        let records = read_records(&path).unwrap();
        assert_eq!(records, vec![task]);
    }
}
