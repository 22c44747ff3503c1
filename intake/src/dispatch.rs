use crate::config::SinkConfig;
use crate::errors::DispatchError;
use crate::metrics_defs::{DISPATCH_FAILURES, DISPATCH_INFLIGHT};
use crate::queue::{FileQueue, TaskQueue};
use crate::request::{QueuedTask, TaskRequest};
use async_trait::async_trait;
use chrono::Utc;
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use shared::{counter, gauge};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinSet;
use url::Url;

/// A task that passed validation
#[derive(Clone, Debug)]
pub struct AcceptedTask {
    /// The request body exactly as received
    pub body: Bytes,
    pub request: TaskRequest,
}

/// Downstream destination for accepted tasks
#[async_trait]
pub trait TaskSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn dispatch(&self, task: AcceptedTask) -> Result<(), DispatchError>;
}

pub fn build_sink(config: &SinkConfig) -> Arc<dyn TaskSink> {
    match config {
        SinkConfig::Forward { url, timeout_secs } => Arc::new(ForwardSink::new(
            url.clone(),
            Duration::from_secs(*timeout_secs),
        )),
        SinkConfig::Queue { path } => Arc::new(QueueSink::new(Arc::new(FileQueue::new(path)))),
    }
}

/// Relays the unmodified request body to a worker endpoint.
///
/// Any 2xx status counts as delivered; the response body is ignored.
pub struct ForwardSink {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl ForwardSink {
    pub fn new(url: Url, timeout: Duration) -> Self {
        ForwardSink {
            client: reqwest::Client::new(),
            url,
            timeout,
        }
    }
}

#[async_trait]
impl TaskSink for ForwardSink {
    fn name(&self) -> &'static str {
        "forward"
    }

    async fn dispatch(&self, task: AcceptedTask) -> Result<(), DispatchError> {
        // Use host as identifier for error messages
        let upstream = self.url.host_str().unwrap_or(self.url.as_str()).to_string();

        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .body(task.body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout(upstream.clone())
                } else {
                    DispatchError::Request(upstream.clone(), e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::UpstreamStatus(upstream, status));
        }
        Ok(())
    }
}

/// Appends accepted tasks to a [`TaskQueue`], stamped with the enqueue time.
pub struct QueueSink {
    queue: Arc<dyn TaskQueue>,
}

impl QueueSink {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        QueueSink { queue }
    }
}

#[async_trait]
impl TaskSink for QueueSink {
    fn name(&self) -> &'static str {
        "queue"
    }

    async fn dispatch(&self, task: AcceptedTask) -> Result<(), DispatchError> {
        let record = QueuedTask::new(task.request, Utc::now());
        self.queue.enqueue(record).await?;
        Ok(())
    }
}

/// Runs dispatches as detached tasks so the caller response never waits on them.
///
/// Failures are logged and counted, never retried.
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn TaskSink>,
    inflight: Arc<Mutex<JoinSet<()>>>,
    pending: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn TaskSink>) -> Self {
        Self {
            sink,
            inflight: Arc::new(Mutex::new(JoinSet::new())),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of dispatches started and not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Starts dispatching `task` and returns immediately.
    pub fn spawn(&self, task: AcceptedTask) {
        let sink = self.sink.clone();
        let guard = PendingGuard::new(self.pending.clone());
        let work = async move {
            let _guard = guard;
            let task_id = task.request.task.clone();
            let nonce = task.request.nonce.clone();

            match sink.dispatch(task).await {
                Ok(()) => tracing::debug!(
                    sink = sink.name(),
                    task = %task_id,
                    nonce = %nonce,
                    "Task dispatched"
                ),
                Err(e) => {
                    tracing::error!(
                        sink = sink.name(),
                        task = %task_id,
                        nonce = %nonce,
                        error = %e,
                        "Task dispatch failed"
                    );
                    counter!(DISPATCH_FAILURES, "sink" => sink.name()).increment(1);
                }
            }
        };

        let mut inflight = self.lock_inflight();
        while let Some(result) = inflight.try_join_next() {
            log_join_result(result);
        }
        inflight.spawn(work);
    }

    /// Waits until no dispatch is running, including ones spawned while waiting.
    pub async fn flush(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.lock_inflight());
            if batch.is_empty() {
                return;
            }
            while let Some(result) = batch.join_next().await {
                log_join_result(result);
            }
        }
    }

    fn lock_inflight(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Tracks one running dispatch. Dropped on completion, panic or abort.
struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn new(pending: Arc<AtomicUsize>) -> Self {
        let count = pending.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!(DISPATCH_INFLIGHT).set(count as f64);
        PendingGuard(pending)
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let count = self.0.fetch_sub(1, Ordering::SeqCst) - 1;
        gauge!(DISPATCH_INFLIGHT).set(count as f64);
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!("Dispatch task panicked: {e}");
    }
}
