use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::archive::{ArchiveError, ArchiveOutcome, Archiver};
use crate::core::RawMessage;
use crate::core::buffer::IngressBuffer;
use crate::core::metrics::RadarMetrics;
use crate::core::shutdown::Shutdown;
use crate::rpc::decode_notification;
use crate::signals::FingerprintClassifier;

const ERROR_PREVIEW_CHARS: usize = 160;

/// What a worker did with one dequeued message.
#[derive(Debug, PartialEq)]
pub enum Handled {
    NotNotification,
    DecodeFailed,
    Discarded,
    Archived(ArchiveOutcome),
    ArchiveFailed,
}

/// Fixed pool of symmetric workers draining the ingress buffer.
pub struct ClassifierPool {
    buffer: Arc<IngressBuffer>,
    classifier: Arc<FingerprintClassifier>,
    archiver: Arc<Archiver>,
    metrics: Arc<RadarMetrics>,
    shutdown: Shutdown,
    workers: usize,
}

impl ClassifierPool {
    pub fn new(
        buffer: Arc<IngressBuffer>,
        classifier: Arc<FingerprintClassifier>,
        archiver: Arc<Archiver>,
        metrics: Arc<RadarMetrics>,
        shutdown: Shutdown,
        workers: usize,
    ) -> Self {
        Self {
            buffer,
            classifier,
            archiver,
            metrics,
            shutdown,
            workers: workers.max(1),
        }
    }

    /// Start every worker on the current runtime.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let pool = Arc::new(self);
        info!(workers = pool.workers, "Classifier pool started");
        (0..pool.workers)
            .map(|id| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.worker(id).await })
            })
            .collect()
    }

    async fn worker(&self, id: usize) {
        loop {
            let msg = tokio::select! {
                _ = self.shutdown.stopped() => break,
                msg = self.buffer.pop() => msg,
            };
            self.handle(id, msg).await;
        }
        debug!(worker = id, "Classifier worker stopped");
    }

    /// Process one message end to end. Never fails: every outcome is
    /// counted and logged here.
    pub async fn handle(&self, id: usize, msg: RawMessage) -> Handled {
        let handled = self.process(id, &msg).await;
        let total = self.metrics.record_processed();
        if total % 1000 == 0 {
            info!(
                total,
                dropped = self.metrics.dropped(),
                queued = self.buffer.len(),
                "Classifier pool progress"
            );
        }
        handled
    }

    async fn process(&self, id: usize, msg: &RawMessage) -> Handled {
        let notification = match decode_notification(&msg.payload) {
            Ok(Some(n)) => n,
            Ok(None) => {
                self.metrics.record_non_notification();
                return Handled::NotNotification;
            }
            Err(e) => {
                self.metrics.record_decode_error();
                let preview: String = e.to_string().chars().take(ERROR_PREVIEW_CHARS).collect();
                warn!(worker = id, error = %preview, "Dropping undecodable frame");
                return Handled::DecodeFailed;
            }
        };

        let value = notification.value;
        let Some(event) = self.classifier.classify_at(&value.logs, &value.signature, msg.arrived_at) else {
            self.metrics.record_discarded();
            return Handled::Discarded;
        };
        self.metrics.record_classified();

        let latency_ms = msg.received.elapsed().as_secs_f64() * 1000.0;
        let result = self
            .archiver
            .archive_observed(&value.signature, &event, Some(latency_ms))
            .await;
        self.settle(id, &value.signature, result)
    }

    fn settle(&self, id: usize, signature: &str, result: Result<ArchiveOutcome, ArchiveError>) -> Handled {
        match result {
            Ok(outcome) => Handled::Archived(outcome),
            Err(e) => {
                self.metrics.record_archive_error();
                error!(worker = id, signature, error = %e, "Archive failed");
                Handled::ArchiveFailed
            }
        }
    }
}
