use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::shutdown::Shutdown;
use crate::db::SharedDatabase;

/// Process-wide radar counters. Owned by `main` and handed to each
/// component as an `Arc`, so tests get isolated instances.
#[derive(Debug, Default)]
pub struct RadarMetrics {
    frames_received: AtomicU64,
    dropped: AtomicU64,
    total_processed: AtomicU64,
    non_notifications: AtomicU64,
    decode_errors: AtomicU64,
    events_classified: AtomicU64,
    events_discarded: AtomicU64,
    archived: AtomicU64,
    filtered_out: AtomicU64,
    write_failures: AtomicU64,
    archive_errors: AtomicU64,
    enrichment_failures: AtomicU64,
    connections: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of [`RadarMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub dropped: u64,
    pub total_processed: u64,
    pub non_notifications: u64,
    pub decode_errors: u64,
    pub events_classified: u64,
    pub events_discarded: u64,
    pub archived: u64,
    pub filtered_out: u64,
    pub write_failures: u64,
    pub archive_errors: u64,
    pub enrichment_failures: u64,
    pub connections: u64,
    pub reconnects: u64,
}

macro_rules! counter {
    ($incr:ident, $get:ident) => {
        pub fn $incr(&self) -> u64 {
            self.$get.fetch_add(1, Ordering::Relaxed) + 1
        }

        pub fn $get(&self) -> u64 {
            self.$get.load(Ordering::Relaxed)
        }
    };
}

impl RadarMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_frame, frames_received);
    counter!(record_drop, dropped);
    counter!(record_processed, total_processed);
    counter!(record_non_notification, non_notifications);
    counter!(record_decode_error, decode_errors);
    counter!(record_classified, events_classified);
    counter!(record_discarded, events_discarded);
    counter!(record_archived, archived);
    counter!(record_filtered, filtered_out);
    counter!(record_write_failure, write_failures);
    counter!(record_archive_error, archive_errors);
    counter!(record_enrichment_failure, enrichment_failures);
    counter!(record_connection, connections);
    counter!(record_reconnect, reconnects);

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received(),
            dropped: self.dropped(),
            total_processed: self.total_processed(),
            non_notifications: self.non_notifications(),
            decode_errors: self.decode_errors(),
            events_classified: self.events_classified(),
            events_discarded: self.events_discarded(),
            archived: self.archived(),
            filtered_out: self.filtered_out(),
            write_failures: self.write_failures(),
            archive_errors: self.archive_errors(),
            enrichment_failures: self.enrichment_failures(),
            connections: self.connections(),
            reconnects: self.reconnects(),
        }
    }
}

/// Log and persist a snapshot every `interval` until shutdown. A final
/// snapshot is written on the way out.
pub async fn run_reporter(
    metrics: Arc<RadarMetrics>,
    db: SharedDatabase,
    interval: Duration,
    shutdown: Shutdown,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.stopped() => break,
            _ = ticker.tick() => persist(&metrics, &db).await,
        }
    }
    persist(&metrics, &db).await;
}

async fn persist(metrics: &RadarMetrics, db: &SharedDatabase) {
    let snap = metrics.snapshot();
    info!(
        frames = snap.frames_received,
        processed = snap.total_processed,
        dropped = snap.dropped,
        classified = snap.events_classified,
        archived = snap.archived,
        write_failures = snap.write_failures,
        archive_errors = snap.archive_errors,
        reconnects = snap.reconnects,
        "Radar stats"
    );
    let db = db.clone();
    match tokio::task::spawn_blocking(move || db.record_metrics(&snap)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Failed to persist radar stats"),
        Err(e) => warn!(error = %e, "Radar stats task failed"),
    }
}
