pub mod cache;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::metrics::RadarMetrics;
use crate::core::{Enrichment, MarketEvent};
use crate::db::{ActorRecord, ActorUpsert, SharedDatabase, StoreError};
use crate::enrich::{MarketDataSource, Viability, extract_mint};
use crate::signals::score;
use cache::{ActorCache, CacheEntry};

/// What became of one archival call.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveOutcome {
    /// Cache updated and the registry row merged.
    Committed(ActorRecord),
    /// Cache updated, registry write failed. Not retried.
    CachedOnly,
    /// Viability filter rejected the actor; nothing written.
    Filtered,
}

#[derive(Debug)]
pub enum ArchiveError {
    Snapshot(serde_json::Error),
}

impl std::fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveError::Snapshot(e) => write!(f, "failed to encode event snapshot: {e}"),
        }
    }
}

impl std::error::Error for ArchiveError {}

/// Stored as `historical_data_json`: the latest raw evidence plus enrichment.
#[derive(Debug, Serialize)]
struct EventSnapshot<'a> {
    signature: &'a str,
    observed_at: DateTime<Utc>,
    event_type: &'a str,
    risk_level: u8,
    logs: &'a [String],
    latency_ms: Option<f64>,
    api: Option<&'a Enrichment>,
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Merges classified events into the actor registry and keeps the read
/// cache current.
pub struct Archiver {
    db: SharedDatabase,
    cache: Arc<ActorCache>,
    metrics: Arc<RadarMetrics>,
    market_data: Option<Arc<dyn MarketDataSource>>,
    viability: Option<Viability>,
    program_id: String,
}

impl Archiver {
    pub fn new(db: SharedDatabase, metrics: Arc<RadarMetrics>) -> Self {
        Self {
            db,
            cache: Arc::new(ActorCache::new()),
            metrics,
            market_data: None,
            viability: None,
            program_id: crate::config::PUMP_PROGRAM_ID.to_string(),
        }
    }

    pub fn with_market_data(mut self, source: Arc<dyn MarketDataSource>) -> Self {
        self.market_data = Some(source);
        self
    }

    /// Only archive actors whose coin clears `bar`.
    pub fn with_viability(mut self, bar: Viability) -> Self {
        self.viability = Some(bar);
        self
    }

    pub fn with_program_id(mut self, program_id: impl Into<String>) -> Self {
        self.program_id = program_id.into();
        self
    }

    pub fn cache(&self) -> Arc<ActorCache> {
        self.cache.clone()
    }

    /// Reload the read cache from the registry.
    pub async fn rebuild_cache(&self) -> Result<usize, StoreError> {
        let db = self.db.clone();
        let records = tokio::task::spawn_blocking(move || db.all_actors())
            .await
            .map_err(|e| StoreError::Join(e.to_string()))??;
        let loaded = self.cache.rebuild(&records);
        info!(actors = loaded, "Actor cache rebuilt from registry");
        Ok(loaded)
    }

    pub async fn archive(&self, wallet_id: &str, event: &MarketEvent) -> Result<ArchiveOutcome, ArchiveError> {
        self.archive_observed(wallet_id, event, None).await
    }

    /// Archive with the queue latency the worker measured for this event.
    pub async fn archive_observed(
        &self,
        wallet_id: &str,
        event: &MarketEvent,
        latency_ms: Option<f64>,
    ) -> Result<ArchiveOutcome, ArchiveError> {
        let enrichment = self.resolve_enrichment(event).await;

        if let Some(bar) = &self.viability {
            if !enrichment.as_ref().is_some_and(|e| bar.check(e)) {
                self.metrics.record_filtered();
                debug!(wallet = short(wallet_id), tag = %event.event_type, "Below viability bar, not archived");
                return Ok(ArchiveOutcome::Filtered);
            }
        }

        let tag = event.event_type.as_str();
        let risk = score::base_risk(tag);
        let snapshot = serde_json::to_string(&EventSnapshot {
            signature: &event.signature,
            observed_at: event.observed_at,
            event_type: tag,
            risk_level: event.risk_level,
            logs: &event.log_lines,
            latency_ms,
            api: enrichment.as_ref(),
        })
        .map_err(ArchiveError::Snapshot)?;

        // The live view goes first; the durable write may be slow or fail.
        self.cache.insert(
            wallet_id,
            CacheEntry {
                tag: tag.to_string(),
                risk_level: risk,
                enrichment,
            },
        );

        let upsert = ActorUpsert {
            wallet_id: wallet_id.to_string(),
            risk_score: f64::from(risk),
            behavior_pattern: tag.to_string(),
            historical_data_json: snapshot,
            seen_at: event.observed_at,
        };
        let db = self.db.clone();
        let written = tokio::task::spawn_blocking(move || db.upsert_actor(&upsert))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))
            .and_then(|r| r);

        match written {
            Ok(record) => {
                self.metrics.record_archived();
                info!(
                    wallet = short(wallet_id),
                    tag,
                    threat = record.threat_level,
                    raids = record.total_raids,
                    "Actor archived"
                );
                Ok(ArchiveOutcome::Committed(record))
            }
            Err(e) => {
                self.metrics.record_write_failure();
                error!(wallet = short(wallet_id), tag, error = %e, "Registry write failed, cache kept");
                Ok(ArchiveOutcome::CachedOnly)
            }
        }
    }

    async fn resolve_enrichment(&self, event: &MarketEvent) -> Option<Enrichment> {
        if event.enrichment.is_some() {
            return event.enrichment.clone();
        }
        let source = self.market_data.as_ref()?;
        let Some(mint) = extract_mint(&event.log_lines, &self.program_id) else {
            debug!(signature = short(&event.signature), "No mint in logs, skipping enrichment");
            return None;
        };
        match source.lookup(&mint).await {
            Ok(found) => found,
            Err(e) => {
                self.metrics.record_enrichment_failure();
                warn!(mint = %mint, error = %e, "Enrichment unavailable");
                None
            }
        }
    }
}
