pub mod archive;
pub mod config;
pub mod core;
pub mod db;
pub mod enrich;
pub mod rpc;
pub mod signals;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::archive::Archiver;
use crate::config::Config;
use crate::core::buffer::IngressBuffer;
use crate::core::metrics::{self, MetricsSnapshot, RadarMetrics};
use crate::core::pipeline::ClassifierPool;
use crate::core::shutdown::Shutdown;
use crate::db::{SharedDatabase, StoreError};
use crate::enrich::{HttpMarketData, Viability};
use crate::rpc::ws_sub::StreamConnector;
use crate::signals::FingerprintClassifier;

/// Wire every component from a validated config and run until `shutdown`
/// fires. Returns the final counters.
pub async fn run(config: Config, shutdown: Shutdown) -> Result<MetricsSnapshot, StoreError> {
    let db_path = Path::new(&config.archive.db_path);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(dir = %parent.display(), error = %e, "Failed to create database directory");
        }
    }
    let db = SharedDatabase::open(db_path)?;
    info!(path = %config.archive.db_path, "Actor registry opened");

    let metrics = Arc::new(RadarMetrics::new());
    let buffer = Arc::new(IngressBuffer::new(config.buffer.capacity, metrics.clone()));

    let mut archiver =
        Archiver::new(db.clone(), metrics.clone()).with_program_id(config.stream.program_id.clone());
    if config.enrichment.enabled {
        match HttpMarketData::new(&config.enrichment) {
            Ok(source) => {
                info!(base_url = %config.enrichment.base_url, "Market-data enrichment enabled");
                archiver = archiver.with_market_data(Arc::new(source));
            }
            Err(e) => warn!(error = %e, "Market-data client unavailable, running without enrichment"),
        }
    }
    if config.archive.viability_filter {
        archiver = archiver.with_viability(Viability::from_config(&config.archive));
    }
    let archiver = Arc::new(archiver);
    archiver.rebuild_cache().await?;

    let connector = StreamConnector::new(config.stream.clone(), buffer.clone(), metrics.clone(), shutdown.clone());
    let connector = tokio::spawn(connector.run());

    let pool = ClassifierPool::new(
        buffer,
        Arc::new(FingerprintClassifier::new(config.classifier.trade_threshold)),
        archiver,
        metrics.clone(),
        shutdown.clone(),
        config.classifier.workers,
    );
    let workers = pool.spawn();

    let reporter = tokio::spawn(metrics::run_reporter(
        metrics.clone(),
        db,
        Duration::from_secs(config.metrics.report_interval_secs),
        shutdown.clone(),
    ));

    shutdown.stopped().await;
    info!("Shutdown requested, waiting for tasks");

    for handle in workers.into_iter().chain([connector, reporter]) {
        if let Err(e) = handle.await {
            warn!(error = %e, "Task ended abnormally");
        }
    }
    Ok(metrics.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;

    fn notification(signature: &str) -> String {
        serde_json::json!({
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "result": {
                    "context": { "slot": 1 },
                    "value": {
                        "signature": signature,
                        "err": null,
                        "logs": [
                            "Program log: Instruction: InitializeMint2",
                            "Program log: Instruction: MintTo"
                        ]
                    }
                },
                "subscription": 3
            }
        })
        .to_string()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn radar_archives_streamed_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            let _subscribe = ws.next().await.unwrap().unwrap();
            ws.send(Message::Text(r#"{"jsonrpc":"2.0","result":3,"id":1}"#.into())).await.unwrap();
            ws.send(Message::Text(notification("sigA"))).await.unwrap();
            ws.send(Message::Text(notification("sigB"))).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let db_path = std::env::temp_dir().join(format!("mmradar_run_test_{}.db", std::process::id()));
        let _ = std::fs::remove_file(&db_path);

        let mut config = Config::default();
        config.stream.ws_url = format!("ws://{addr}");
        config.archive.db_path = db_path.to_string_lossy().into_owned();
        config.classifier.workers = 2;
        config.metrics.report_interval_secs = 1;

        let shutdown = Shutdown::new();
        let radar = tokio::spawn(run(config, shutdown.clone()));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        let reader = loop {
            assert!(tokio::time::Instant::now() < deadline, "events never reached the registry");
            if let Ok(db) = SharedDatabase::open_read_only(&db_path) {
                if db.actor_count().unwrap_or(0) == 2 {
                    break db;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        assert_eq!(reader.get_actor("sigA").unwrap().unwrap().threat_level, 90.0);

        shutdown.trigger();
        let snap = tokio::time::timeout(Duration::from_secs(5), radar)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(snap.frames_received, 3);
        assert_eq!(snap.non_notifications, 1);
        assert_eq!(snap.archived, 2);
        assert_eq!(snap.connections, 1);
        assert_eq!(reader.latest_metrics().unwrap().unwrap().archived, 2);
    }
}
