use mmradar::config::Config;
use mmradar::core::shutdown::Shutdown;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mmradar=info")))
        .init();

    tracing::info!("MM radar starting...");

    dotenv::dotenv().ok();
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path).with_env_overrides();
    if let Err(e) = config.validate() {
        tracing::error!("Configuration rejected: {e}");
        std::process::exit(1);
    }
    tracing::info!(
        endpoint = %config.stream.ws_url,
        workers = config.classifier.workers,
        capacity = config.buffer.capacity,
        db = %config.archive.db_path,
        "Config ready"
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let shutdown = Shutdown::new();
    let result = runtime.block_on(async {
        let signal = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Ctrl-C received"),
                Err(e) => tracing::warn!("Failed to listen for Ctrl-C: {e}"),
            }
            signal.trigger();
        });
        mmradar::run(config, shutdown).await
    });

    match result {
        Ok(snap) => tracing::info!(
            processed = snap.total_processed,
            dropped = snap.dropped,
            archived = snap.archived,
            write_failures = snap.write_failures,
            "MM radar stopped"
        ),
        Err(e) => {
            tracing::error!("MM radar failed: {e}");
            std::process::exit(1);
        }
    }
}
