use serde::Deserialize;
use std::path::Path;

pub const PUMP_PROGRAM_ID: &str = "6EF8rrecthR5DkZJbdz4P8hHKXY6yizQ2EtJhEqNpump";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub buffer: BufferConfig,
    pub classifier: ClassifierConfig,
    pub archive: ArchiveConfig,
    pub enrichment: EnrichmentConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StreamConfig {
    pub ws_url: String,
    pub program_id: String,
    pub commitment: String,
    pub connect_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub ping_on_idle: bool,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Trade markers needed (strictly more than this) for the HFT fingerprint.
    pub trade_threshold: usize,
    pub workers: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ArchiveConfig {
    pub db_path: String,
    pub viability_filter: bool,
    pub min_market_cap_usd: f64,
    pub min_holders: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetricsConfig {
    pub report_interval_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            program_id: PUMP_PROGRAM_ID.into(),
            commitment: "processed".into(),
            connect_timeout_ms: 10_000,
            idle_timeout_ms: 30_000,
            ping_on_idle: true,
            backoff_initial_ms: 500,
            backoff_max_ms: 30_000,
            user_agent: concat!("mmradar/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            trade_threshold: 10,
            workers: 5,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            db_path: "archive/sovereign_vault.sqlite".into(),
            viability_filter: false,
            min_market_cap_usd: 10_000.0,
            min_holders: 50,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://frontend-api.pump.fun/coins".into(),
            timeout_ms: 1_500,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    MissingValue(&'static str),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingValue(key) => write!(f, "missing configuration value: {key}"),
            ConfigError::InvalidValue(msg) => write!(f, "invalid configuration value: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load config from a TOML file. Falls back to defaults if file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    tracing::info!("Config loaded from {}", path.display());
                    config.trimmed()
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }

    fn trimmed(mut self) -> Self {
        for field in [
            &mut self.stream.ws_url,
            &mut self.stream.program_id,
            &mut self.stream.commitment,
            &mut self.archive.db_path,
            &mut self.enrichment.base_url,
        ] {
            *field = field.trim().to_string();
        }
        self
    }

    /// Apply environment overrides on top of file values.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("WSS_URL_PRIMARY").filter(|v| !v.trim().is_empty()) {
            self.stream.ws_url = url.trim().to_string();
        }
        if let Some(path) = lookup("RADAR_DB_PATH").filter(|v| !v.trim().is_empty()) {
            self.archive.db_path = path.trim().to_string();
        }
    }

    /// Mandatory settings are checked once at startup; a failure here is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.stream.ws_url.as_str();
        if url.trim().is_empty() {
            return Err(ConfigError::MissingValue("stream.ws_url (or WSS_URL_PRIMARY)"));
        }
        if url != url.trim() || (!url.starts_with("ws://") && !url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue(format!(
                "stream.ws_url must start with ws:// or wss://, got {url}"
            )));
        }
        if self.stream.program_id.trim().is_empty() {
            return Err(ConfigError::MissingValue("stream.program_id"));
        }
        if self.buffer.capacity == 0 {
            return Err(ConfigError::InvalidValue("buffer.capacity must be > 0".into()));
        }
        if self.classifier.workers == 0 {
            return Err(ConfigError::InvalidValue("classifier.workers must be > 0".into()));
        }
        if self.enrichment.enabled && self.enrichment.base_url.trim().is_empty() {
            return Err(ConfigError::MissingValue("enrichment.base_url"));
        }
        Ok(())
    }
}
