pub mod buffer;
pub mod metrics;
pub mod pipeline;
pub mod shutdown;

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A frame exactly as it came off the subscription socket.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub payload: Vec<u8>,
    pub arrived_at: DateTime<Utc>,
    /// Monotonic receipt time, used for queue latency.
    pub received: Instant,
}

impl RawMessage {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            arrived_at: Utc::now(),
            received: Instant::now(),
        }
    }
}

/// Behavioral fingerprint assigned to an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BehaviorTag {
    InstantBundleLaunch,
    SafeDevEntry,
    HighFrequencyAccumulation,
    BotHftActivity,
    GodModeMm,
    PumpDumpScum,
}

impl BehaviorTag {
    pub const ALL: [BehaviorTag; 6] = [
        BehaviorTag::InstantBundleLaunch,
        BehaviorTag::SafeDevEntry,
        BehaviorTag::HighFrequencyAccumulation,
        BehaviorTag::BotHftActivity,
        BehaviorTag::GodModeMm,
        BehaviorTag::PumpDumpScum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorTag::InstantBundleLaunch => "INSTANT_BUNDLE_LAUNCH",
            BehaviorTag::SafeDevEntry => "SAFE_DEV_ENTRY",
            BehaviorTag::HighFrequencyAccumulation => "HIGH_FREQUENCY_ACCUMULATION",
            BehaviorTag::BotHftActivity => "BOT_HFT_ACTIVITY",
            BehaviorTag::GodModeMm => "GOD_MODE_MM",
            BehaviorTag::PumpDumpScum => "PUMP_DUMP_SCUM",
        }
    }
}

impl fmt::Display for BehaviorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTag(pub String);

impl fmt::Display for UnknownTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown behavior tag: {}", self.0)
    }
}

impl std::error::Error for UnknownTag {}

impl FromStr for BehaviorTag {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BehaviorTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| UnknownTag(s.to_string()))
    }
}

/// Coin/market metadata from the enrichment API. Every field is optional;
/// display defaults live in the accessors, not at call sites.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub mint: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub image_url: Option<String>,
    pub market_cap_usd: Option<f64>,
    pub holder_count: Option<u64>,
}

impl Enrichment {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Scanning...")
    }

    pub fn display_symbol(&self) -> &str {
        self.symbol.as_deref().unwrap_or("-")
    }
}

/// A classified notification, consumed once by the archiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub signature: String,
    pub observed_at: DateTime<Utc>,
    pub event_type: BehaviorTag,
    pub risk_level: u8, // 0-100, advisory
    pub log_lines: Vec<String>,
    pub enrichment: Option<Enrichment>,
}
