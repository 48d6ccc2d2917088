//! Best-effort coin/market lookup used by the archiver.
//!
//! The response shape differs between deployments of the market-data API,
//! so decoding goes through one serde struct that accepts every known alias.
//! Nothing outside this module looks at raw API JSON.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::{ArchiveConfig, EnrichmentConfig};
use crate::core::Enrichment;

#[derive(Debug)]
pub enum EnrichError {
    Http(reqwest::Error),
    Status(StatusCode),
    Timeout(Duration),
}

impl std::fmt::Display for EnrichError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrichError::Http(e) => write!(f, "HTTP error: {e}"),
            EnrichError::Status(s) => write!(f, "market-data API returned {s}"),
            EnrichError::Timeout(d) => write!(f, "market-data lookup timed out after {}ms", d.as_millis()),
        }
    }
}

impl std::error::Error for EnrichError {}

/// Source of coin/market metadata keyed by mint.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// `Ok(None)` when the source does not know the mint.
    async fn lookup(&self, mint: &str) -> Result<Option<Enrichment>, EnrichError>;
}

// Deployments send overlapping keys (pump.fun has both `market_cap` in SOL
// and `usd_market_cap`), so every spelling is its own field.
#[derive(Debug, Deserialize)]
struct CoinResponse {
    #[serde(default)]
    mint: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    image_uri: Option<String>,
    #[serde(default)]
    logo: Option<String>,
    #[serde(default)]
    usd_market_cap: Option<f64>,
    #[serde(default, rename = "marketCap")]
    market_cap_camel: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    holder_count: Option<u64>,
    #[serde(default)]
    holders: Option<u64>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

impl CoinResponse {
    fn into_enrichment(self, requested_mint: &str) -> Enrichment {
        Enrichment {
            mint: non_empty(self.mint).or_else(|| Some(requested_mint.to_string())),
            name: non_empty(self.name),
            symbol: non_empty(self.symbol),
            image_url: non_empty(self.image_url)
                .or_else(|| non_empty(self.image_uri))
                .or_else(|| non_empty(self.logo)),
            market_cap_usd: self.usd_market_cap.or(self.market_cap_camel).or(self.market_cap),
            holder_count: self.holder_count.or(self.holders),
        }
    }
}

/// HTTP market-data client: `GET <base_url>/<mint>`.
pub struct HttpMarketData {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl HttpMarketData {
    pub fn new(config: &EnrichmentConfig) -> Result<Self, EnrichError> {
        let timeout = Duration::from_millis(config.timeout_ms.max(1));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(EnrichError::Http)?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    async fn fetch(&self, mint: &str) -> Result<Option<Enrichment>, EnrichError> {
        let url = format!("{}/{mint}", self.base_url);
        let resp = self.client.get(&url).send().await.map_err(EnrichError::Http)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(EnrichError::Status(resp.status()));
        }
        let coin: CoinResponse = resp.json().await.map_err(EnrichError::Http)?;
        Ok(Some(coin.into_enrichment(mint)))
    }
}

#[async_trait]
impl MarketDataSource for HttpMarketData {
    async fn lookup(&self, mint: &str) -> Result<Option<Enrichment>, EnrichError> {
        tokio::time::timeout(self.timeout, self.fetch(mint))
            .await
            .map_err(|_| EnrichError::Timeout(self.timeout))?
    }
}

/// Materiality bar an actor's coin must clear before it is archived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viability {
    pub min_market_cap_usd: f64,
    pub min_holders: u64,
}

impl Viability {
    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self {
            min_market_cap_usd: config.min_market_cap_usd,
            min_holders: config.min_holders,
        }
    }

    /// Unknown market cap or holder count fails the check.
    pub fn check(&self, enrichment: &Enrichment) -> bool {
        match (enrichment.market_cap_usd, enrichment.holder_count) {
            (Some(cap), Some(holders)) => cap >= self.min_market_cap_usd && holders >= self.min_holders,
            _ => false,
        }
    }
}

fn is_base58(c: char) -> bool {
    c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l')
}

/// Find the coin a log set is about: the first base58 token of address
/// length ending in `pump` that is not the program itself.
pub fn extract_mint<S: AsRef<str>>(log_lines: &[S], program_id: &str) -> Option<String> {
    log_lines.iter().find_map(|line| {
        line.as_ref()
            .split(|c: char| !is_base58(c))
            .find(|tok| (32..=44).contains(&tok.len()) && tok.ends_with("pump") && *tok != program_id)
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PUMP_PROGRAM_ID;

    const MINT: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";
    const PUMP_MINT: &str = "Dz9mQ9NzkBcCsuGPFJ3r1bS4wgqKMHBPiVuniW8Mpump";

    const PUMP_COIN_BODY: &str = r#"{
        "mint": "Dz9mQ9NzkBcCsuGPFJ3r1bS4wgqKMHBPiVuniW8Mpump",
        "name": "Frog Coin",
        "symbol": "FROG",
        "description": "ribbit",
        "image_uri": "https://ipfs.io/ipfs/QmFrog",
        "metadata_uri": "https://ipfs.io/ipfs/QmFrogMeta",
        "twitter": null,
        "telegram": null,
        "bonding_curve": "8mB1m7vHqLVpC1yUBQx5mWvGgCRwD2rQBWz3pE1yXbQ9",
        "associated_bonding_curve": "4vQz6uN1qYxJ8cZ5bGk2rT7wVfHs3dLpEaM9nXoRjKt2",
        "creator": "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin",
        "created_timestamp": 1717171717000,
        "raydium_pool": null,
        "complete": false,
        "virtual_sol_reserves": 31500000000,
        "virtual_token_reserves": 1021000000000000,
        "total_supply": 1000000000000000,
        "show_name": true,
        "king_of_the_hill_timestamp": null,
        "market_cap": 31.5,
        "reply_count": 4,
        "last_reply": 1717171818000,
        "nsfw": false,
        "is_currently_live": false,
        "usd_market_cap": 6180.42
    }"#;

    /// Minimal HTTP/1.1 responder: 200 with `PUMP_COIN_BODY` for the known
    /// mint, 404 for anything else. Serves `requests` connections.
    async fn serve_coins(requests: usize) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for _ in 0..requests {
                let (mut sock, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 4096];
                let n = sock.read(&mut buf).await.unwrap();
                let head = String::from_utf8_lossy(&buf[..n]).to_string();
                let response = if head.starts_with(&format!("GET /coins/{PUMP_MINT} ")) {
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        PUMP_COIN_BODY.len(),
                        PUMP_COIN_BODY
                    )
                } else {
                    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                };
                sock.write_all(response.as_bytes()).await.unwrap();
                sock.shutdown().await.ok();
            }
        });
        format!("http://{addr}/coins/")
    }

    fn client(base_url: String) -> HttpMarketData {
        HttpMarketData::new(&EnrichmentConfig { enabled: true, base_url, timeout_ms: 2_000 }).unwrap()
    }

    #[test]
    fn decodes_pump_style_response() {
        let raw = r#"{"mint":"m1","name":"Frog","symbol":"FRG","image_uri":"https://img/frog.png","usd_market_cap":12345.6,"reply_count":4}"#;
        let coin: CoinResponse = serde_json::from_str(raw).unwrap();
        let e = coin.into_enrichment("m1");
        assert_eq!(e.name.as_deref(), Some("Frog"));
        assert_eq!(e.image_url.as_deref(), Some("https://img/frog.png"));
        assert_eq!(e.market_cap_usd, Some(12345.6));
        assert_eq!(e.holder_count, None);
    }

    #[test]
    fn decodes_alternate_aliases() {
        let raw = r#"{"name":"Cat","logo":"https://img/cat.png","marketCap":99.0,"holders":12}"#;
        let coin: CoinResponse = serde_json::from_str(raw).unwrap();
        let e = coin.into_enrichment("mintX");
        assert_eq!(e.mint.as_deref(), Some("mintX"));
        assert_eq!(e.image_url.as_deref(), Some("https://img/cat.png"));
        assert_eq!(e.market_cap_usd, Some(99.0));
        assert_eq!(e.holder_count, Some(12));
        assert_eq!(e.display_symbol(), "-");
    }

    #[test]
    fn prefers_usd_cap_when_both_caps_present() {
        let raw = r#"{"mint":"m1","name":"Frog","symbol":"FRG","image_uri":"https://img/frog.png","market_cap":31.5,"usd_market_cap":5000.0}"#;
        let e = serde_json::from_str::<CoinResponse>(raw).unwrap().into_enrichment("m1");
        assert_eq!(e.market_cap_usd, Some(5000.0));
    }

    #[test]
    fn duplicate_spellings_do_not_collide() {
        let raw = r#"{"image_url":"","image_uri":"https://a","logo":"https://b","holders":7,"holder_count":9,"marketCap":12.0,"market_cap":3.0}"#;
        let e = serde_json::from_str::<CoinResponse>(raw).unwrap().into_enrichment("m");
        assert_eq!(e.image_url.as_deref(), Some("https://a"));
        assert_eq!(e.holder_count, Some(9));
        assert_eq!(e.market_cap_usd, Some(12.0));
    }

    #[test]
    fn decodes_full_pump_payload() {
        let e = serde_json::from_str::<CoinResponse>(PUMP_COIN_BODY).unwrap().into_enrichment(PUMP_MINT);
        assert_eq!(e.mint.as_deref(), Some(PUMP_MINT));
        assert_eq!(e.display_name(), "Frog Coin");
        assert_eq!(e.display_symbol(), "FROG");
        assert_eq!(e.image_url.as_deref(), Some("https://ipfs.io/ipfs/QmFrog"));
        assert_eq!(e.market_cap_usd, Some(6180.42));
        assert_eq!(e.holder_count, None);
    }

    #[test]
    fn empty_strings_become_none() {
        let coin: CoinResponse = serde_json::from_str(r#"{"name":"","symbol":""}"#).unwrap();
        let e = coin.into_enrichment("m");
        assert_eq!(e.display_name(), "Scanning...");
    }

    #[test]
    fn viability_requires_both_stats() {
        let bar = Viability { min_market_cap_usd: 10_000.0, min_holders: 50 };
        let mut e = Enrichment { market_cap_usd: Some(20_000.0), holder_count: Some(80), ..Default::default() };
        assert!(bar.check(&e));
        e.holder_count = Some(49);
        assert!(!bar.check(&e));
        e.holder_count = None;
        assert!(!bar.check(&e));
        assert!(!bar.check(&Enrichment::default()));
    }

    #[test]
    fn viability_bounds_are_inclusive() {
        let bar = Viability { min_market_cap_usd: 100.0, min_holders: 5 };
        let e = Enrichment { market_cap_usd: Some(100.0), holder_count: Some(5), ..Default::default() };
        assert!(bar.check(&e));
    }

    #[test]
    fn extracts_pump_mint_but_not_program() {
        let logs = vec![
            format!("Program {PUMP_PROGRAM_ID} invoke [1]"),
            format!("Program log: mint={PUMP_MINT}, amount=1000"),
        ];
        assert_eq!(extract_mint(&logs, PUMP_PROGRAM_ID).as_deref(), Some(PUMP_MINT));
    }

    #[test]
    fn ignores_non_pump_addresses() {
        let logs = vec![format!("Program {MINT} invoke [2]")];
        assert_eq!(extract_mint(&logs, PUMP_PROGRAM_ID), None);
        assert_eq!(extract_mint::<&str>(&[], PUMP_PROGRAM_ID), None);
    }

    #[tokio::test]
    async fn unreachable_source_is_an_error_not_a_hang() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let source = HttpMarketData::new(&EnrichmentConfig {
            enabled: true,
            base_url: format!("http://127.0.0.1:{port}/coins/"),
            timeout_ms: 500,
        })
        .unwrap();
        assert!(source.lookup(PUMP_MINT).await.is_err());
    }

    #[tokio::test]
    async fn lookup_returns_known_coin() {
        let source = client(serve_coins(1).await);
        let found = source.lookup(PUMP_MINT).await.unwrap().expect("coin should be known");
        assert_eq!(found.display_name(), "Frog Coin");
        assert_eq!(found.market_cap_usd, Some(6180.42));
    }

    #[tokio::test]
    async fn lookup_not_found_is_none() {
        let source = client(serve_coins(1).await);
        assert!(source.lookup("7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYpump").await.unwrap().is_none());
    }
}
