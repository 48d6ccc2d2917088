pub mod ws_sub;

use serde::Deserialize;
use serde_json::{Value, json};

/// JSON-RPC `logsSubscribe` request for every transaction mentioning `program_id`.
pub fn logs_subscribe_request(program_id: &str, commitment: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "logsSubscribe",
        "params": [
            { "mentions": [program_id] },
            { "commitment": commitment },
        ],
    })
}

/// The `value` of a `logsNotification` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogsValue {
    pub signature: String,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub logs: Vec<String>,
}

/// A decoded notification: the log set plus the slot it landed in, if given.
#[derive(Debug, Clone, PartialEq)]
pub struct LogsNotification {
    pub slot: Option<u64>,
    pub value: LogsValue,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    params: Option<Params>,
}

#[derive(Deserialize)]
struct Params {
    result: NotificationResult,
}

#[derive(Deserialize)]
struct NotificationResult {
    #[serde(default)]
    context: Option<Context>,
    value: LogsValue,
}

#[derive(Deserialize)]
struct Context {
    slot: u64,
}

#[derive(Debug)]
pub struct DecodeError(serde_json::Error);

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "envelope decode error: {}", self.0)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Decode a raw frame. `Ok(None)` means the frame is valid JSON but not a
/// log notification (subscription acks, pongs from the RPC layer, ...).
pub fn decode_notification(raw: &[u8]) -> Result<Option<LogsNotification>, DecodeError> {
    let envelope: Envelope = serde_json::from_slice(raw).map_err(DecodeError)?;
    Ok(envelope.params.map(|p| LogsNotification {
        slot: p.result.context.map(|c| c.slot),
        value: p.result.value,
    }))
}
