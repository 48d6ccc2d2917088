use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use super::logs_subscribe_request;
use crate::config::StreamConfig;
use crate::core::RawMessage;
use crate::core::buffer::IngressBuffer;
use crate::core::metrics::RadarMetrics;
use crate::core::shutdown::Shutdown;

/// Capped exponential backoff with unlimited retries.
#[derive(Debug)]
pub struct ReconnectBackoff {
    initial_ms: u64,
    max_ms: u64,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        Self {
            initial_ms: initial_ms.max(1),
            max_ms: max_ms.max(initial_ms.max(1)),
            attempt: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u64.saturating_pow(self.attempt.min(32));
        let delay = self.initial_ms.saturating_mul(factor).min(self.max_ms);
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(delay)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[derive(Debug)]
pub enum StreamError {
    Request(tungstenite::Error),
    Connect(tungstenite::Error),
    ConnectTimeout(Duration),
    Send(tungstenite::Error),
    Receive(tungstenite::Error),
    Closed(Option<String>),
    Ended,
    Idle(Duration),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::Request(e) => write!(f, "invalid subscription endpoint: {e}"),
            StreamError::Connect(e) => write!(f, "connect failed: {e}"),
            StreamError::ConnectTimeout(d) => write!(f, "connect timed out after {}ms", d.as_millis()),
            StreamError::Send(e) => write!(f, "send failed: {e}"),
            StreamError::Receive(e) => write!(f, "receive failed: {e}"),
            StreamError::Closed(Some(reason)) => write!(f, "closed by upstream: {reason}"),
            StreamError::Closed(None) => write!(f, "closed by upstream"),
            StreamError::Ended => write!(f, "stream ended"),
            StreamError::Idle(d) => write!(f, "no frames for {}ms, link presumed dead", d.as_millis()),
        }
    }
}

impl std::error::Error for StreamError {}

/// Owns the single logical `logsSubscribe` subscription and feeds every
/// received frame into the ingress buffer. Knows nothing about event semantics.
pub struct StreamConnector {
    config: StreamConfig,
    buffer: Arc<IngressBuffer>,
    metrics: Arc<RadarMetrics>,
    shutdown: Shutdown,
}

impl StreamConnector {
    pub fn new(
        config: StreamConfig,
        buffer: Arc<IngressBuffer>,
        metrics: Arc<RadarMetrics>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            config,
            buffer,
            metrics,
            shutdown,
        }
    }

    /// Run until shutdown. Connection loss is logged and retried forever.
    pub async fn run(self) {
        let mut backoff = ReconnectBackoff::new(self.config.backoff_initial_ms, self.config.backoff_max_ms);
        info!(
            endpoint = %self.config.ws_url,
            program = %self.config.program_id,
            commitment = %self.config.commitment,
            "Stream connector started"
        );

        while self.shutdown.is_running() {
            let result = tokio::select! {
                r = self.session(&mut backoff) => r,
                _ = self.shutdown.stopped() => break,
            };
            if !self.shutdown.is_running() {
                break;
            }

            let Err(e) = result;
            let delay = backoff.next_delay();
            let reconnects = self.metrics.record_reconnect();
            warn!(error = %e, retry_in_ms = delay.as_millis() as u64, reconnects, "Radar connection lost");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.stopped() => break,
            }
        }

        info!("Stream connector stopped");
    }

    /// One connection lifetime: connect, subscribe once, pump frames.
    /// Only returns once the link is gone, clean close included.
    async fn session(&self, backoff: &mut ReconnectBackoff) -> Result<Infallible, StreamError> {
        let mut request = self
            .config
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(StreamError::Request)?;
        if let Ok(agent) = HeaderValue::from_str(&self.config.user_agent) {
            request.headers_mut().insert(USER_AGENT, agent);
        }

        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let (mut ws, _) = timeout(connect_timeout, connect_async(request))
            .await
            .map_err(|_| StreamError::ConnectTimeout(connect_timeout))?
            .map_err(StreamError::Connect)?;
        let connections = self.metrics.record_connection();

        let subscribe = logs_subscribe_request(&self.config.program_id, &self.config.commitment);
        ws.send(Message::Text(subscribe.to_string()))
            .await
            .map_err(StreamError::Send)?;
        backoff.reset();
        info!(connections, program = %self.config.program_id, "Subscribed to program logs");

        let idle = Duration::from_millis(self.config.idle_timeout_ms.max(1));
        let mut ping_outstanding = false;

        loop {
            let frame = match timeout(idle, ws.next()).await {
                Ok(frame) => frame,
                Err(_) if self.config.ping_on_idle && !ping_outstanding => {
                    debug!(idle_ms = idle.as_millis() as u64, "Link idle, sending ping");
                    ws.send(Message::Ping(Vec::new())).await.map_err(StreamError::Send)?;
                    ping_outstanding = true;
                    continue;
                }
                Err(_) => return Err(StreamError::Idle(idle)),
            };

            let msg = match frame {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Err(StreamError::Receive(e)),
                None => return Err(StreamError::Ended),
            };
            ping_outstanding = false;

            match msg {
                Message::Text(text) => self.enqueue(text.into_bytes()),
                Message::Binary(bytes) => self.enqueue(bytes),
                Message::Close(frame) => {
                    let reason = frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty());
                    return Err(StreamError::Closed(reason));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    fn enqueue(&self, payload: Vec<u8>) {
        self.metrics.record_frame();
        self.buffer.push(RawMessage::new(payload));
    }
}
