//! # Header Subscription
//!
//! `eth_subscribe("newHeads")` over WebSocket. Heads are only a wake-up
//! signal: consumers re-read the finalized head over HTTP before acting, so
//! a dropped or duplicated notification never affects correctness.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::errors::L1Error;
use crate::http::parse_hex_u64;

/// Base delay between reconnection attempts (exponential backoff).
const RECONNECT_BASE_DELAY_SECS: u64 = 1;

/// Maximum delay between reconnection attempts.
const MAX_RECONNECT_DELAY_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct SubscriptionMessage {
    id: Option<u64>,
    result: Option<serde_json::Value>,
    error: Option<serde_json::Value>,
    params: Option<SubscriptionParams>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionParams {
    result: HeadNotification,
}

#[derive(Debug, Deserialize)]
struct HeadNotification {
    number: String,
}

/// Forwards new head numbers to a channel, reconnecting forever.
pub struct HeaderSubscriber {
    ws_url: String,
}

impl HeaderSubscriber {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }

    /// Run until `shutdown` flips or the receiving side of `heads` is dropped.
    pub async fn run(self, heads: mpsc::Sender<u64>, mut shutdown: watch::Receiver<bool>) {
        let mut attempts = 0u32;

        loop {
            let outcome = tokio::select! {
                result = self.run_connection(&heads) => result,
                _ = shutdown.changed() => return,
            };

            match outcome {
                Ok(()) => return,
                Err(e) => {
                    attempts += 1;
                    let delay = Self::backoff_delay(attempts);
                    warn!(
                        error = %e,
                        error_kind = e.error_kind(),
                        attempts,
                        delay_secs = delay.as_secs(),
                        "[rn-03] Header subscription lost, reconnecting"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => return,
                    }
                }
            }
        }
    }

    fn backoff_delay(attempts: u32) -> Duration {
        Duration::from_secs(std::cmp::min(
            RECONNECT_BASE_DELAY_SECS.saturating_mul(1 << attempts.min(6)),
            MAX_RECONNECT_DELAY_SECS,
        ))
    }

    /// One connection; `Ok` means the consumer went away.
    async fn run_connection(&self, heads: &mpsc::Sender<u64>) -> Result<(), L1Error> {
        let (ws_stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| L1Error::Subscription(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_subscribe",
            "params": ["newHeads"],
        });
        write
            .send(Message::Text(request.to_string().into()))
            .await
            .map_err(|e| L1Error::Subscription(e.to_string()))?;
        info!("[rn-03] Subscribed to new heads");

        while let Some(frame) = read.next().await {
            let frame = frame.map_err(|e| L1Error::Subscription(e.to_string()))?;
            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let message: SubscriptionMessage = match serde_json::from_str(text.as_str()) {
                Ok(message) => message,
                Err(e) => {
                    debug!(error = %e, "Ignoring unparseable frame");
                    continue;
                }
            };

            if let (Some(1), Some(error)) = (message.id, message.error) {
                return Err(L1Error::Subscription(error.to_string()));
            }
            if message.result.is_some() {
                continue;
            }
            if let Some(params) = message.params {
                let number = parse_hex_u64(&params.result.number)?;
                if heads.send(number).await.is_err() {
                    return Ok(());
                }
            }
        }

        Err(L1Error::Subscription("connection closed".into()))
    }
}
