//! # Remote Machine Adapter
//!
//! `Machines` backed by a machine server speaking JSON over HTTP:
//!
//! ```text
//! POST {endpoint}/advance/0x{app}
//! {"index": 3, "payload": "0x..."}
//!
//! 200 {"status": "accepted", "outputs": ["0x..."], "reports": ["0x..."],
//!      "outputs_hash": "0x...", "machine_hash": "0x..." | null}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{
    decode_hex, parse_hash, to_hex, Address, AdvanceResult, InputCompletionStatus,
};
use tracing::debug;

use crate::domain::errors::MachineError;
use crate::ports::outbound::Machines;

#[derive(Serialize)]
struct AdvanceRequest {
    index: u64,
    payload: String,
}

#[derive(Deserialize)]
struct AdvanceResponse {
    status: String,
    #[serde(default)]
    outputs: Vec<String>,
    #[serde(default)]
    reports: Vec<String>,
    outputs_hash: String,
    #[serde(default)]
    machine_hash: Option<String>,
}

impl AdvanceResponse {
    fn into_result(self) -> Result<AdvanceResult, MachineError> {
        let status = self
            .status
            .parse::<InputCompletionStatus>()
            .map_err(|e| MachineError::Decode(e.to_string()))?;
        if status == InputCompletionStatus::None {
            return Err(MachineError::Decode("machine returned status none".into()));
        }

        let blobs = |values: Vec<String>| -> Result<Vec<Vec<u8>>, MachineError> {
            values
                .iter()
                .map(|v| decode_hex(v).map_err(|e| MachineError::Decode(e.to_string())))
                .collect()
        };
        let hash = |v: &str| parse_hash(v).map_err(|e| MachineError::Decode(e.to_string()));

        Ok(AdvanceResult {
            status,
            outputs: blobs(self.outputs)?,
            reports: blobs(self.reports)?,
            outputs_hash: hash(self.outputs_hash.as_str())?,
            machine_hash: self.machine_hash.as_deref().map(hash).transpose()?,
        })
    }
}

/// Machines hosted by a remote machine server.
pub struct RemoteMachines {
    http: reqwest::Client,
    endpoint: String,
    apps: Vec<Address>,
}

impl RemoteMachines {
    /// `endpoint` without a trailing slash; `apps` are the applications
    /// the server has loaded.
    pub fn new(
        endpoint: impl Into<String>,
        apps: Vec<Address>,
        timeout: Duration,
    ) -> Result<Self, MachineError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            apps,
        })
    }
}

#[async_trait]
impl Machines for RemoteMachines {
    fn apps(&self) -> Vec<Address> {
        self.apps.clone()
    }

    async fn advance(
        &self,
        app: Address,
        payload: &[u8],
        index: u64,
    ) -> Result<AdvanceResult, MachineError> {
        if !self.apps.contains(&app) {
            return Err(MachineError::UnknownApplication(app));
        }

        let url = format!("{}/advance/{}", self.endpoint, to_hex(&app));
        debug!(%url, index, "[rn-04] Advancing remote machine");
        let response = self
            .http
            .post(&url)
            .json(&AdvanceRequest {
                index,
                payload: to_hex(payload),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MachineError::Server {
                status: status.as_u16(),
                body,
            });
        }
        let body: AdvanceResponse = response
            .json()
            .await
            .map_err(|e| MachineError::Decode(e.to_string()))?;
        body.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    const APP: Address = [0xaa; 20];

    async fn advance_handler(
        Path(app): Path<String>,
        Json(body): Json<Value>,
    ) -> Result<Json<Value>, (StatusCode, String)> {
        if app != to_hex(&APP) {
            return Err((StatusCode::NOT_FOUND, "no such machine".into()));
        }
        let payload = body["payload"].as_str().unwrap_or_default().to_string();
        if payload == "0xff" {
            return Ok(Json(json!({
                "status": "rejected",
                "outputs_hash": to_hex(&[0x11; 32]),
                "machine_hash": null,
            })));
        }
        Ok(Json(json!({
            "status": "accepted",
            "outputs": [payload],
            "reports": ["0x01", "0x02"],
            "outputs_hash": to_hex(&[0x22; 32]),
            "machine_hash": to_hex(&[body["index"].as_u64().unwrap_or(0) as u8; 32]),
        })))
    }

    async fn serve() -> String {
        let router = Router::new().route("/advance/:app", post(advance_handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{address}/")
    }

    fn machines(endpoint: String, apps: Vec<Address>) -> RemoteMachines {
        RemoteMachines::new(endpoint, apps, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_accepted_result_is_decoded() {
        let remote = machines(serve().await, vec![APP]);
        let result = remote.advance(APP, &[0xbe, 0xef], 7).await.unwrap();

        assert_eq!(result.status, InputCompletionStatus::Accepted);
        assert_eq!(result.outputs, vec![vec![0xbe, 0xef]]);
        assert_eq!(result.reports, vec![vec![0x01], vec![0x02]]);
        assert_eq!(result.outputs_hash, [0x22; 32]);
        assert_eq!(result.machine_hash, Some([7; 32]));
    }

    #[tokio::test]
    async fn test_rejected_result_without_machine_hash() {
        let remote = machines(serve().await, vec![APP]);
        let result = remote.advance(APP, &[0xff], 0).await.unwrap();

        assert_eq!(result.status, InputCompletionStatus::Rejected);
        assert!(result.outputs.is_empty());
        assert_eq!(result.machine_hash, None);
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let other = [0xbb; 20];
        let remote = machines(serve().await, vec![APP, other]);
        let err = remote.advance(other, &[1], 0).await.unwrap_err();

        assert_eq!(
            err,
            MachineError::Server {
                status: 404,
                body: "no such machine".into()
            }
        );
        assert_eq!(err.error_kind(), "machine_server");
    }

    #[tokio::test]
    async fn test_unloaded_application_is_not_sent() {
        let remote = machines("http://127.0.0.1:1".into(), vec![APP]);
        let err = remote.advance([0xcc; 20], &[1], 0).await.unwrap_err();
        assert_eq!(err, MachineError::UnknownApplication([0xcc; 20]));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let remote = machines("http://127.0.0.1:1".into(), vec![APP]);
        let err = remote.advance(APP, &[1], 0).await.unwrap_err();
        assert_eq!(err.error_kind(), "machine_transport");
    }

    #[test]
    fn test_status_none_is_rejected() {
        let response = AdvanceResponse {
            status: "none".into(),
            outputs: vec![],
            reports: vec![],
            outputs_hash: to_hex(&[0; 32]),
            machine_hash: None,
        };
        assert!(matches!(response.into_result(), Err(MachineError::Decode(_))));
    }
}
