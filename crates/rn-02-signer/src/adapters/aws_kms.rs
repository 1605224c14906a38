//! # AWS KMS Adapter
//!
//! `KmsClient` over the KMS JSON protocol (`TrentService.GetPublicKey`,
//! `TrentService.Sign`), signed with SigV4.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared_types::Hash;
use tracing::debug;

use super::sigv4::{self, Credentials, SigningScope, UnsignedRequest};
use crate::domain::errors::SignerError;
use crate::ports::outbound::KmsClient;

const SERVICE: &str = "kms";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetPublicKeyRequest<'a> {
    key_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetPublicKeyResponse {
    public_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SignRequest<'a> {
    key_id: &'a str,
    message: String,
    message_type: &'static str,
    signing_algorithm: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SignResponse {
    signature: String,
}

#[derive(Deserialize)]
struct KmsErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

/// AWS KMS over HTTPS.
pub struct AwsKmsClient {
    http: reqwest::Client,
    credentials: Credentials,
    region: String,
    host: String,
    endpoint: String,
}

impl AwsKmsClient {
    pub fn new(credentials: Credentials, region: impl Into<String>) -> Self {
        let region = region.into();
        let host = format!("kms.{region}.amazonaws.com");
        Self {
            http: reqwest::Client::new(),
            credentials,
            endpoint: format!("https://{host}/"),
            host,
            region,
        }
    }

    /// Credentials from the standard `AWS_*` variables.
    pub fn from_env(region: impl Into<String>) -> Result<Self, SignerError> {
        Ok(Self::new(Credentials::from_env()?, region))
    }

    async fn call<Req, Resp>(&self, target: &str, request: &Req) -> Result<Resp, SignerError>
    where
        Req: Serialize + Sync,
        Resp: for<'de> Deserialize<'de>,
    {
        let body =
            serde_json::to_vec(request).map_err(|e| SignerError::Kms(format!("encode: {e}")))?;
        let target = format!("TrentService.{target}");
        let headers = [("content-type", CONTENT_TYPE), ("x-amz-target", target.as_str())];

        let scope = SigningScope {
            credentials: &self.credentials,
            region: &self.region,
            service: SERVICE,
            time: Utc::now(),
        };
        let auth = sigv4::sign(
            &scope,
            &UnsignedRequest {
                method: "POST",
                host: &self.host,
                path: "/",
                headers: &headers,
                body: &body,
            },
        )?;

        let mut builder = self.http.post(&self.endpoint);
        for (name, value) in headers.iter() {
            builder = builder.header(*name, *value);
        }
        for (name, value) in auth {
            builder = builder.header(name, value);
        }

        debug!("[rn-02] KMS {}", target);
        let response = builder.body(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<KmsErrorBody>(&bytes)
                .map(|e| format!("{}: {}", e.kind, e.message))
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
            return Err(SignerError::Kms(format!("{target} returned {status}: {detail}")));
        }
        serde_json::from_slice(&bytes).map_err(|e| SignerError::Kms(format!("decode: {e}")))
    }
}

fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>, SignerError> {
    BASE64
        .decode(value)
        .map_err(|e| SignerError::Kms(format!("{field} is not base64: {e}")))
}

#[async_trait]
impl KmsClient for AwsKmsClient {
    async fn public_key(&self, key_id: &str) -> Result<Vec<u8>, SignerError> {
        let response: GetPublicKeyResponse = self
            .call("GetPublicKey", &GetPublicKeyRequest { key_id })
            .await?;
        decode_base64("PublicKey", &response.public_key)
    }

    async fn sign_digest(&self, key_id: &str, digest: &Hash) -> Result<Vec<u8>, SignerError> {
        let request = SignRequest {
            key_id,
            message: BASE64.encode(digest),
            message_type: "DIGEST",
            signing_algorithm: "ECDSA_SHA_256",
        };
        let response: SignResponse = self.call("Sign", &request).await?;
        decode_base64("Signature", &response.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_request_wire_shape() {
        let request = SignRequest {
            key_id: "alias/claimer",
            message: BASE64.encode([0u8; 32]),
            message_type: "DIGEST",
            signing_algorithm: "ECDSA_SHA_256",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["KeyId"], "alias/claimer");
        assert_eq!(json["MessageType"], "DIGEST");
        assert_eq!(json["SigningAlgorithm"], "ECDSA_SHA_256");
        assert_eq!(
            json["Message"],
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
        );
    }

    #[test]
    fn test_regional_endpoint() {
        let client = AwsKmsClient::new(
            Credentials {
                access_key_id: "id".into(),
                secret_access_key: "secret".into(),
                session_token: None,
            },
            "eu-central-1",
        );
        assert_eq!(client.endpoint, "https://kms.eu-central-1.amazonaws.com/");
    }

    #[test]
    fn test_error_body_is_parsed() {
        let body = br#"{"__type":"NotFoundException","message":"Key not found"}"#;
        let parsed: KmsErrorBody = serde_json::from_slice(body).unwrap();
        assert_eq!(parsed.kind, "NotFoundException");
        assert_eq!(parsed.message, "Key not found");
    }
}
