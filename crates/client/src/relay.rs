use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Purpose of a relayed email, used for routing on the relay side and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MailKind {
    AdminNotification,
    ClientConfirmation,
}

impl MailKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AdminNotification => "admin_notification",
            Self::ClientConfirmation => "client_confirmation",
        }
    }
}

/// Plain-text email handed to the relay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayMessage {
    pub kind: MailKind,
    pub to: String,
    pub subject: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[derive(Debug, Serialize)]
struct SignedEnvelope<'a> {
    payload: &'a str,
    timestamp: i64,
    signature: &'a str,
}

#[derive(Debug, Deserialize)]
struct RelayAck {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the script-hosted email relay.
///
/// The relay cannot read request headers, so the signature travels in the
/// body next to the payload it covers.
#[derive(Clone)]
pub struct MailRelayClient {
    http: Client,
    endpoint: Url,
    secret: Arc<[u8]>,
}

impl MailRelayClient {
    pub fn new(endpoint: Url, secret: impl Into<Vec<u8>>, http: Client) -> Self {
        Self {
            http,
            endpoint,
            secret: Arc::from(secret.into().into_boxed_slice()),
        }
    }

    /// Signs and posts one message, failing unless the relay acknowledges it.
    pub async fn send(&self, message: &RelayMessage, now: DateTime<Utc>) -> Result<(), RelayError> {
        let payload = serde_json::to_string(message).map_err(RelayError::Encode)?;
        let timestamp = now.timestamp();
        let signature = sign_payload(&self.secret, timestamp, &payload);

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&SignedEnvelope {
                payload: &payload,
                timestamp,
                signature: &signature,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        if !status.is_success() {
            return Err(RelayError::Status { status, body });
        }

        let ack: RelayAck = serde_json::from_str(&body).map_err(RelayError::InvalidResponse)?;
        if !ack.ok {
            return Err(RelayError::Rejected(
                ack.error.unwrap_or_else(|| "unspecified".to_string()),
            ));
        }
        Ok(())
    }
}

/// Hex HMAC-SHA256 over `"{timestamp}.{payload}"`.
pub fn sign_payload(secret: &[u8], timestamp: i64, payload: &str) -> String {
    hex::encode(mac_bytes(secret, timestamp, payload))
}

/// Checks a hex signature produced by [`sign_payload`] in constant time.
pub fn verify_signature(secret: &[u8], timestamp: i64, payload: &str, provided: &str) -> bool {
    let Ok(provided_bytes) = hex::decode(provided) else {
        return false;
    };
    let expected = mac_bytes(secret, timestamp, payload);
    expected.as_slice().ct_eq(provided_bytes.as_slice()).into()
}

fn mac_bytes(secret: &[u8], timestamp: i64, payload: &str) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .unwrap_or_else(|_| unreachable!("hmac key length is unrestricted"));
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Errors produced by the mail relay client.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to encode relay payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("relay returned an unreadable acknowledgement: {0}")]
    InvalidResponse(#[source] serde_json::Error),
    #[error("relay rejected the message: {0}")]
    Rejected(String),
}
