//! JSON envelope exchanged between the gateway and its providers.
//!
//! Every stream frame on the provider link carries one [`Envelope`]:
//!
//! ```text
//! {"id": "<correlation id>", "type": 0 | 1, "action": "<route>", "data": "<json text>"}
//! ```
//!
//! `data` is itself JSON text whose shape depends on `action`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::codec::Outbound;

/// Action a provider sends to register its routes.
pub const ACTION_REGISTER: &str = "registe_service_provider";
/// Heartbeat request action.
pub const ACTION_PING: &str = "ping";
/// Heartbeat answer action.
pub const ACTION_PONG: &str = "pong";
/// `data` of a successful registration response.
pub const REGISTER_OK: &str = "success.";

/// Errors raised while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The envelope or its data was not valid JSON of the expected shape.
    #[error("invalid envelope json: {0}")]
    Json(#[from] serde_json::Error),

    /// The `type` field held an unknown discriminant.
    #[error("unknown envelope type: {0}")]
    UnknownType(u8),
}

/// Direction of an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EnvelopeType {
    /// Sent by whoever starts an exchange.
    Request,
    /// Answer to a request, carrying the request's `id`.
    Response,
}

impl From<EnvelopeType> for u8 {
    fn from(kind: EnvelopeType) -> Self {
        match kind {
            EnvelopeType::Request => 0,
            EnvelopeType::Response => 1,
        }
    }
}

impl TryFrom<u8> for EnvelopeType {
    type Error = EnvelopeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Request),
            1 => Ok(Self::Response),
            other => Err(EnvelopeError::UnknownType(other)),
        }
    }
}

/// One gateway message.
///
/// ```
/// use wiregate::envelope::{Envelope, EnvelopeType};
///
/// let env = Envelope::request("10.0.0.1:5000", "/api/user_name", r#"{"id":1}"#);
/// let json = env.to_json().expect("encode");
/// assert_eq!(
///     json,
///     r#"{"id":"10.0.0.1:5000","type":0,"action":"/api/user_name","data":"{\"id\":1}"}"#
/// );
/// let back = Envelope::from_slice(json.as_bytes()).expect("decode");
/// assert_eq!(back.kind, EnvelopeType::Request);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id, conventionally the external peer's address.
    pub id: String,
    /// Request or response.
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    /// Route or reserved action name.
    pub action: String,
    /// Action-specific JSON text.
    #[serde(default)]
    pub data: String,
}

impl Envelope {
    /// Build a request.
    #[must_use]
    pub fn request(id: impl Into<String>, action: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: EnvelopeType::Request,
            action: action.into(),
            data: data.into(),
        }
    }

    /// Build a response.
    #[must_use]
    pub fn response(id: impl Into<String>, action: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeType::Response,
            ..Self::request(id, action, data)
        }
    }

    /// Heartbeat request for the provider at `addr`, stamped with the current
    /// Unix time in seconds.
    #[must_use]
    pub fn ping(addr: impl Into<String>) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self::request(addr, ACTION_PING, now.to_string())
    }

    /// Turn a request into its response, keeping `id` and `action`.
    #[must_use]
    pub fn into_response(self, data: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeType::Response,
            data: data.into(),
            ..self
        }
    }

    /// Whether this envelope belongs to the heartbeat exchange.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool { self.action == ACTION_PING || self.action == ACTION_PONG }

    /// Serialise to JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Json`] if serialisation fails.
    pub fn to_json(&self) -> Result<String, EnvelopeError> { Ok(serde_json::to_string(self)?) }

    /// Parse from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] for malformed JSON or an unknown `type`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EnvelopeError> { Ok(serde_json::from_slice(bytes)?) }

    /// Serialise into a stream payload.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Json`] if serialisation fails.
    pub fn to_outbound(&self) -> Result<Outbound, EnvelopeError> { Ok(Outbound::payload(self.to_json()?)) }

    /// Parse `data` as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Json`] if `data` does not match `T`.
    pub fn parse_data<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        Ok(serde_json::from_str(&self.data)?)
    }
}

/// `data` of a registration request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProvider {
    /// Provider name, for logs.
    pub name: String,
    /// Routes the provider serves.
    #[serde(default)]
    pub route: Vec<String>,
}

/// Shape of `/api/user_name` data.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserName {
    /// User id.
    #[serde(default)]
    pub id: u64,
    /// Resolved name; empty for unknown ids.
    #[serde(default)]
    pub name: String,
}

/// Shape of `/api/user_level` data.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLevel {
    /// User id.
    #[serde(default)]
    pub id: u64,
    /// Resolved level; zero for unknown ids.
    #[serde(default)]
    pub level: u8,
}
