//! Wire protocol between the script-side bridge and the host.
//!
//! Messages flow in both directions over a textual channel, one logical
//! message at a time per direction:
//! - **Script -> host**: a [`Request`] carrying a fresh `requestId` plus a
//!   GET/SET/INVOKE body. The host replies asynchronously, possibly out of
//!   order, with a `response` message for the same `requestId`.
//! - **Host -> script**: an [`Inbound`] message — a correlated response, an
//!   uncorrelated event push, or one of the `define*` structural commands
//!   used during object setup.
//!
//! Field names are wire-exact (`requestId`, `newValue`, camelCase payloads);
//! hosts in other languages depend on them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use webbridge_common::{ObjectId, ProtocolError, RequestId};

/// Name of the reserved event the host uses to push property changes
/// without a prior GET. Consuming it is mandatory bridge behavior.
pub const PROPERTY_UPDATED: &str = "propertyUpdated";

/// Message kinds the script side can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Get,
    Set,
    Invoke,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Set => write!(f, "SET"),
            Self::Invoke => write!(f, "INVOKE"),
        }
    }
}

/// A request sent from the script side to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    #[serde(flatten)]
    pub body: RequestBody,
}

/// The three request bodies. Every body names the target object by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RequestBody {
    /// Read a property. The response carries the resolved value.
    #[serde(rename = "GET")]
    Get { id: ObjectId, property: String },

    /// Write a property. The response is an acknowledgment (value or null).
    #[serde(rename = "SET")]
    Set {
        id: ObjectId,
        property: String,
        #[serde(rename = "newValue")]
        new_value: Value,
    },

    /// Call a function with an ordered argument list. The response carries
    /// the return value.
    #[serde(rename = "INVOKE")]
    Invoke {
        id: ObjectId,
        function: String,
        arguments: Vec<Value>,
    },
}

impl RequestBody {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Get { .. } => RequestKind::Get,
            Self::Set { .. } => RequestKind::Set,
            Self::Invoke { .. } => RequestKind::Invoke,
        }
    }

    /// The cache slot this request refreshes once its response arrives.
    /// Only GET responses are folded into the property cache.
    pub fn cache_target(&self) -> Option<(ObjectId, String)> {
        match self {
            Self::Get { id, property } => Some((id.clone(), property.clone())),
            _ => None,
        }
    }
}

impl Request {
    pub fn to_wire(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn from_wire(raw: &str) -> Result<Self, ProtocolError> {
        decode_with_kind_check(raw, &["GET", "SET", "INVOKE"])
    }
}

/// A message delivered from the host to the script side.
///
/// Responses, events, and define commands are conceptually separate channels
/// multiplexed over the same ordered delivery point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    /// Completion of a prior [`Request`], matched strictly by `requestId`.
    Response {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(flatten)]
        outcome: ResponseOutcome,
    },

    /// Uncorrelated event push. `data` is event-specific.
    Event { event: String, data: Value },

    /// Bind object `id` at the dotted `path`. Setup-phase command.
    DefineObject { path: String, id: ObjectId },

    /// Declare a callable member on a registered object.
    DefineFunction { id: ObjectId, name: String },

    /// Declare a cached property on a registered object.
    DefineProperty { id: ObjectId, name: String },
}

/// Result half of a response. A success always carries a `value` field
/// (null for void acknowledgments); a failure carries `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseOutcome {
    Err { error: String },
    Ok { value: Value },
}

impl Inbound {
    pub fn to_wire(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn from_wire(raw: &str) -> Result<Self, ProtocolError> {
        decode_with_kind_check(
            raw,
            &[
                "response",
                "event",
                "defineObject",
                "defineFunction",
                "defineProperty",
            ],
        )
    }

    /// Shorthand for a successful response.
    pub fn ok(request_id: RequestId, value: Value) -> Self {
        Self::Response {
            request_id,
            outcome: ResponseOutcome::Ok { value },
        }
    }

    /// Shorthand for a host-reported failure.
    pub fn err(request_id: RequestId, error: impl Into<String>) -> Self {
        Self::Response {
            request_id,
            outcome: ResponseOutcome::Err {
                error: error.into(),
            },
        }
    }

    /// Shorthand for an event push.
    pub fn event(event: impl Into<String>, data: Value) -> Self {
        Self::Event {
            event: event.into(),
            data,
        }
    }
}

/// Payload of the built-in `propertyUpdated` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyUpdate {
    pub object_id: ObjectId,
    pub property: String,
    pub value: Value,
}

/// Decode a tagged message, distinguishing an unknown `type` tag from a
/// message that is structurally broken.
fn decode_with_kind_check<T: serde::de::DeserializeOwned>(
    raw: &str,
    known_kinds: &[&str],
) -> Result<T, ProtocolError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("missing message type".into()))?
        .to_string();
    if !known_kinds.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownKind(kind));
    }
    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
}
