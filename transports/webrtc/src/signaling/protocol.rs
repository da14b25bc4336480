//! Signaling wire protocol
//!
//! JSON text messages discriminated by a `type` field:
//!
//! | type            | direction       | payload                                   |
//! |-----------------|-----------------|-------------------------------------------|
//! | `offer`         | client → server | `{offer: {sdp, type}}`                    |
//! | `answer`        | server → client | `{answer: {sdp, type}}`                   |
//! | `ice-candidate` | both            | `{candidate: {candidate, sdpMid, sdpMLineIndex}}` |
//! | `roi-toggle`    | client → server | `{enabled}`                               |
//! | `numbers`       | server → client | `{data, timestamp, frame_count}`          |
//! | `error`         | server → client | `{message}`                               |

use crate::{Error, Result};
use dbmeter_core::ExtractionResult;
use serde::{Deserialize, Serialize};

/// Message types this server understands
pub const KNOWN_TYPES: [&str; 6] = [
    "offer",
    "answer",
    "ice-candidate",
    "roi-toggle",
    "numbers",
    "error",
];

/// Signaling message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingMessage {
    /// SDP offer from the browser
    Offer {
        /// Remote session description
        offer: SessionDescription,
    },

    /// SDP answer produced by the server
    Answer {
        /// Local session description
        answer: SessionDescription,
    },

    /// Trickled ICE candidate
    IceCandidate {
        /// Candidate payload
        candidate: IceCandidate,
    },

    /// Switch between ROI crop and whole-frame recognition
    RoiToggle {
        /// Missing means disabled
        #[serde(default)]
        enabled: bool,
    },

    /// Recognized readings for one frame
    Numbers {
        /// Validated numbers in first-seen order
        data: Vec<String>,
        /// Frame arrival time, seconds since the Unix epoch
        timestamp: f64,
        /// Frame counter of the processed frame
        frame_count: u64,
    },

    /// Error report to the client
    Error {
        /// Human-readable description
        message: String,
    },
}

/// Session description (`RTCSessionDescriptionInit` shape)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    /// SDP body
    pub sdp: String,

    /// `offer` or `answer`
    #[serde(rename = "type")]
    pub sdp_type: String,
}

impl SessionDescription {
    /// Description of an offer
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: "offer".to_string(),
        }
    }

    /// Description of an answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: "answer".to_string(),
        }
    }
}

/// ICE candidate (`RTCIceCandidateInit` shape)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceCandidate {
    /// Candidate line
    pub candidate: String,

    /// Media stream identification tag
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,

    /// Index of the m-line the candidate belongs to
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
}

/// A decoded inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A well-formed message of a known type
    Message(SignalingMessage),
    /// Valid JSON with a `type` this server does not handle
    Unknown(String),
}

impl SignalingMessage {
    /// Message type tag as sent on the wire
    pub fn type_name(&self) -> &'static str {
        match self {
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::IceCandidate { .. } => "ice-candidate",
            SignalingMessage::RoiToggle { .. } => "roi-toggle",
            SignalingMessage::Numbers { .. } => "numbers",
            SignalingMessage::Error { .. } => "error",
        }
    }

    /// Error message for the client
    pub fn error(message: impl Into<String>) -> Self {
        SignalingMessage::Error {
            message: message.into(),
        }
    }

    /// Serialize to JSON text
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<ExtractionResult> for SignalingMessage {
    fn from(result: ExtractionResult) -> Self {
        SignalingMessage::Numbers {
            data: result.values,
            timestamp: result.timestamp,
            frame_count: result.frame_count,
        }
    }
}

/// Decode one text frame
///
/// # Errors
///
/// Returns `Error::Protocol` if the text is not a JSON object with a string
/// `type`, or if a known type carries a malformed payload. Unknown types are
/// not an error.
pub fn decode(text: &str) -> Result<Inbound> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::Protocol(format!("invalid JSON: {}", e)))?;

    let message_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| Error::Protocol("message has no string 'type' field".to_string()))?
        .to_string();

    if !KNOWN_TYPES.contains(&message_type.as_str()) {
        return Ok(Inbound::Unknown(message_type));
    }

    serde_json::from_value(value)
        .map(Inbound::Message)
        .map_err(|e| Error::Protocol(format!("malformed '{}' message: {}", message_type, e)))
}
