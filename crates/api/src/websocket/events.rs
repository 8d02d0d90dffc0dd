//! WebSocket envelope types and serialization
//!
//! Every frame is a JSON object with a `type` discriminator. The relay only
//! inspects `type` (and `message` for chat); all other fields are carried
//! through untouched so SDP and ICE payloads reach the peer exactly as sent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Message Types
// =============================================================================

/// Known values of the `type` discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Offer,
    Answer,
    IceCandidate,
    Chat,
    ParticipantJoined,
    ParticipantLeft,
    NoParticipant,
}

impl MessageType {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "offer" => Some(Self::Offer),
            "answer" => Some(Self::Answer),
            "ice-candidate" => Some(Self::IceCandidate),
            "chat" => Some(Self::Chat),
            "participant-joined" => Some(Self::ParticipantJoined),
            "participant-left" => Some(Self::ParticipantLeft),
            "no-participant" => Some(Self::NoParticipant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
            Self::Chat => "chat",
            Self::ParticipantJoined => "participant-joined",
            Self::ParticipantLeft => "participant-left",
            Self::NoParticipant => "no-participant",
        }
    }

    /// WebRTC negotiation messages relayed without persistence
    pub fn is_signaling(&self) -> bool {
        matches!(self, Self::Offer | Self::Answer | Self::IceCandidate)
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// A decoded wire frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    #[serde(rename = "type")]
    kind: String,

    /// Everything except `type`, in arrival order
    #[serde(flatten)]
    fields: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Frame is not valid UTF-8")]
    NotUtf8,
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl SignalEnvelope {
    fn relay(kind: MessageType, fields: Map<String, Value>) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            fields,
        }
    }

    /// `{"type":"participant-joined","userId":...}`
    pub fn participant_joined(user_id: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("userId".to_string(), Value::String(user_id.to_string()));
        Self::relay(MessageType::ParticipantJoined, fields)
    }

    /// `{"type":"participant-left","userId":...}`
    pub fn participant_left(user_id: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("userId".to_string(), Value::String(user_id.to_string()));
        Self::relay(MessageType::ParticipantLeft, fields)
    }

    /// `{"type":"no-participant"}`
    pub fn no_participant() -> Self {
        Self::relay(MessageType::NoParticipant, Map::new())
    }

    /// Decode a text frame. Any JSON object with a string `type` is accepted.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Decode a binary frame by reading its bytes as UTF-8 text
    pub fn decode_bytes(raw: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(raw).map_err(|_| DecodeError::NotUtf8)?;
        Self::decode(text)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Raw `type` string as received
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Parsed `type`, `None` for values this relay does not know
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_wire(&self.kind)
    }

    /// The `message` payload of a chat frame; absent payloads persist as `null`
    pub fn chat_payload(&self) -> Value {
        self.fields.get("message").cloned().unwrap_or(Value::Null)
    }
}
