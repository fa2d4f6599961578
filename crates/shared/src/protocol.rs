use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, ChannelKind};

/// Body of `GET /api`: the hub's current channel set, in render order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorResponse {
    pub commands: Vec<ChannelDescriptor>,
}

/// One channel as described by the hub.
///
/// `command` is the hub's encoded command string (`"CH1"` or `"CH1=ON"`);
/// only its left-hand side is interpreted, as the channel id. `description`
/// is free text for display and is otherwise ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub value: DescriptorValue,
}

impl ChannelDescriptor {
    /// Channel id: everything left of the first `=` in `command`.
    pub fn channel_id(&self) -> ChannelId {
        let id = self
            .command
            .split_once('=')
            .map(|(lhs, _)| lhs)
            .unwrap_or(self.command.as_str());
        ChannelId::new(id)
    }
}

/// Current value of a channel: a duty-cycle level for pwm channels, a
/// token string (`ON` / `OFF`) for digital ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DescriptorValue {
    Level(u8),
    Token(String),
}

impl DescriptorValue {
    pub fn as_reading(&self) -> String {
        match self {
            DescriptorValue::Level(level) => level.to_string(),
            DescriptorValue::Token(token) => token.clone(),
        }
    }

    pub fn level(&self) -> Option<u8> {
        match self {
            DescriptorValue::Level(level) => Some(*level),
            DescriptorValue::Token(token) => token.parse().ok(),
        }
    }
}

/// Outbound frame: `{"command": "<id>=<token>"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandFrame {
    pub command: String,
}

impl CommandFrame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

/// Inbound frame: `{"ack": "<id>=<value>"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckFrame {
    pub ack: String,
}

/// A decoded acknowledgement, split on the FIRST `=`.
///
/// The hub also sends bare acks without an `=` (`RESET`, `ERR`); those
/// decode to an empty value with the whole token as the channel id, which
/// matches no binding and is dropped downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub channel: ChannelId,
    pub value: String,
}

impl Ack {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('=') {
            Some((channel, value)) => Self {
                channel: ChannelId::new(channel),
                value: value.to_string(),
            },
            None => Self {
                channel: ChannelId::new(raw),
                value: String::new(),
            },
        }
    }
}

/// Classification of one inbound transport message.
///
/// "Not valid JSON" and "valid JSON that is not an ack envelope" are
/// deliberately distinct variants so the recovery policy for each can be
/// chosen (and tested) separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Ack(Ack),
    UnknownShape,
    Malformed,
}

pub fn classify_frame(raw: &str) -> InboundFrame {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => return InboundFrame::Malformed,
    };

    match value.get("ack").and_then(|ack| ack.as_str()) {
        Some(ack) => InboundFrame::Ack(Ack::parse(ack)),
        None => InboundFrame::UnknownShape,
    }
}
