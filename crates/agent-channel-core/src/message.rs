//! Message vocabulary exchanged with the agent.
//!
//! Outbound notifications are JSON object literals built by plain string
//! interpolation. Nothing is escaped: content containing `"` or control
//! characters produces text that is not valid JSON. Callers that pass
//! untrusted text must escape it themselves.
// TODO: JSON-escape the string fields (type, level, prefix, text, device id).

use std::fmt;

/// Literal the agent sends to acknowledge a connect.
pub const CONNECT_ACK: &[u8] = b"ok";

/// A notification sent to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundMessage<'a> {
    /// Application message; `content` is spliced in as raw JSON.
    Message {
        message_type: &'a str,
        content: &'a str,
    },
    /// Log line forwarded to the agent as `"<prefix>: <text>"`.
    Log {
        level: &'a str,
        prefix: &'a str,
        text: &'a str,
    },
    /// Cloud connector connection state.
    ConnectorState { connected: bool },
    /// Device registration state; a missing device id is sent as `""`.
    Registration {
        registered: bool,
        device_id: Option<&'a str>,
    },
}

impl fmt::Display for OutboundMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            OutboundMessage::Message {
                message_type,
                content,
            } => write!(
                f,
                r#"{{"type":"message","message":{{"messageType":"{message_type}","message":{content}}}}}"#
            ),
            OutboundMessage::Log {
                level,
                prefix,
                text,
            } => write!(
                f,
                r#"{{"type":"log","log":{{"level":"{level}","message":"{prefix}: {text}"}}}}"#
            ),
            OutboundMessage::ConnectorState { connected: true } => {
                f.write_str(r#"{"type":"connect"}"#)
            }
            OutboundMessage::ConnectorState { connected: false } => {
                f.write_str(r#"{"type":"disconnect"}"#)
            }
            OutboundMessage::Registration {
                registered,
                device_id,
            } => write!(
                f,
                r#"{{"type":"registration","registration":{{"registered":"{registered}","deviceId":"{}"}}}}"#,
                device_id.unwrap_or("")
            ),
        }
    }
}

/// A message received from the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// The connect acknowledgment `ok`.
    ConnectAck,
    /// Anything else, lossily decoded for logging.
    Unsupported(String),
}

impl InboundMessage {
    pub fn parse(frame: &[u8]) -> Self {
        if frame == CONNECT_ACK {
            InboundMessage::ConnectAck
        } else {
            InboundMessage::Unsupported(String::from_utf8_lossy(frame).into_owned())
        }
    }
}
