//! WebSocket message protocol definitions.
//!
//! All messages are JSON objects tagged by `type`, in snake_case.

use serde::{Deserialize, Serialize};

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keep-alive ping.
    Ping,

    /// Ask for the current subscriber count.
    Count,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Current number of waitlist subscribers.
    Count { count: usize },

    /// Response to ping.
    Pong,

    /// Error message.
    Error { message: String },
}

impl ServerMessage {
    /// Create an error message.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_deserialization() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);

        let msg: ClientMessage = serde_json::from_str(r#"{"type": "count"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Count);

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type": "pull"}"#).is_err());
    }

    #[test]
    fn test_server_message_serialization() {
        let json = serde_json::to_string(&ServerMessage::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);

        let json = serde_json::to_string(&ServerMessage::Count { count: 3 }).unwrap();
        assert_eq!(json, r#"{"type":"count","count":3}"#);

        let json = serde_json::to_string(&ServerMessage::error("bad")).unwrap();
        assert_eq!(json, r#"{"type":"error","message":"bad"}"#);
    }
}
