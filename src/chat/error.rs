// src/chat/error.rs
//
// Typed errors for the chat transport. Command-surface functions speak
// Result<_, String>; use `.map_err(String::from)` at that boundary.

use std::fmt;

/// Error raised by the chat transport or codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatError {
    /// The transport failed to open. The selection stays set; the channel
    /// stays absent until the next selection event.
    Connection { endpoint: String, detail: String },
    /// The transport did not respond within the configured window.
    Timeout { endpoint: String, action: String },
    /// The peer violated the framing protocol.
    Protocol { detail: String },
    /// An inbound payload could not be decoded into a message. Non-fatal:
    /// the payload is dropped, the log is untouched.
    Decode { detail: String },
}

impl ChatError {
    pub fn connection(endpoint: &str, detail: impl Into<String>) -> Self {
        Self::Connection {
            endpoint: endpoint.to_string(),
            detail: detail.into(),
        }
    }

    pub fn timeout(endpoint: &str, action: &str) -> Self {
        Self::Timeout {
            endpoint: endpoint.to_string(),
            action: action.to_string(),
        }
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }

    pub fn decode(detail: impl Into<String>) -> Self {
        Self::Decode {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection { endpoint, detail } => {
                write!(f, "connection to {} failed: {}", endpoint, detail)
            }
            Self::Timeout { endpoint, action } => {
                write!(f, "{} timed out waiting for {}", endpoint, action)
            }
            Self::Protocol { detail } => write!(f, "protocol error: {}", detail),
            Self::Decode { detail } => write!(f, "decode error: {}", detail),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<ChatError> for String {
    fn from(err: ChatError) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_endpoint() {
        let err = ChatError::connection("ws://localhost:8080/ws-chat/websocket", "refused");
        let msg: String = err.into();
        assert!(msg.contains("ws://localhost:8080/ws-chat/websocket"));
        assert!(msg.contains("refused"));
    }

    #[test]
    fn test_timeout_display() {
        let err = ChatError::timeout("ws://x:1", "connect");
        assert_eq!(err.to_string(), "ws://x:1 timed out waiting for connect");
    }
}
