use serde::{Deserialize, Serialize};

/// A control request: one command line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Request {
    /// Command text, parsed by the server with [`crate::Command::parse`].
    pub command: String,
}

impl Request {
    /// Builds a request from a command word and its arguments.
    #[must_use]
    pub fn new(command: &str, args: &[&str]) -> Self {
        let mut text = command.to_owned();
        for arg in args {
            text.push(' ');
            text.push_str(arg);
        }
        Self { command: text }
    }
}

/// The single reply sent for a request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    /// The command completed; `text` is its human-readable output.
    Reply {
        /// Reply text.
        text: String,
    },
    /// The command failed.
    Error {
        /// Failure description.
        message: String,
    },
}

impl Reply {
    /// Successful reply.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Reply { text: text.into() }
    }

    /// Failed reply.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_joins_arguments() {
        assert_eq!(Request::new("telinit", &["3"]).command, "telinit 3");
        assert_eq!(Request::new("status", &[]).command, "status");
    }

    #[test]
    fn reply_is_tagged_by_kind() {
        let encoded = serde_json::to_string(&Reply::error("boom")).expect("encode reply");
        assert_eq!(encoded, r#"{"kind":"error","message":"boom"}"#);
    }
}
