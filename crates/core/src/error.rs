// crates/core/src/error.rs
use thiserror::Error;

/// Errors raised while decoding an inbound stream message.
///
/// These are protocol errors: the router logs and drops the message, the
/// channel stays up.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Malformed JSON: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },

    #[error("Message has neither a `type` nor a `status` discriminator")]
    MissingKind,

    #[error("Unknown message kind: {kind}")]
    UnknownKind { kind: String },

    #[error("Invalid `{kind}` payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Binary frame is not UTF-8 text")]
    NotText,
}

/// Errors raised by lifecycle transitions requested by the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("An upload cannot start while the monitor is {state}")]
    Busy { state: &'static str },
}

/// Errors that can occur when building the monitor configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid backend origin {value:?}: {source}")]
    InvalidOrigin {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unsupported backend scheme {scheme:?} (expected http or https)")]
    UnsupportedScheme { scheme: String },

    #[error("Invalid stream endpoint {value:?}: {source}")]
    InvalidStreamUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{var} must be a positive number of seconds, got {value:?}")]
    InvalidSeconds { var: &'static str, value: String },
}

impl MessageError {
    pub fn payload(kind: &'static str, source: serde_json::Error) -> Self {
        Self::Payload { kind, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind_message() {
        let err = MessageError::UnknownKind {
            kind: "progress".into(),
        };
        assert_eq!(err.to_string(), "Unknown message kind: progress");
    }

    #[test]
    fn test_busy_names_state() {
        let err = LifecycleError::Busy { state: "processing" };
        assert!(err.to_string().contains("processing"));
    }

    #[test]
    fn test_invalid_seconds_names_variable() {
        let err = ConfigError::InvalidSeconds {
            var: "CROWDWATCH_POLL_SECS",
            value: "soon".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("CROWDWATCH_POLL_SECS"));
        assert!(msg.contains("soon"));
    }
}
