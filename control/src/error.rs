use thiserror::Error;

/// Errors raised at the boundary (configuration and object decoding)
///
/// The stores, listers and synthesizer never fail; missing keys are
/// `None`/`false` and malformed CIDR data is skipped.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid {kind} {name}: {reason}")]
    InvalidObject {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StateError {
    pub(crate) fn invalid(kind: &'static str, name: &str, reason: impl Into<String>) -> Self {
        StateError::InvalidObject {
            kind,
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
