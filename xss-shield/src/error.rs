use crate::policy::PolicyId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XssError {
    /// A layered decode step could not interpret its input.
    #[error("Decode failed ({stage}): {reason}")]
    Decode { stage: &'static str, reason: String },

    #[error("Sanitization failed under {policy} policy: {reason}")]
    SanitizationFailed { policy: PolicyId, reason: String },

    #[error("Override lookup failed for '{0}'")]
    OverrideLookup(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl XssError {
    pub(crate) fn decode(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::Decode {
            stage,
            reason: reason.into(),
        }
    }

    pub(crate) fn sanitization(policy: PolicyId, reason: impl Into<String>) -> Self {
        Self::SanitizationFailed {
            policy,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, XssError>;
