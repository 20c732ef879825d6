use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineError;
use crate::store::StoreError;

/// Flat classification of [`CocoError`], shared with peers on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Validation,
    Attribute,
    ProofVerification,
    UnknownVerificationKey,
    DuplicateIdentity,
    UnknownIdentity,
    Storage,
    Engine,
    Transport,
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Attribute => "attribute",
            Self::ProofVerification => "proof verification",
            Self::UnknownVerificationKey => "unknown verification key",
            Self::DuplicateIdentity => "duplicate identity",
            Self::UnknownIdentity => "unknown identity",
            Self::Storage => "storage",
            Self::Engine => "engine",
            Self::Transport => "transport",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum CocoError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("attribute `{attribute}` rejected: {reason}")]
    Attribute { attribute: &'static str, reason: String },

    #[error("proof verification failed for {what}")]
    ProofVerification { what: &'static str },

    #[error("verification keys do not match the stored keys")]
    VerificationKeyMismatch,

    #[error("verification key {0} is not in the global key registry")]
    UnknownVerificationKey(String),

    #[error("{what} already exists")]
    DuplicateIdentity { what: &'static str },

    #[error("{what} not found")]
    UnknownIdentity { what: &'static str },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote {kind} error: {message}")]
    Remote { kind: ErrorKind, message: String },
}

impl CocoError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Attribute { .. } => ErrorKind::Attribute,
            Self::ProofVerification { .. } | Self::VerificationKeyMismatch => {
                ErrorKind::ProofVerification
            }
            Self::UnknownVerificationKey(_) => ErrorKind::UnknownVerificationKey,
            Self::DuplicateIdentity { .. } => ErrorKind::DuplicateIdentity,
            Self::UnknownIdentity { .. } => ErrorKind::UnknownIdentity,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Engine(_) => ErrorKind::Engine,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Remote { kind, .. } => *kind,
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn attribute(attribute: &'static str, reason: impl Into<String>) -> Self {
        Self::Attribute {
            attribute,
            reason: reason.into(),
        }
    }
}

impl From<coco_primitives::HashError> for CocoError {
    fn from(e: coco_primitives::HashError) -> Self {
        Self::Engine(EngineError::Hash(e))
    }
}

impl From<serde_json::Error> for CocoError {
    fn from(e: serde_json::Error) -> Self {
        Self::invalid("json", e.to_string())
    }
}

pub type Result<T, E = CocoError> = core::result::Result<T, E>;

pub(crate) fn require_nonempty(field: &'static str, value: &[u8]) -> Result<()> {
    if value.is_empty() {
        return Err(CocoError::invalid(field, "missing"));
    }
    Ok(())
}

/// Log the outcome of a service operation at the RPC boundary.
pub(crate) fn traced<T>(role: &'static str, method: &'static str, result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => tracing::debug!(role, method, "accepted"),
        Err(e) => tracing::warn!(role, method, kind = %e.kind(), error = %e, "rejected"),
    }
    result
}
