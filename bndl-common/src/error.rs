use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::descriptor::{Category, DescriptorType};

/// The `(type, category, locator)` tuple an error originated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorTag {
    pub descriptor_type: DescriptorType,
    pub category: Category,
    pub locator: String,
}

impl fmt::Display for DescriptorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} '{}'",
            self.descriptor_type, self.category, self.locator
        )
    }
}

/// Why a transport could not be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    Unreachable,
    ExecutableMissing,
    CredentialsRejected,
    Disabled,
    NotConfigured,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unreachable => "remote unreachable",
            Self::ExecutableMissing => "required executable missing",
            Self::CredentialsRejected => "credentials rejected",
            Self::Disabled => "access disabled",
            Self::NotConfigured => "transport not configured",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone)]
pub enum BndlError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("TOML Parsing Error: {0}")]
    Toml(#[from] Arc<toml::de::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Invalid descriptor '{representation}': {message}")]
    InvalidRepresentation {
        representation: String,
        message: String,
    },

    #[error("Unsupported operation for {descriptor}: {message}")]
    UnsupportedOperation {
        descriptor: DescriptorTag,
        message: String,
    },

    #[error("Transport unavailable for {descriptor} ({reason}): {message}")]
    TransportUnavailable {
        descriptor: DescriptorTag,
        reason: UnavailableReason,
        message: String,
    },

    #[error("Timed out resolving {descriptor}: {message}")]
    Timeout {
        descriptor: DescriptorTag,
        message: String,
    },

    #[error("Not found: {descriptor}: {message}")]
    NotFound {
        descriptor: DescriptorTag,
        message: String,
    },

    #[error("Missing payload for {descriptor} at {}", .path.display())]
    MissingPayload {
        descriptor: DescriptorTag,
        path: PathBuf,
    },

    #[error("Cache write failed for {descriptor}: {message}")]
    CacheWriteFailed {
        descriptor: DescriptorTag,
        message: String,
    },

    #[error("Checksum Mismatch for {descriptor}: {message}")]
    ChecksumMismatch {
        descriptor: DescriptorTag,
        message: String,
    },

    #[error("Dependency cycle: {}", .chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    #[error("Invalid manifest {}: {message}", .path.display())]
    InvalidManifest { path: PathBuf, message: String },
}

impl From<std::io::Error> for BndlError {
    fn from(err: std::io::Error) -> Self {
        BndlError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for BndlError {
    fn from(err: reqwest::Error) -> Self {
        BndlError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for BndlError {
    fn from(err: serde_json::Error) -> Self {
        BndlError::Json(Arc::new(err))
    }
}

impl From<toml::de::Error> for BndlError {
    fn from(err: toml::de::Error) -> Self {
        BndlError::Toml(Arc::new(err))
    }
}

impl BndlError {
    pub fn invalid(representation: impl Into<String>, message: impl Into<String>) -> Self {
        BndlError::InvalidRepresentation {
            representation: representation.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(descriptor: DescriptorTag, message: impl Into<String>) -> Self {
        BndlError::UnsupportedOperation {
            descriptor,
            message: message.into(),
        }
    }

    pub fn cache_write(descriptor: DescriptorTag, message: impl Into<String>) -> Self {
        BndlError::CacheWriteFailed {
            descriptor,
            message: message.into(),
        }
    }

    /// The descriptor this error is about, when it is known.
    pub fn descriptor(&self) -> Option<&DescriptorTag> {
        match self {
            BndlError::UnsupportedOperation { descriptor, .. }
            | BndlError::TransportUnavailable { descriptor, .. }
            | BndlError::Timeout { descriptor, .. }
            | BndlError::NotFound { descriptor, .. }
            | BndlError::MissingPayload { descriptor, .. }
            | BndlError::CacheWriteFailed { descriptor, .. }
            | BndlError::ChecksumMismatch { descriptor, .. } => Some(descriptor),
            _ => None,
        }
    }

    /// Whether a caller may reasonably try the same request again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BndlError::TransportUnavailable {
                reason: UnavailableReason::Unreachable,
                ..
            } | BndlError::Timeout { .. }
        )
    }
}

/// Classification of a failure raised below the descriptor layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unavailable(UnavailableReason),
    NotFound,
    Timeout,
    Corrupt,
    LocalIo,
}

/// Failure reported by a transport collaborator (HTTP client, git backend,
/// entity store). It has no descriptor context yet; adapters attach it with
/// [`TransportFailure::into_error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportFailure {}

impl TransportFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(
            FailureKind::Unavailable(UnavailableReason::Unreachable),
            message,
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Corrupt, message)
    }

    pub fn local_io(message: impl Into<String>) -> Self {
        Self::new(FailureKind::LocalIo, message)
    }

    pub fn into_error(self, descriptor: DescriptorTag) -> BndlError {
        let message = self.message;
        match self.kind {
            FailureKind::Unavailable(reason) => BndlError::TransportUnavailable {
                descriptor,
                reason,
                message,
            },
            FailureKind::NotFound => BndlError::NotFound {
                descriptor,
                message,
            },
            FailureKind::Timeout => BndlError::Timeout {
                descriptor,
                message,
            },
            FailureKind::Corrupt => BndlError::ChecksumMismatch {
                descriptor,
                message,
            },
            FailureKind::LocalIo => BndlError::CacheWriteFailed {
                descriptor,
                message,
            },
        }
    }
}

impl From<std::io::Error> for TransportFailure {
    fn from(err: std::io::Error) -> Self {
        TransportFailure::local_io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BndlError>;
