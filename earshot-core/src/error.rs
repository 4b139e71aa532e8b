//! Error taxonomy for the discovery and listen engine
//!
//! Each concern carries its own typed error with a stable code. Provider
//! failures inside discovery are recovered into trace entries; retrieval and
//! analysis failures are fatal only under `full_audio` mode.

use crate::models::Provider;
use thiserror::Error;

/// Common result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Discovery failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryErrorKind {
    /// No provider produced any candidate.
    NotFound,
    /// A search tool binary is not installed.
    ProviderBinaryMissing,
    /// Provider query failed (transport, non-success status, tool exit).
    ProviderQueryFailed,
    /// Provider returned a payload that could not be parsed.
    ProviderBadResponse,
    /// Required credentials are not configured.
    AuthMissing,
    /// Credentials were rejected.
    AuthFailed,
    /// Provider rate-limited the request.
    RateLimited,
}

impl DiscoveryErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            DiscoveryErrorKind::NotFound => "NOT_FOUND",
            DiscoveryErrorKind::ProviderBinaryMissing => "PROVIDER_BINARY_MISSING",
            DiscoveryErrorKind::ProviderQueryFailed => "PROVIDER_QUERY_FAILED",
            DiscoveryErrorKind::ProviderBadResponse => "PROVIDER_BAD_RESPONSE",
            DiscoveryErrorKind::AuthMissing => "AUTH_MISSING",
            DiscoveryErrorKind::AuthFailed => "AUTH_FAILED",
            DiscoveryErrorKind::RateLimited => "RATE_LIMITED",
        }
    }

    /// Stable short code used in provider trace entries.
    pub fn reason(&self) -> &'static str {
        match self {
            DiscoveryErrorKind::NotFound => "not_found",
            DiscoveryErrorKind::ProviderBinaryMissing => "missing_binary",
            DiscoveryErrorKind::ProviderQueryFailed => "query_failed",
            DiscoveryErrorKind::ProviderBadResponse => "bad_response",
            DiscoveryErrorKind::AuthMissing => "auth_missing",
            DiscoveryErrorKind::AuthFailed => "auth_failed",
            DiscoveryErrorKind::RateLimited => "rate_limited",
        }
    }
}

/// A typed, provider-scoped discovery error.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DiscoveryError {
    pub kind: DiscoveryErrorKind,
    pub provider: Option<Provider>,
    pub message: String,
}

impl DiscoveryError {
    pub fn new(kind: DiscoveryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            provider: None,
            message: message.into(),
        }
    }

    pub fn provider(kind: DiscoveryErrorKind, provider: Provider, message: impl Into<String>) -> Self {
        Self {
            kind,
            provider: Some(provider),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

/// Retrieval failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalErrorKind {
    /// No retrievable URL is available for the source.
    Unavailable,
    Timeout,
    /// Extraction tool is not installed.
    ToolMissing,
    /// Extraction tool ran and failed.
    ToolFailed,
    /// Tool completed but no audio artifact appeared on disk.
    NotProduced,
    /// Direct download returned a non-success status.
    HttpFailed,
    /// Direct download returned an empty body.
    EmptyContent,
}

impl RetrievalErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            RetrievalErrorKind::Unavailable => "UNAVAILABLE",
            RetrievalErrorKind::Timeout => "TIMEOUT",
            RetrievalErrorKind::ToolMissing => "TOOL_MISSING",
            RetrievalErrorKind::ToolFailed => "TOOL_FAILED",
            RetrievalErrorKind::NotProduced => "NOT_PRODUCED",
            RetrievalErrorKind::HttpFailed => "HTTP_FAILED",
            RetrievalErrorKind::EmptyContent => "EMPTY_CONTENT",
        }
    }
}

/// A typed audio retrieval error.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RetrievalError {
    pub kind: RetrievalErrorKind,
    pub message: String,
}

impl RetrievalError {
    pub fn new(kind: RetrievalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

/// Feature-analysis collaborator error. Treated as an opaque degrade signal
/// by the orchestrator.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AnalysisError {
    pub code: String,
    pub message: String,
}

impl AnalysisError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Descriptor collaborator error. Treated as an opaque degrade signal.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DescriptorError {
    pub code: String,
    pub message: String,
}

impl DescriptorError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Cache store error.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Top-level engine error, used at the CLI boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable code for the JSON error surface.
    pub fn code(&self) -> String {
        match self {
            Error::Discovery(err) => err.code().to_string(),
            Error::Retrieval(err) => err.code().to_string(),
            Error::Analysis(err) => err.code.clone(),
            Error::Descriptor(err) => err.code.clone(),
            Error::Cache(_) => "CACHE_FAILED".to_string(),
            Error::Config(_) => "CONFIG_INVALID".to_string(),
        }
    }
}
