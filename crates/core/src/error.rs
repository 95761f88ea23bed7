//! Error types for the DeepSearch domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them so callers can use a single `?` chain.

use thiserror::Error;

/// The top-level error type for all DeepSearch operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Generation errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Search errors ---
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Identity errors ---
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool unavailable: {tool_name}: {reason}")]
    Unavailable { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("Invalid search query: {0}")]
    InvalidQuery(String),

    #[error("Search unavailable: {0}")]
    Unavailable(String),

    #[error("Search cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("User not found: {0}")]
    UnknownUser(String),

    /// Carries no identifiers; the message must not reveal whether the
    /// conversation exists for another user.
    #[error("Permission denied for this conversation")]
    OwnershipViolation,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    Unauthorized,
}

impl From<SearchError> for ToolError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidQuery(reason) => ToolError::InvalidArguments(reason),
            other => ToolError::Unavailable {
                tool_name: "search".into(),
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn ownership_violation_is_generic() {
        let msg = StoreError::OwnershipViolation.to_string();
        assert_eq!(msg, "Permission denied for this conversation");
    }

    #[test]
    fn search_error_maps_to_tool_error() {
        let err: ToolError = SearchError::Cancelled.into();
        assert!(matches!(err, ToolError::Unavailable { .. }));

        let err: ToolError = SearchError::InvalidQuery("empty".into()).into();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
