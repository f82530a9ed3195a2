//! Key-set error types.
//!
//! This module defines the errors that can occur while fetching, decoding and
//! trial-verifying against a provider's published key set.
//!
//! # Error Types
//!
//! - [`JwksError::Transport`] - The key-set source could not be reached
//! - [`JwksError::Decode`] - A key-set body was present but malformed
//! - [`JwksError::NoValidKey`] - No key in the set verified the token
//! - [`JwksError::EmptyKeySet`] - Verification was attempted with zero keys
//!
//! The cache layer introduces no error kinds of its own: a failed upstream
//! fetch reaches the caller exactly as the source produced it.

use std::sync::Arc;

use thiserror::Error;

/// A shared error type for source chain tracking.
///
/// Stored behind an [`Arc`] so that [`JwksError`] stays [`Clone`]: when
/// several callers wait on one coalesced fetch, each receives the same error.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for key-set operations.
pub type Result<T> = std::result::Result<T, JwksError>;

/// Errors raised by key sources, the key-set cache and signature resolution.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` — new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum JwksError {
    /// Network, HTTP or object-store failure while reaching the source.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
        /// HTTP status code, when the failure was a non-success response.
        status: Option<u16>,
        /// The underlying error that caused the failure.
        #[source]
        source: Option<BoxError>,
    },

    /// A key-set body was present but is not a valid key-set document.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decoding failure.
        message: String,
        /// The underlying parser error.
        #[source]
        source: Option<BoxError>,
    },

    /// The source identifier cannot be used by this source variant.
    #[error("Invalid source identifier '{source_id}': {reason}")]
    InvalidSourceId {
        /// The rejected identifier.
        source_id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Verification was attempted against a key set with no keys.
    #[error("Key set is empty")]
    EmptyKeySet,

    /// No key in the set verified the token.
    ///
    /// Only the last per-key failure is kept; earlier failures are logged at
    /// `trace` level while the trial runs.
    #[error("No valid key among {attempted} candidate(s): {last}")]
    NoValidKey {
        /// Number of keys that were tried.
        attempted: usize,
        /// The failure reported for the last key tried.
        #[source]
        last: Box<JwksError>,
    },

    /// A single key failed to verify the token.
    #[error("Verification failed for key {}: {message}", .kid.as_deref().unwrap_or("<no kid>"))]
    Verification {
        /// Identifier of the key that was tried, if it declares one.
        kid: Option<String>,
        /// Description of the failure.
        message: String,
    },

    /// The token's algorithm is not accepted.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The key declares an algorithm that differs from the token header.
    #[error(
        "Key {} declares {key_alg}, token uses {token_alg}",
        .kid.as_deref().unwrap_or("<no kid>")
    )]
    AlgorithmMismatch {
        /// Identifier of the key, if it declares one.
        kid: Option<String>,
        /// Algorithm declared by the key.
        key_alg: String,
        /// Algorithm named in the token header.
        token_alg: String,
    },

    /// The verified payload could not be decoded into the requested claims.
    #[error("Invalid claims: {0}")]
    InvalidClaims(String),

    /// The token's expiry has passed, skew included.
    #[error("Token expired")]
    TokenExpired,

    /// The token was issued by an unexpected issuer.
    #[error("Invalid issuer: {0}")]
    InvalidIssuer(String),

    /// The token is not addressed to the expected audience.
    #[error("Invalid audience: {0}")]
    InvalidAudience(String),
}

impl JwksError {
    /// Creates a new `Transport` error with the given message.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into(), status: None, source: None }
    }

    /// Creates a new `Transport` error with a message and source error.
    #[must_use]
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport { message: message.into(), status: None, source: Some(Arc::new(source)) }
    }

    /// Creates a new `Transport` error for a non-success HTTP status.
    #[must_use]
    pub fn http_status(status: u16) -> Self {
        Self::Transport {
            message: format!("key set endpoint returned HTTP {status}"),
            status: Some(status),
            source: None,
        }
    }

    /// Creates a new `Decode` error with the given message.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode { message: message.into(), source: None }
    }

    /// Creates a new `Decode` error with a message and source error.
    #[must_use]
    pub fn decode_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Decode { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `InvalidSourceId` error.
    #[must_use]
    pub fn invalid_source_id(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSourceId { source_id: source_id.into(), reason: reason.into() }
    }

    /// Creates a new `NoValidKey` error wrapping the last per-key failure.
    #[must_use]
    pub fn no_valid_key(attempted: usize, last: JwksError) -> Self {
        Self::NoValidKey { attempted, last: Box::new(last) }
    }

    /// Creates a new `Verification` error for the key with the given id.
    #[must_use]
    pub fn verification(kid: Option<&str>, message: impl Into<String>) -> Self {
        Self::Verification { kid: kid.map(str::to_owned), message: message.into() }
    }

    /// Creates a new `UnsupportedAlgorithm` error.
    #[must_use]
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(message.into())
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims(message.into())
    }

    /// Returns `true` for failures reaching the source (as opposed to bad content).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<reqwest::Error> for JwksError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let message = if err.is_timeout() {
            "request to key set endpoint timed out".to_owned()
        } else if err.is_connect() {
            "failed to connect to key set endpoint".to_owned()
        } else {
            "failed to fetch key set".to_owned()
        };
        Self::Transport { message, status, source: Some(Arc::new(err)) }
    }
}
