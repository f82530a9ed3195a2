//! # OIDC key-set verification
//!
//! Validates identity tokens issued by an external OpenID Connect provider
//! against the provider's published signing keys (JWKS).
//!
//! This crate provides:
//! - **Key sources**: fetch a key-set document over HTTP, from object storage,
//!   or from an in-memory buffer
//! - **Key-set cache**: time-bounded memoization with single-flight misses and
//!   a background sweep
//! - **Signature resolution**: trial verification of a token against every key
//!   in provider order
//! - **Expiry check**: `exp` comparison with clock-skew tolerance
//!
//! ## Pipeline
//!
//! ```text
//! source_id ─► KeySetCache ──miss──► KeySource (http | object store | memory)
//!                  │ hit                  │
//!                  ▼                      ▼
//!               KeySet ◄──────────── FetchResult { keys, ttl }
//!                  │
//! token ──────► SignatureResolver ─► Verified { claims, key }
//!                                         │
//!                                         ▼
//!                                 expiry::is_valid(now, skew, exp)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use oidc_jwkset::{
//!     CacheConfig, HttpSourceConfig, IdTokenClaims, KeySetCache, SignatureResolver,
//!     expiry::{DEFAULT_SKEW, is_valid},
//!     source::HttpKeySource,
//! };
//!
//! # async fn example(id_token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let source = HttpKeySource::from_config(&HttpSourceConfig::default())?;
//! let cache = KeySetCache::new(source, CacheConfig::default())?;
//!
//! let fetched = cache.fetch("https://www.googleapis.com/oauth2/v3/certs").await?;
//! let verified = SignatureResolver::new().verify::<IdTokenClaims>(id_token, &fetched.keys)?;
//!
//! if !is_valid(chrono::Utc::now(), DEFAULT_SKEW, verified.claims.exp) {
//!     return Err("token expired".into());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Time-bounded key-set cache.
pub mod cache;
/// OpenID Connect claim set.
pub mod claims;
/// Cache and HTTP source configuration.
pub mod config;
/// Error types.
pub mod error;
/// Expiry check with skew.
pub mod expiry;
/// Key, key set and document decoding.
pub mod key_set;
/// Trial signature verification.
pub mod resolver;
/// Key sources.
pub mod source;
/// CSRF state values.
pub mod state;
/// Shared test utilities (feature-gated).
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
/// End-to-end ID token verification.
pub mod token;
/// Algorithm policy.
pub mod validation;

// Re-export key types for convenience
pub use cache::{CacheEntry, KeySetCache};
pub use claims::{Audience, IdTokenClaims};
pub use config::{CacheConfig, CacheConfigBuilder, ConfigError, HttpSourceConfig};
pub use error::{JwksError, Result};
pub use key_set::{FetchResult, Key, KeySet, decode_key_set};
pub use resolver::{JwsVerifier, SignatureResolver, SignatureVerifier, Verified};
pub use source::KeySource;
pub use state::state_token;
pub use token::{ExpectedClaims, verify_id_token};
