//! End-to-end ID token verification.
//!
//! Runs the full pipeline for one token: fetch the provider's keys, find the
//! key that signed the token, then check expiry with skew and, optionally,
//! the issuer and audience.
//!
//! # Example
//!
//! ```no_run
//! use oidc_jwkset::{
//!     CacheConfig, ExpectedClaims, HttpSourceConfig, KeySetCache, SignatureResolver,
//!     source::HttpKeySource, verify_id_token,
//! };
//!
//! # async fn example(id_token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let cache = KeySetCache::new(
//!     HttpKeySource::from_config(&HttpSourceConfig::default())?,
//!     CacheConfig::default(),
//! )?;
//! let expected = ExpectedClaims::default()
//!     .issuer("https://accounts.google.com")
//!     .audience("my-client-id.apps.googleusercontent.com");
//!
//! let verified = verify_id_token(
//!     id_token,
//!     "https://www.googleapis.com/oauth2/v3/certs",
//!     &cache,
//!     &SignatureResolver::new(),
//!     &expected,
//!     chrono::Utc::now(),
//! )
//! .await?;
//! println!("signed in: {}", verified.claims.sub);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{
    claims::IdTokenClaims,
    error::{JwksError, Result},
    expiry::{DEFAULT_SKEW, is_valid},
    resolver::{SignatureResolver, SignatureVerifier, Verified},
    source::KeySource,
};

/// What a verified token must additionally satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedClaims {
    /// Required `iss`, if any.
    pub issuer: Option<String>,
    /// Audience that must appear in `aud`, if any.
    pub audience: Option<String>,
    /// Tolerance applied to `exp`.
    pub skew: Duration,
}

impl Default for ExpectedClaims {
    fn default() -> Self {
        Self { issuer: None, audience: None, skew: DEFAULT_SKEW }
    }
}

impl ExpectedClaims {
    /// Requires the given issuer.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Requires the given audience (usually the OAuth client ID).
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets the expiry tolerance.
    #[must_use]
    pub fn skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }
}

/// Verifies an ID token against the key set at `source_id`.
///
/// # Errors
///
/// - any fetch error from `source`
/// - [`JwksError::EmptyKeySet`], [`JwksError::NoValidKey`] or
///   [`JwksError::InvalidClaims`] from the resolver
/// - [`JwksError::TokenExpired`] if `exp + skew` is not after `now`
/// - [`JwksError::InvalidIssuer`] / [`JwksError::InvalidAudience`] if an
///   expectation is set and not met
#[tracing::instrument(skip(token, source, resolver))]
pub async fn verify_id_token<K, V>(
    token: &str,
    source_id: &str,
    source: &K,
    resolver: &SignatureResolver<V>,
    expected: &ExpectedClaims,
    now: DateTime<Utc>,
) -> Result<Verified<IdTokenClaims>>
where
    K: KeySource + ?Sized,
    V: SignatureVerifier,
{
    let fetched = source.fetch(source_id).await?;
    let verified: Verified<IdTokenClaims> = resolver.verify(token, &fetched.keys)?;
    let claims = &verified.claims;

    if !is_valid(now, expected.skew, claims.exp) {
        tracing::debug!(exp = claims.exp, "token expired");
        return Err(JwksError::TokenExpired);
    }

    if let Some(issuer) = &expected.issuer
        && claims.iss != *issuer
    {
        return Err(JwksError::InvalidIssuer(format!("expected {issuer}, got {}", claims.iss)));
    }

    if let Some(audience) = &expected.audience
        && !claims.aud.contains(audience)
    {
        return Err(JwksError::InvalidAudience(format!(
            "{audience} is not an audience of the token"
        )));
    }

    Ok(verified)
}
