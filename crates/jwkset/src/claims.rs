//! OpenID Connect ID token claims.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The `aud` claim: a single audience or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// One audience.
    Single(String),
    /// Several audiences.
    Multiple(Vec<String>),
}

impl Audience {
    /// Returns `true` if `audience` is one of the token's audiences.
    #[must_use]
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::Single(aud) => aud == audience,
            Self::Multiple(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

/// Claims carried by an OpenID Connect ID token.
///
/// Claims this type does not name are kept in [`extra`](Self::extra).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer.
    pub iss: String,
    /// Subject.
    pub sub: String,
    /// Audience.
    pub aud: Audience,
    /// Issued-at time (seconds since the epoch).
    pub iat: i64,
    /// Expiry time (seconds since the epoch).
    pub exp: i64,
    /// End-user e-mail address, when the `email` scope was granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Every other claim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
