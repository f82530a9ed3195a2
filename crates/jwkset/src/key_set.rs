//! Key-set data model and the shared document decoder.
//!
//! Every [`KeySource`](crate::KeySource) variant hands its raw body to
//! [`decode_key_set`], so the HTTP, object-storage and in-memory variants
//! agree on what an empty, missing or malformed document means.

use std::{str::FromStr, time::Duration};

use jsonwebtoken::{
    Algorithm,
    jwk::{Jwk, KeyAlgorithm},
};
use serde::{Deserialize, Serialize};

use crate::error::{JwksError, Result};

/// A single published verification key.
///
/// Treated as opaque verification material: callers read its identifier and
/// declared algorithm, and the verifier turns it into decoding material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Jwk);

impl Key {
    /// Wraps a parsed JSON Web Key.
    #[must_use]
    pub fn new(jwk: Jwk) -> Self {
        Self(jwk)
    }

    /// Returns the key identifier (`kid`), if the key declares one.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.0.common.key_id.as_deref()
    }

    /// Returns the raw declared algorithm (`alg`), if any.
    #[must_use]
    pub fn declared_algorithm(&self) -> Option<&KeyAlgorithm> {
        self.0.common.key_algorithm.as_ref()
    }

    /// Returns the declared signature algorithm.
    ///
    /// `Ok(None)` means the key declares no algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`JwksError::UnsupportedAlgorithm`] when the key declares an
    /// algorithm that cannot produce signatures (for example `RSA-OAEP`).
    pub fn signing_algorithm(&self) -> Result<Option<Algorithm>> {
        let Some(declared) = self.declared_algorithm() else {
            return Ok(None);
        };
        let name = format!("{declared:?}");
        Algorithm::from_str(&name)
            .map(Some)
            .map_err(|_| JwksError::unsupported_algorithm(format!("key declares {name}")))
    }

    /// Returns the underlying JSON Web Key.
    #[must_use]
    pub fn jwk(&self) -> &Jwk {
        &self.0
    }
}

impl From<Jwk> for Key {
    fn from(jwk: Jwk) -> Self {
        Self(jwk)
    }
}

/// An ordered sequence of keys.
///
/// Order is the provider's declared order and is the trial order during
/// verification. Nothing in this crate re-sorts a set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeySet {
    keys: Vec<Key>,
}

impl KeySet {
    /// Creates a key set preserving the given order.
    #[must_use]
    pub fn new(keys: Vec<Key>) -> Self {
        Self { keys }
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the set holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterates the keys in trial order.
    pub fn iter(&self) -> std::slice::Iter<'_, Key> {
        self.keys.iter()
    }

    /// Returns the first key with the given identifier.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Key> {
        self.keys.iter().find(|key| key.kid() == Some(kid))
    }

    /// Returns the keys as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Key] {
        &self.keys
    }

    /// Serializes the set as a `{"keys": [...]}` document.
    ///
    /// # Errors
    ///
    /// Returns [`JwksError::Decode`] if a key cannot be serialized.
    pub fn to_document(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| JwksError::decode_with_source("failed to encode key set", e))
    }
}

impl FromIterator<Key> for KeySet {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Self { keys: iter.into_iter().collect() }
    }
}

impl IntoIterator for KeySet {
    type Item = Key;
    type IntoIter = std::vec::IntoIter<Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.into_iter()
    }
}

impl<'a> IntoIterator for &'a KeySet {
    type Item = &'a Key;
    type IntoIter = std::slice::Iter<'a, Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

/// A decoded key set plus the source's freshness hint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    /// The keys, in provider order.
    pub keys: KeySet,
    /// How long the keys may be trusted. Zero means the source declared no window.
    pub ttl: Duration,
}

impl FetchResult {
    /// Creates a result with the given keys and freshness hint.
    #[must_use]
    pub fn new(keys: KeySet, ttl: Duration) -> Self {
        Self { keys, ttl }
    }
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    keys: Option<Vec<Key>>,
}

/// Decodes a key-set document.
///
/// An empty body (or one holding only whitespace), a JSON `null`, and a
/// document without a `keys` member all decode to an empty set. Members
/// other than `keys` are ignored.
///
/// # Errors
///
/// Returns [`JwksError::Decode`] when the body is not JSON, is not an
/// object, or holds a key record of an unknown key type.
pub fn decode_key_set(body: &[u8]) -> Result<KeySet> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(KeySet::default());
    }
    let document: Option<Document> = serde_json::from_slice(body)
        .map_err(|e| JwksError::decode_with_source("malformed key set document", e))?;
    let keys = document.and_then(|d| d.keys).unwrap_or_default();
    Ok(KeySet::new(keys))
}
