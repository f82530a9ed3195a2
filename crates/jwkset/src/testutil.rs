//! Shared test utilities.
//!
//! Helpers for generating Ed25519 keys, signing ID tokens, building key-set
//! documents and observing how often a source is called. Feature-gated
//! behind `testutil` so none of it reaches production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! oidc-jwkset = { path = "../jwkset", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use oidc_jwkset::testutil::{create_signed_token, generate_test_key};
//! ```

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::SigningKey;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use rand_core::OsRng;
use serde_json::{Value, json};
use zeroize::Zeroizing;

use crate::{
    error::{JwksError, Result},
    key_set::{FetchResult, Key, KeySet},
    source::KeySource,
};

/// Generates a fresh Ed25519 key pair.
///
/// Returns `(pkcs8_der, key)` where `pkcs8_der` is the private key in PKCS#8
/// DER form (for [`EncodingKey::from_ed_der`]) and `key` is the public half
/// as an `OKP` JSON Web Key with the given `kid` and `alg: EdDSA`.
///
/// # Panics
///
/// Panics if the generated JWK fails to parse (should not happen).
pub fn generate_test_key(kid: &str) -> (Zeroizing<Vec<u8>>, Key) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let x = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());

    let private_bytes: Zeroizing<[u8; 32]> = Zeroizing::new(signing_key.to_bytes());
    let mut pkcs8_der = Zeroizing::new(vec![
        0x30, 0x2e, // SEQUENCE, 46 bytes
        0x02, 0x01, 0x00, // INTEGER version 0
        0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
        0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
        0x04, 0x22, // OCTET STRING, 34 bytes
        0x04, 0x20, // OCTET STRING, 32 bytes (the actual key)
    ]);
    pkcs8_der.extend_from_slice(&*private_bytes);

    let key = serde_json::from_value(json!({
        "kty": "OKP",
        "crv": "Ed25519",
        "use": "sig",
        "alg": "EdDSA",
        "kid": kid,
        "x": x,
    }))
    .expect("generated JWK must parse");

    (pkcs8_der, key)
}

/// Signs `claims` with an Ed25519 key in PKCS#8 DER form.
///
/// # Panics
///
/// Panics if encoding fails (should not happen with valid inputs).
pub fn create_signed_token(pkcs8_der: &[u8], kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = kid.map(str::to_owned);

    let encoding_key = EncodingKey::from_ed_der(pkcs8_der);
    jsonwebtoken::encode(&header, claims, &encoding_key).expect("Failed to encode test token")
}

/// Builds ID token claims for `issuer` and `audience` expiring at `exp`.
///
/// `iat` is one hour before `exp`.
pub fn id_token_claims(issuer: &str, audience: &str, exp: i64) -> Value {
    json!({
        "iss": issuer,
        "sub": "10769150350006150715113082367",
        "aud": audience,
        "iat": exp - 3600,
        "exp": exp,
        "email": "jsmith@example.com",
    })
}

/// Creates a raw token string from arbitrary header and payload JSON.
///
/// The result is `{header_b64}.{payload_b64}.` with an empty signature, for
/// testing rejection of `alg: none` and other malformed tokens.
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(header_json: &Value, payload_json: &Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

/// Serializes `keys` as a `{"keys": [...]}` document.
///
/// # Panics
///
/// Panics if a key fails to serialize.
pub fn key_set_document(keys: &[Key]) -> Vec<u8> {
    KeySet::new(keys.to_vec()).to_document().expect("key set must serialize")
}

/// A [`KeySource`] that returns a configurable result and counts its calls.
pub struct CountingSource {
    result: Mutex<Result<FetchResult>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingSource {
    /// Creates a source that always succeeds with `result`.
    pub fn new(result: FetchResult) -> Self {
        Self { result: Mutex::new(Ok(result)), calls: AtomicUsize::new(0), delay: Duration::ZERO }
    }

    /// Creates a source that always fails with `error`.
    pub fn failing(error: JwksError) -> Self {
        Self { result: Mutex::new(Err(error)), calls: AtomicUsize::new(0), delay: Duration::ZERO }
    }

    /// Sleeps for `delay` inside every fetch, to widen race windows.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replaces the result returned by subsequent fetches.
    pub fn set_result(&self, result: Result<FetchResult>) {
        *self.result.lock() = result;
    }

    /// Returns how many times `fetch` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySource for CountingSource {
    async fn fetch(&self, _source_id: &str) -> Result<FetchResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.lock().clone()
    }
}

/// Asserts that a `Result<T, JwksError>` is an `Err` of the given [`JwksError`] variant.
///
/// The expression is evaluated once.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use oidc_jwkset::{JwksError, assert_jwks_error};
///
/// let result: Result<(), JwksError> = Err(JwksError::EmptyKeySet);
/// assert_jwks_error!(result, EmptyKeySet);
/// ```
#[macro_export]
macro_rules! assert_jwks_error {
    ($result:expr, $variant:ident) => {{
        let result = $result;
        assert!(
            matches!(&result, Err($crate::JwksError::$variant { .. })),
            "expected JwksError::{}, got: {:?}",
            stringify!($variant),
            result,
        );
    }};
    ($result:expr, $variant:ident, $msg:expr) => {{
        let result = $result;
        assert!(
            matches!(&result, Err($crate::JwksError::$variant { .. })),
            "{}: expected JwksError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            result,
        );
    }};
}
