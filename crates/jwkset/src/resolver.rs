//! Trial verification of a signed token against a key set.
//!
//! A token header may not say which published key signed it, and during a
//! rotation overlap a provider publishes several valid keys at once. The
//! [`SignatureResolver`] therefore tries every key, in the set's order, and
//! reports the first one that verifies.
//!
//! ```text
//! token, [k1, k2, k3]
//!   → verify(token, k1)  fail (kept as last error)
//!   → verify(token, k2)  ok   → Verified { claims, key: k2 }
//! ```
//!
//! A `kid` in the token header is not used to skip or reorder keys.

use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::{JwksError, Result},
    key_set::{Key, KeySet},
    validation::validate_algorithm,
};

/// Signature-verification primitive: checks a compact JWS against one key.
pub trait SignatureVerifier: Send + Sync {
    /// Returns the decoded payload if `key` verifies `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, its algorithm is refused,
    /// or the signature does not verify with `key`.
    fn verify(&self, token: &str, key: &Key) -> Result<Value>;
}

/// [`SignatureVerifier`] backed by `jsonwebtoken`.
///
/// Checks only the signature and the algorithm policy:
///
/// - the header algorithm must pass [`validate_algorithm`]
/// - a key that declares `alg` must declare the header's algorithm
///
/// Time-based claims (`exp`, `nbf`) and `aud` are not checked here. Expiry is
/// the job of [`crate::expiry::is_valid`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JwsVerifier;

impl SignatureVerifier for JwsVerifier {
    fn verify(&self, token: &str, key: &Key) -> Result<Value> {
        let kid = key.kid();
        let header = decode_header(token)
            .map_err(|e| JwksError::verification(kid, format!("malformed token: {e}")))?;

        let token_alg = format!("{:?}", header.alg);
        validate_algorithm(&token_alg)?;

        if let Some(key_alg) = key.signing_algorithm()?
            && key_alg != header.alg
        {
            return Err(JwksError::AlgorithmMismatch {
                kid: kid.map(str::to_owned),
                key_alg: format!("{key_alg:?}"),
                token_alg,
            });
        }

        let decoding_key = DecodingKey::from_jwk(key.jwk())
            .map_err(|e| JwksError::verification(kid, e.to_string()))?;

        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<Value>(token, &decoding_key, &validation)
            .map_err(|e| JwksError::verification(kid, e.to_string()))?;
        Ok(data.claims)
    }
}

/// A successful verification: the decoded claims and the key that matched.
#[derive(Debug, Clone)]
pub struct Verified<C> {
    /// Claims decoded from the token payload.
    pub claims: C,
    /// The key whose signature check succeeded.
    pub key: Key,
}

/// Tries each key of a set against a signed token.
#[derive(Debug, Clone, Default)]
pub struct SignatureResolver<V = JwsVerifier> {
    verifier: V,
}

impl SignatureResolver<JwsVerifier> {
    /// Creates a resolver backed by [`JwsVerifier`].
    #[must_use]
    pub fn new() -> Self {
        Self { verifier: JwsVerifier }
    }
}

impl<V: SignatureVerifier> SignatureResolver<V> {
    /// Creates a resolver backed by a custom verification primitive.
    pub fn with_verifier(verifier: V) -> Self {
        Self { verifier }
    }

    /// Verifies `token` against `key_set`, returning the first key that matches.
    ///
    /// # Errors
    ///
    /// - [`JwksError::EmptyKeySet`] if `key_set` has no keys
    /// - [`JwksError::NoValidKey`] if no key verifies, carrying the number of
    ///   keys tried and the error reported for the last one
    /// - [`JwksError::InvalidClaims`] if a key verifies but the payload does
    ///   not decode into `C`
    #[tracing::instrument(skip_all, fields(keys = key_set.len()))]
    pub fn verify<C: DeserializeOwned>(
        &self,
        token: &str,
        key_set: &KeySet,
    ) -> Result<Verified<C>> {
        let mut last_error = None;

        for (position, key) in key_set.iter().enumerate() {
            match self.verifier.verify(token, key) {
                Ok(payload) => {
                    tracing::debug!(kid = key.kid(), position, "token verified");
                    let claims = serde_json::from_value(payload)
                        .map_err(|e| JwksError::invalid_claims(e.to_string()))?;
                    return Ok(Verified { claims, key: key.clone() });
                },
                Err(err) => {
                    tracing::trace!(
                        kid = key.kid(),
                        position,
                        error = %err,
                        "key did not verify token"
                    );
                    last_error = Some(err);
                },
            }
        }

        match last_error {
            Some(last) => Err(JwksError::no_valid_key(key_set.len(), last)),
            None => Err(JwksError::EmptyKeySet),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::{
        assert_jwks_error,
        testutil::{craft_raw_jwt, create_signed_token, generate_test_key, id_token_claims},
    };

    const ISSUER: &str = "https://accounts.example.com";

    fn claims() -> Value {
        id_token_claims(ISSUER, "client-123", chrono::Utc::now().timestamp() + 3600)
    }

    #[test]
    fn test_token_signed_by_second_key() {
        let (_, first) = generate_test_key("first");
        let (der, second) = generate_test_key("second");
        let key_set = KeySet::new(vec![first, second.clone()]);
        let token = create_signed_token(&der, Some("second"), &claims());

        let verified: Verified<Value> = SignatureResolver::new().verify(&token, &key_set).unwrap();

        assert_eq!(verified.key, second);
        assert_eq!(verified.claims["iss"], ISSUER);
    }

    #[test]
    fn test_token_without_kid_header() {
        let (der, only) = generate_test_key("only");
        let key_set = KeySet::new(vec![only.clone()]);
        let token = create_signed_token(&der, None, &claims());

        let verified: Verified<Value> = SignatureResolver::new().verify(&token, &key_set).unwrap();
        assert_eq!(verified.key, only);
    }

    #[test]
    fn test_empty_key_set() {
        let (der, _) = generate_test_key("k1");
        let token = create_signed_token(&der, Some("k1"), &claims());

        let result = SignatureResolver::new().verify::<Value>(&token, &KeySet::default());
        assert_jwks_error!(result, EmptyKeySet);
    }

    #[test]
    fn test_signing_key_absent_from_set() {
        let (_, a) = generate_test_key("a");
        let (_, b) = generate_test_key("b");
        let (der, _) = generate_test_key("rotated-out");
        let token = create_signed_token(&der, Some("rotated-out"), &claims());

        let err = SignatureResolver::new()
            .verify::<Value>(&token, &KeySet::new(vec![a, b]))
            .unwrap_err();

        match err {
            JwksError::NoValidKey { attempted, last } => {
                assert_eq!(attempted, 2);
                assert!(matches!(
                    *last,
                    JwksError::Verification { kid: Some(ref kid), .. } if kid == "b"
                ));
            },
            other => panic!("expected NoValidKey, got {other:?}"),
        }
    }

    #[test]
    fn test_symmetric_token_rejected() {
        let (_, key) = generate_test_key("k1");
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims(),
            &EncodingKey::from_secret(b"shared-secret"),
        )
        .unwrap();

        let err = SignatureResolver::new()
            .verify::<Value>(&token, &KeySet::new(vec![key]))
            .unwrap_err();

        assert!(matches!(
            err,
            JwksError::NoValidKey { ref last, .. }
                if matches!(**last, JwksError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_alg_none_rejected() {
        let (_, key) = generate_test_key("k1");
        let token = craft_raw_jwt(&json!({"alg": "none", "typ": "JWT"}), &claims());

        let result = SignatureResolver::new().verify::<Value>(&token, &KeySet::new(vec![key]));
        assert_jwks_error!(result, NoValidKey);
    }

    #[test]
    fn test_key_declaring_other_algorithm_is_skipped() {
        let (der, key) = generate_test_key("k1");
        let mut jwk = serde_json::to_value(&key).unwrap();
        jwk["alg"] = json!("ES256");
        let mislabeled: Key = serde_json::from_value(jwk).unwrap();
        let token = create_signed_token(&der, Some("k1"), &claims());

        let verified = SignatureResolver::new()
            .verify::<Value>(&token, &KeySet::new(vec![mislabeled, key.clone()]))
            .unwrap();
        assert_eq!(verified.key, key);
    }

    #[test]
    fn test_algorithm_mismatch_error() {
        let (der, key) = generate_test_key("k1");
        let mut jwk = serde_json::to_value(&key).unwrap();
        jwk["alg"] = json!("RS256");
        let mislabeled: Key = serde_json::from_value(jwk).unwrap();
        let token = create_signed_token(&der, Some("k1"), &claims());

        let result = JwsVerifier.verify(&token, &mislabeled);
        assert!(matches!(
            result,
            Err(JwksError::AlgorithmMismatch { ref key_alg, ref token_alg, .. })
                if key_alg == "RS256" && token_alg == "EdDSA"
        ));
    }

    #[test]
    fn test_expired_token_still_verifies_signature() {
        let (der, key) = generate_test_key("k1");
        let expired = id_token_claims(ISSUER, "client-123", 1_000);
        let token = create_signed_token(&der, Some("k1"), &expired);

        let verified: Verified<Value> =
            SignatureResolver::new().verify(&token, &KeySet::new(vec![key])).unwrap();
        assert_eq!(verified.claims["exp"], 1_000);
    }

    #[test]
    fn test_claims_type_mismatch() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct NeedsNonce {
            nonce: String,
        }

        let (der, key) = generate_test_key("k1");
        let token = create_signed_token(&der, Some("k1"), &claims());

        let result = SignatureResolver::new().verify::<NeedsNonce>(&token, &KeySet::new(vec![key]));
        assert_jwks_error!(result, InvalidClaims);
    }

    /// Records the order keys were tried in and fails every attempt.
    #[derive(Default)]
    struct RecordingVerifier {
        tried: Mutex<Vec<String>>,
    }

    impl SignatureVerifier for RecordingVerifier {
        fn verify(&self, _token: &str, key: &Key) -> Result<Value> {
            let kid = key.kid().unwrap_or_default().to_owned();
            self.tried.lock().push(kid.clone());
            Err(JwksError::verification(Some(&kid), format!("rejected by {kid}")))
        }
    }

    #[test]
    fn test_keys_tried_in_set_order_and_last_error_wins() {
        let keys: KeySet =
            ["k3", "k1", "k2"].into_iter().map(|kid| generate_test_key(kid).1).collect();
        let (der, _) = generate_test_key("k2");
        let token = create_signed_token(&der, Some("k2"), &claims());
        let resolver = SignatureResolver::with_verifier(RecordingVerifier::default());

        let err = resolver.verify::<Value>(&token, &keys).unwrap_err();

        assert_eq!(*resolver.verifier.tried.lock(), vec!["k3", "k1", "k2"]);
        assert_eq!(
            err.to_string(),
            "No valid key among 3 candidate(s): Verification failed for key k2: rejected by k2"
        );
    }
}
