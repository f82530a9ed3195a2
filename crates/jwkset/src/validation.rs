//! Token algorithm policy.
//!
//! Only asymmetric signature algorithms can be checked against a published
//! key set. Symmetric algorithms and `none` are always rejected, before any
//! key is tried.

use crate::error::JwksError;

/// Algorithms that are never accepted.
///
/// - `none`: no signature at all
/// - `HS256`, `HS384`, `HS512`: symmetric, the "public" key would be the secret
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Asymmetric algorithms a provider key set may use.
pub const ACCEPTED_ALGORITHMS: &[&str] = &[
    "RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256", "ES384", "EdDSA",
];

/// Checks a token header algorithm against the policy.
///
/// # Errors
///
/// Returns [`JwksError::UnsupportedAlgorithm`] if the algorithm is in
/// [`FORBIDDEN_ALGORITHMS`] or not in [`ACCEPTED_ALGORITHMS`].
///
/// # Examples
///
/// ```
/// use oidc_jwkset::validation::validate_algorithm;
///
/// assert!(validate_algorithm("RS256").is_ok());
/// assert!(validate_algorithm("HS256").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), JwksError> {
    if FORBIDDEN_ALGORITHMS.contains(&alg) {
        return Err(JwksError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(JwksError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not in accepted list"
        )));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("RS256")]
    #[case("PS384")]
    #[case("ES256")]
    #[case("EdDSA")]
    fn test_asymmetric_accepted(#[case] alg: &str) {
        assert!(validate_algorithm(alg).is_ok());
    }

    #[test]
    fn test_forbidden_algorithms_each_rejected_with_security_message() {
        for alg in FORBIDDEN_ALGORITHMS {
            let result = validate_algorithm(alg);
            assert!(
                matches!(
                    result,
                    Err(JwksError::UnsupportedAlgorithm(ref msg))
                        if msg.contains("not allowed for security reasons")
                ),
                "expected security rejection for '{alg}'"
            );
        }
    }

    #[rstest]
    #[case("RSA-OAEP")]
    #[case("eddsa")]
    #[case("")]
    fn test_unknown_rejected(#[case] alg: &str) {
        let result = validate_algorithm(alg);
        assert!(
            matches!(
                result,
                Err(JwksError::UnsupportedAlgorithm(ref msg))
                    if msg.contains("not in accepted list")
            )
        );
    }

    #[test]
    fn test_lists_are_disjoint() {
        for alg in FORBIDDEN_ALGORITHMS {
            assert!(!ACCEPTED_ALGORITHMS.contains(alg), "{alg} is in both lists");
        }
    }
}
