//! CSRF state values for the authorization-code flow.

use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Number of random bytes hashed into each state value.
pub const STATE_ENTROPY_BYTES: usize = 30;

/// Generates an unguessable `state` value for an authorization request.
///
/// 30 bytes from the operating system RNG are hashed with SHA-256 and
/// hex-encoded, giving 64 lowercase hex characters.
#[must_use]
pub fn state_token() -> String {
    let mut entropy = [0u8; STATE_ENTROPY_BYTES];
    OsRng.fill_bytes(&mut entropy);
    hex::encode(Sha256::digest(entropy))
}
