//! Channel key derivation and commitments.

use hmac::Hmac;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Derived channel keys are 256-bit.
pub const CHANNEL_KEY_SIZE: usize = 32;

/// PBKDF2 rounds. Deliberately slow; run off the packet paths.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Derive the symmetric key for a password-protected channel.
///
/// PBKDF2-HMAC-SHA-256 with the channel name as salt. The salt is
/// deterministic and public, which permits precomputation across
/// channels sharing a password; the protocol accepts that trade so
/// every peer derives an identical key from the password alone.
pub fn derive_channel_key(password: &str, channel: &str) -> Zeroizing<[u8; CHANNEL_KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; CHANNEL_KEY_SIZE]);
    // Only fails for absurd output lengths, which 32 bytes is not.
    let _ = pbkdf2::pbkdf2::<Hmac<Sha256>>(
        password.as_bytes(),
        channel.as_bytes(),
        PBKDF2_ITERATIONS,
        key.as_mut(),
    );
    key
}

/// One-way commitment to a derived key: SHA-256 of the key bytes.
pub fn key_commitment(key: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(key);
    digest.into()
}
