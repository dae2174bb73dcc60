//! Node identity and peer identifiers.
//!
//! A node is identified by a long-term Ed25519 key. Its [`PeerId`] is the
//! BLAKE3 hash of the public key, so any side that verifies a signature from
//! that key derives the same id.
//!
//! # Example
//!
//! ```
//! use peerlink_core::identity::{Identity, PeerId, verify_signature};
//!
//! let identity = Identity::generate();
//! let signature = identity.sign(b"challenge");
//!
//! let id = verify_signature(identity.public_key(), &signature, b"challenge").unwrap();
//! assert_eq!(id, identity.peer_id());
//! assert_eq!(id, PeerId::from_public_key(identity.public_key()));
//! ```

use crate::error::{HandshakeError, Result};
use peerlink_crypto::hash::hash;
use peerlink_crypto::signatures::{Signature, SigningKey, VerifyingKey};
use peerlink_crypto::{CryptoError, ED25519_PUBLIC_KEY_SIZE};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Stable identifier of a node, derived from its public key.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId([u8; 32]);

impl PeerId {
    /// Derive the id of the node owning `public_key`.
    #[must_use]
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self(hash(public_key))
    }

    /// Wrap raw id bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw id bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the all-zero placeholder id.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// First 8 bytes as hex, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.short())
    }
}

impl FromStr for PeerId {
    type Err = HandshakeError;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| HandshakeError::config("peer id must be 64 hex characters"))?;
        Ok(Self(bytes))
    }
}

/// Long-term signing identity of the local node.
///
/// Signatures are made over the BLAKE3 hash of the content, so the
/// handshake signs a fixed-size digest of the shared challenge.
pub struct Identity {
    signing: SigningKey,
    public_key: [u8; ED25519_PUBLIC_KEY_SIZE],
    peer_id: PeerId,
}

impl Identity {
    /// Generate a fresh identity from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Restore an identity from its 32-byte secret seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(seed))
    }

    /// Restore an identity from a hex-encoded seed, as written by
    /// [`Identity::seed_hex`].
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::InvalidConfig`] if `s` is not 64 hex
    /// characters.
    pub fn from_hex(s: &str) -> Result<Self> {
        let mut seed = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(s.trim(), &mut seed[..])
            .map_err(|_| HandshakeError::config("identity seed must be 64 hex characters"))?;
        Ok(Self::from_seed(&seed))
    }

    fn from_signing_key(signing: SigningKey) -> Self {
        let public_key = signing.verifying_key().to_bytes();
        Self {
            peer_id: PeerId::from_public_key(&public_key),
            signing,
            public_key,
        }
    }

    /// Hex-encoded secret seed.
    #[must_use]
    pub fn seed_hex(&self) -> Zeroizing<String> {
        let seed = Zeroizing::new(self.signing.to_bytes());
        Zeroizing::new(hex::encode(seed.as_slice()))
    }

    /// Ed25519 public key.
    #[must_use]
    pub fn public_key(&self) -> &[u8; ED25519_PUBLIC_KEY_SIZE] {
        &self.public_key
    }

    /// Id derived from the public key.
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Sign `content`.
    #[must_use]
    pub fn sign(&self, content: &[u8]) -> Vec<u8> {
        self.signing.sign(&hash(content)).as_bytes().to_vec()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("peer_id", &self.peer_id)
            .field("public_key", &hex::encode(&self.public_key[..8]))
            .finish_non_exhaustive()
    }
}

/// Verify a signature made by [`Identity::sign`] and derive the signer's id.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidPublicKey`] if `public_key` is not a valid
/// Ed25519 key, or [`CryptoError::InvalidSignature`] if the signature is
/// malformed or does not verify over `content`.
pub fn verify_signature(
    public_key: &[u8],
    signature: &[u8],
    content: &[u8],
) -> std::result::Result<PeerId, CryptoError> {
    let key = VerifyingKey::from_slice(public_key)?;
    let signature = Signature::from_slice(signature)?;
    key.verify(&hash(content), &signature)?;
    Ok(PeerId::from_public_key(public_key))
}
