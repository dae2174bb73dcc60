//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (authentication failure)
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// AEAD suite cannot be used for a record cipher
    #[error("unsupported aead suite: {0}")]
    UnsupportedSuite(String),

    /// Key exchange state used out of order
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Key derivation parameters rejected
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Nonce overflow (counter exhausted)
    #[error("nonce counter exhausted")]
    NonceOverflow,

    /// Invalid signature
    #[error("invalid signature")]
    InvalidSignature,

    /// Invalid public key (malformed or low-order point)
    #[error("invalid public key")]
    InvalidPublicKey,
}
