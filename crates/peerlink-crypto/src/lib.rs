//! # PeerLink Crypto
//!
//! Cryptographic primitives for the PeerLink handshake.
//!
//! This crate provides:
//! - X25519 ephemeral key agreement with low-order point rejection
//! - [`SecureKey`](secure_key::SecureKey), the per-handshake key exchange state
//! - AEAD record suites (ChaCha20-Poly1305, AES-128-GCM, AES-256-GCM)
//! - Ed25519 identity signatures
//! - BLAKE3 hashing and HKDF-style key derivation
//! - An opt-in [`KeyLog`](keylog::KeyLog) for debugging captured traffic
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | Key Exchange | X25519 | 128-bit |
//! | AEAD | ChaCha20-Poly1305 / AES-GCM | 128/256-bit key |
//! | Hash | BLAKE3 | 128-bit collision |
//! | KDF | HKDF-BLAKE3 | 128-bit |
//! | Signatures | Ed25519 | 128-bit |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod constant_time;
pub mod error;
pub mod hash;
pub mod keylog;
pub mod secure_key;
pub mod signatures;
pub mod x25519;

pub use aead::{AeadSuite, RecordCipher};
pub use error::CryptoError;
pub use keylog::{KeyLog, KeyLogFile};
pub use secure_key::SecureKey;

/// X25519 public key size
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// Derived symmetric key size (AES-128 uses the first 16 bytes)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// BLAKE3 output size
pub const BLAKE3_OUTPUT_SIZE: usize = 32;

/// Ed25519 public key size
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 secret key size
pub const ED25519_SECRET_KEY_SIZE: usize = 32;

/// Ed25519 signature size
pub const ED25519_SIGNATURE_SIZE: usize = 64;
