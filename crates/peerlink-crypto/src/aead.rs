//! AEAD suites and the record cipher used by the ECDHE secure transport.
//!
//! Three suites are negotiable:
//!
//! | Suite | Key | Nonce | Tag |
//! |-------|-----|-------|-----|
//! | `chacha20-poly1305` | 256-bit | 96-bit | 128-bit |
//! | `aes128-gcm` | 128-bit | 96-bit | 128-bit |
//! | `aes256-gcm` | 256-bit | 96-bit | 128-bit |
//!
//! Record nonces are per-direction counters, so a nonce never repeats
//! under one key. Each direction has its own key, derived by
//! [`crate::secure_key::SecureKey`].

use crate::CryptoError;
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::{
    ChaCha20Poly1305,
    aead::{Aead, KeyInit, Payload, generic_array::GenericArray},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authentication tag size (16 bytes / 128 bits).
pub const TAG_SIZE: usize = 16;

/// Nonce size shared by every suite (12 bytes / 96 bits).
pub const NONCE_SIZE: usize = 12;

/// Default number of records a [`RecordCipher`] may seal or open per direction.
pub const DEFAULT_MAX_RECORDS: u64 = u64::MAX - 1;

/// Authenticated-encryption algorithm negotiated for a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AeadSuite {
    /// ChaCha20-Poly1305 (RFC 8439)
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
    /// AES-128 in GCM mode
    #[serde(rename = "aes128-gcm")]
    Aes128Gcm,
    /// AES-256 in GCM mode
    #[serde(rename = "aes256-gcm")]
    Aes256Gcm,
    /// No suite chosen, or one this build does not know
    #[default]
    #[serde(rename = "unknown", other)]
    Unknown,
}

impl AeadSuite {
    /// Every suite that can actually encrypt.
    pub const SUPPORTED: [AeadSuite; 3] = [
        AeadSuite::ChaCha20Poly1305,
        AeadSuite::Aes256Gcm,
        AeadSuite::Aes128Gcm,
    ];

    /// Key length in bytes, or `None` for [`AeadSuite::Unknown`].
    #[must_use]
    pub const fn key_size(self) -> Option<usize> {
        match self {
            Self::Unknown => None,
            Self::Aes128Gcm => Some(16),
            Self::ChaCha20Poly1305 | Self::Aes256Gcm => Some(32),
        }
    }

    /// Whether this is a real suite.
    #[must_use]
    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Stable label, also mixed into key derivation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::ChaCha20Poly1305 => "chacha20-poly1305",
            Self::Aes128Gcm => "aes128-gcm",
            Self::Aes256Gcm => "aes256-gcm",
        }
    }
}

impl fmt::Display for AeadSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum CipherImpl {
    ChaCha(Box<ChaCha20Poly1305>),
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

/// A keyed AEAD instance for one suite.
pub struct AeadKey {
    suite: AeadSuite,
    cipher: CipherImpl,
}

impl AeadKey {
    /// Key a cipher for `suite`.
    ///
    /// Keys longer than the suite's key size are truncated, so a 32-byte
    /// derived key serves every suite.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnsupportedSuite`] for [`AeadSuite::Unknown`] and
    /// [`CryptoError::InvalidKeyLength`] if `key` is too short.
    pub fn new(suite: AeadSuite, key: &[u8]) -> Result<Self, CryptoError> {
        let size = suite
            .key_size()
            .ok_or_else(|| CryptoError::UnsupportedSuite(suite.to_string()))?;
        if key.len() < size {
            return Err(CryptoError::InvalidKeyLength {
                expected: size,
                actual: key.len(),
            });
        }
        let key = &key[..size];
        let invalid = || CryptoError::InvalidKeyLength {
            expected: size,
            actual: key.len(),
        };

        let cipher = match suite {
            AeadSuite::ChaCha20Poly1305 => CipherImpl::ChaCha(Box::new(
                ChaCha20Poly1305::new_from_slice(key).map_err(|_| invalid())?,
            )),
            AeadSuite::Aes128Gcm => CipherImpl::Aes128(Box::new(
                Aes128Gcm::new_from_slice(key).map_err(|_| invalid())?,
            )),
            AeadSuite::Aes256Gcm => CipherImpl::Aes256(Box::new(
                Aes256Gcm::new_from_slice(key).map_err(|_| invalid())?,
            )),
            AeadSuite::Unknown => return Err(CryptoError::UnsupportedSuite(suite.to_string())),
        };

        Ok(Self { suite, cipher })
    }

    /// The suite this key was created for.
    #[must_use]
    pub fn suite(&self) -> AeadSuite {
        self.suite
    }

    /// Encrypt `plaintext`, returning ciphertext with the tag appended.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] on AEAD failure.
    pub fn encrypt(
        &self,
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let nonce = GenericArray::from_slice(nonce);
        let payload = Payload {
            msg: plaintext,
            aad,
        };
        match &self.cipher {
            CipherImpl::ChaCha(c) => c.encrypt(nonce, payload),
            CipherImpl::Aes128(c) => c.encrypt(nonce, payload),
            CipherImpl::Aes256(c) => c.encrypt(nonce, payload),
        }
        .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt and authenticate `ciphertext`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] if authentication fails.
    pub fn decrypt(
        &self,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let nonce = GenericArray::from_slice(nonce);
        let payload = Payload {
            msg: ciphertext,
            aad,
        };
        match &self.cipher {
            CipherImpl::ChaCha(c) => c.decrypt(nonce, payload),
            CipherImpl::Aes128(c) => c.decrypt(nonce, payload),
            CipherImpl::Aes256(c) => c.decrypt(nonce, payload),
        }
        .map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// Build the 96-bit record nonce for `counter`.
#[must_use]
pub fn nonce_from_counter(counter: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..8].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Bidirectional record encryption for an upgraded connection.
///
/// Records must be opened in the order they were sealed; a dropped,
/// reordered, replayed, or modified record fails authentication.
pub struct RecordCipher {
    send_key: AeadKey,
    recv_key: AeadKey,
    send_counter: u64,
    recv_counter: u64,
    max_counter: u64,
}

impl RecordCipher {
    /// Create a record cipher from directional keys.
    ///
    /// # Errors
    ///
    /// Fails if either key cannot be used with `suite`.
    pub fn new(suite: AeadSuite, send_key: &[u8], recv_key: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            send_key: AeadKey::new(suite, send_key)?,
            recv_key: AeadKey::new(suite, recv_key)?,
            send_counter: 0,
            recv_counter: 0,
            max_counter: DEFAULT_MAX_RECORDS,
        })
    }

    /// Lower the record limit per direction.
    #[must_use]
    pub fn with_max_records(mut self, max: u64) -> Self {
        self.max_counter = max;
        self
    }

    /// The negotiated suite.
    #[must_use]
    pub fn suite(&self) -> AeadSuite {
        self.send_key.suite()
    }

    /// Encrypt the next outgoing record.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::NonceOverflow`] once the send counter is
    /// exhausted, or [`CryptoError::EncryptionFailed`].
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.send_counter >= self.max_counter {
            return Err(CryptoError::NonceOverflow);
        }
        let nonce = nonce_from_counter(self.send_counter);
        self.send_counter += 1;
        self.send_key.encrypt(&nonce, plaintext, &[])
    }

    /// Decrypt the next incoming record.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::NonceOverflow`] once the receive counter is
    /// exhausted, or [`CryptoError::DecryptionFailed`].
    pub fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.recv_counter >= self.max_counter {
            return Err(CryptoError::NonceOverflow);
        }
        let nonce = nonce_from_counter(self.recv_counter);
        let plaintext = self.recv_key.decrypt(&nonce, ciphertext, &[])?;
        self.recv_counter += 1;
        Ok(plaintext)
    }

    /// Records sealed so far.
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.send_counter
    }

    /// Records opened so far.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.recv_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(suite: AeadSuite) -> (RecordCipher, RecordCipher) {
        let k1 = [0x11u8; 32];
        let k2 = [0x22u8; 32];
        (
            RecordCipher::new(suite, &k1, &k2).unwrap(),
            RecordCipher::new(suite, &k2, &k1).unwrap(),
        )
    }

    #[test]
    fn test_record_exchange_all_suites() {
        for suite in AeadSuite::SUPPORTED {
            let (mut a, mut b) = pair(suite);

            let sealed = a.seal(b"ping").unwrap();
            assert_eq!(sealed.len(), 4 + TAG_SIZE);
            assert_eq!(b.open(&sealed).unwrap(), b"ping");

            let sealed = b.seal(b"pong").unwrap();
            assert_eq!(a.open(&sealed).unwrap(), b"pong");
            assert_eq!(a.sent(), 1);
            assert_eq!(a.received(), 1);
        }
    }

    #[test]
    fn test_suites_are_not_interchangeable() {
        let key = [0x33u8; 32];
        let mut chacha = RecordCipher::new(AeadSuite::ChaCha20Poly1305, &key, &key).unwrap();
        let mut aes = RecordCipher::new(AeadSuite::Aes256Gcm, &key, &key).unwrap();

        let sealed = chacha.seal(b"data").unwrap();
        assert!(matches!(aes.open(&sealed), Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_replayed_record_rejected() {
        let (mut a, mut b) = pair(AeadSuite::Aes128Gcm);

        let first = a.seal(b"one").unwrap();
        let second = a.seal(b"two").unwrap();

        assert!(b.open(&second).is_err());
        assert_eq!(b.open(&first).unwrap(), b"one");
        assert!(b.open(&first).is_err());
        assert_eq!(b.open(&second).unwrap(), b"two");
    }

    #[test]
    fn test_tampered_record_rejected() {
        let (mut a, mut b) = pair(AeadSuite::ChaCha20Poly1305);

        let mut sealed = a.seal(b"payload").unwrap();
        sealed[0] ^= 0x01;
        assert!(matches!(b.open(&sealed), Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_nonce_overflow() {
        let key = [0x44u8; 32];
        let mut cipher = RecordCipher::new(AeadSuite::Aes256Gcm, &key, &key)
            .unwrap()
            .with_max_records(2);

        cipher.seal(b"a").unwrap();
        cipher.seal(b"b").unwrap();
        assert!(matches!(cipher.seal(b"c"), Err(CryptoError::NonceOverflow)));
    }

    #[test]
    fn test_unknown_suite_and_short_key() {
        assert!(matches!(
            AeadKey::new(AeadSuite::Unknown, &[0u8; 32]),
            Err(CryptoError::UnsupportedSuite(_))
        ));
        assert!(matches!(
            AeadKey::new(AeadSuite::Aes256Gcm, &[0u8; 16]),
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));
        assert!(AeadKey::new(AeadSuite::Aes128Gcm, &[0u8; 16]).is_ok());
    }

    #[test]
    fn test_suite_serde_names() {
        assert_eq!(AeadSuite::ChaCha20Poly1305.to_string(), "chacha20-poly1305");
        assert_eq!(AeadSuite::default(), AeadSuite::Unknown);
        assert!(!AeadSuite::Unknown.is_known());

        let encoded = bincode::serialize(&AeadSuite::Aes128Gcm).unwrap();
        let decoded: AeadSuite = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, AeadSuite::Aes128Gcm);
    }

    #[test]
    fn test_unrecognized_id_decodes_as_unknown() {
        // Variant ids travel as a little-endian u32.
        let decoded: AeadSuite = bincode::deserialize(&200u32.to_le_bytes()).unwrap();
        assert_eq!(decoded, AeadSuite::Unknown);

        let mut listed = bincode::serialize(&vec![AeadSuite::Aes256Gcm; 2]).unwrap();
        let last = listed.len() - 4;
        listed[last..].copy_from_slice(&9u32.to_le_bytes());
        let decoded: Vec<AeadSuite> = bincode::deserialize(&listed).unwrap();
        assert_eq!(decoded, vec![AeadSuite::Aes256Gcm, AeadSuite::Unknown]);
    }
}
