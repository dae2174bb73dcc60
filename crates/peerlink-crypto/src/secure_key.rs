//! Per-handshake key exchange state.
//!
//! A [`SecureKey`] is created once per side of one handshake attempt. It
//! holds an ephemeral X25519 key pair; [`SecureKey::setup`] combines it with
//! the remote public value and derives, in one HKDF expansion:
//!
//! - two directional record keys (index 0 carries outbound-to-inbound
//!   traffic, index 1 the reverse)
//! - the 32-byte *extra* secret both peers sign to bind their identities
//! - a 32-byte seed for the TLS backend's certificate key
//!
//! The salt is both public values in sorted order, so the two sides derive
//! identical material regardless of who initiated. The layout of the output
//! is fixed, so every peer reads the challenge from the same offset.

use crate::aead::{AeadSuite, RecordCipher};
use crate::hash::hkdf;
use crate::keylog::{KeyLog, label};
use crate::x25519::{PrivateKey, PublicKey};
use crate::{CryptoError, SYMMETRIC_KEY_SIZE, X25519_PUBLIC_KEY_SIZE};
use rand_core::{CryptoRng, OsRng, RngCore};
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Number of directional keys derived per exchange.
pub const KEY_COUNT: usize = 2;

/// Keys, challenge and TLS seed.
const OUTPUT_LEN: usize = (KEY_COUNT + 2) * SYMMETRIC_KEY_SIZE;

const KDF_INFO: &[u8] = b"peerlink secure key v1";

/// Material derived by [`SecureKey::setup`].
#[derive(Zeroize, ZeroizeOnDrop)]
struct Derived {
    keys: [[u8; SYMMETRIC_KEY_SIZE]; KEY_COUNT],
    extra: [u8; 32],
    tls_seed: [u8; 32],
    #[zeroize(skip)]
    aead: AeadSuite,
    #[zeroize(skip)]
    outbound: bool,
}

/// Ephemeral ECDHE state for one handshake attempt.
pub struct SecureKey {
    private: PrivateKey,
    public: PublicKey,
    remote: Option<PublicKey>,
    derived: Option<Derived>,
    key_log: Option<Arc<dyn KeyLog>>,
}

impl SecureKey {
    /// Create fresh key exchange state from the OS RNG.
    #[must_use]
    pub fn new() -> Self {
        Self::generate(&mut OsRng)
    }

    /// Create fresh key exchange state from `rng`.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let private = PrivateKey::generate(rng);
        let public = private.public_key();
        Self {
            private,
            public,
            remote: None,
            derived: None,
            key_log: None,
        }
    }

    /// Write the derived secrets to `key_log` once set up.
    ///
    /// For debugging captured traffic only.
    #[must_use]
    pub fn with_key_log(mut self, key_log: Arc<dyn KeyLog>) -> Self {
        self.key_log = Some(key_log);
        self
    }

    /// The local public value sent as the `param` field.
    #[must_use]
    pub fn public_param(&self) -> Vec<u8> {
        self.public.to_bytes().to_vec()
    }

    /// The remote public value, once set up.
    #[must_use]
    pub fn remote_param(&self) -> Option<[u8; X25519_PUBLIC_KEY_SIZE]> {
        self.remote.map(|p| p.to_bytes())
    }

    /// Whether [`SecureKey::setup`] has completed.
    #[must_use]
    pub fn is_established(&self) -> bool {
        self.derived.is_some()
    }

    /// Complete the key exchange.
    ///
    /// `outbound` is true on the side that sent the secure request. The AEAD
    /// suite is bound into the derivation, so both sides must pass the same
    /// one; [`AeadSuite::Unknown`] is accepted for the unencrypted suite.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::InvalidState`] if called twice
    /// - [`CryptoError::InvalidKeyLength`] / [`CryptoError::InvalidPublicKey`]
    ///   for a malformed or low-order remote value
    pub fn setup(
        &mut self,
        aead: AeadSuite,
        remote_param: &[u8],
        outbound: bool,
    ) -> Result<(), CryptoError> {
        if self.derived.is_some() {
            return Err(CryptoError::InvalidState("secure key already set up"));
        }

        let remote = PublicKey::from_slice(remote_param)?;
        let shared = self.private.exchange(&remote)?;

        let local = self.public.to_bytes();
        let peer = remote.to_bytes();
        let (lo, hi) = if local <= peer {
            (local, peer)
        } else {
            (peer, local)
        };
        let mut salt = [0u8; 2 * X25519_PUBLIC_KEY_SIZE];
        salt[..X25519_PUBLIC_KEY_SIZE].copy_from_slice(&lo);
        salt[X25519_PUBLIC_KEY_SIZE..].copy_from_slice(&hi);

        let mut info = KDF_INFO.to_vec();
        info.extend_from_slice(aead.as_str().as_bytes());

        let mut okm = Zeroizing::new([0u8; OUTPUT_LEN]);
        hkdf(&salt, shared.as_bytes(), &info, &mut okm[..]);

        let mut blocks = okm.chunks_exact(SYMMETRIC_KEY_SIZE).map(|chunk| {
            let mut block = [0u8; SYMMETRIC_KEY_SIZE];
            block.copy_from_slice(chunk);
            block
        });
        let mut next = || {
            blocks
                .next()
                .ok_or(CryptoError::KeyDerivation("short output".into()))
        };
        let keys = [next()?, next()?];
        let extra = next()?;
        let tls_seed = next()?;

        if let Some(key_log) = &self.key_log {
            // Both sides log under the dialer's public value.
            let session = if outbound { local } else { peer };
            key_log.log(label::OUTBOUND_TRAFFIC, &session, &keys[0]);
            key_log.log(label::INBOUND_TRAFFIC, &session, &keys[1]);
            key_log.log(label::CHALLENGE, &session, &extra);
        }

        self.remote = Some(remote);
        self.derived = Some(Derived {
            keys,
            extra,
            tls_seed,
            aead,
            outbound,
        });
        Ok(())
    }

    fn derived(&self) -> Result<&Derived, CryptoError> {
        self.derived
            .as_ref()
            .ok_or(CryptoError::InvalidState("secure key not set up"))
    }

    /// The suite bound at setup.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidState`] before setup.
    pub fn aead_suite(&self) -> Result<AeadSuite, CryptoError> {
        Ok(self.derived()?.aead)
    }

    /// Key for traffic this side sends.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidState`] before setup.
    pub fn send_key(&self) -> Result<&[u8; SYMMETRIC_KEY_SIZE], CryptoError> {
        let d = self.derived()?;
        Ok(&d.keys[if d.outbound { 0 } else { 1 }])
    }

    /// Key for traffic this side receives.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidState`] before setup.
    pub fn recv_key(&self) -> Result<&[u8; SYMMETRIC_KEY_SIZE], CryptoError> {
        let d = self.derived()?;
        Ok(&d.keys[if d.outbound { 1 } else { 0 }])
    }

    /// The shared signature challenge.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidState`] before setup.
    pub fn extra(&self) -> Result<&[u8; 32], CryptoError> {
        Ok(&self.derived()?.extra)
    }

    /// Seed for the TLS certificate key; identical on both sides.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidState`] before setup.
    pub fn tls_seed(&self) -> Result<&[u8; 32], CryptoError> {
        Ok(&self.derived()?.tls_seed)
    }

    /// Build the record cipher for the ECDHE secure transport.
    ///
    /// # Errors
    ///
    /// Fails before setup or if the bound suite is [`AeadSuite::Unknown`].
    pub fn record_cipher(&self) -> Result<RecordCipher, CryptoError> {
        RecordCipher::new(self.aead_suite()?, self.send_key()?, self.recv_key()?)
    }
}

impl Default for SecureKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SecureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureKey")
            .field("public", &self.public)
            .field("established", &self.is_established())
            .field("key_log", &self.key_log.is_some())
            .finish_non_exhaustive()
    }
}
