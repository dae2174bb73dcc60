//! Per-channel suite preferences.
//!
//! [`SuitePolicy`] is built once from configuration and shared read-only
//! between handshakes. Each channel may override the transport suite list,
//! the AEAD list, or both; anything left unset falls back to the defaults.

use crate::message::SecureSuite;
use peerlink_crypto::AeadSuite;
use std::collections::HashMap;

/// Transport suites tried when nothing else is configured.
pub const DEFAULT_SECURE_SUITES: [SecureSuite; 2] = [SecureSuite::Ecdhe, SecureSuite::Tls];

/// AEAD suites tried when nothing else is configured.
pub const DEFAULT_AEAD_SUITES: [AeadSuite; 3] = AeadSuite::SUPPORTED;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ChannelSuites {
    secure: Vec<SecureSuite>,
    aead: Vec<AeadSuite>,
}

/// Ordered suite preferences, keyed by channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuitePolicy {
    secure: Vec<SecureSuite>,
    aead: Vec<AeadSuite>,
    channels: HashMap<String, ChannelSuites>,
}

impl Default for SuitePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SECURE_SUITES.to_vec(), DEFAULT_AEAD_SUITES.to_vec())
    }
}

impl SuitePolicy {
    /// Policy with the given default lists. Placeholder entries are dropped.
    #[must_use]
    pub fn new(secure: Vec<SecureSuite>, aead: Vec<AeadSuite>) -> Self {
        Self {
            secure: known_secure(secure),
            aead: known_aead(aead),
            channels: HashMap::new(),
        }
    }

    /// Override the lists for `channel`. An empty list keeps the default.
    #[must_use]
    pub fn with_channel(
        mut self,
        channel: impl Into<String>,
        secure: Vec<SecureSuite>,
        aead: Vec<AeadSuite>,
    ) -> Self {
        self.channels.insert(
            channel.into(),
            ChannelSuites {
                secure: known_secure(secure),
                aead: known_aead(aead),
            },
        );
        self
    }

    /// Transport suites for `channel`, most preferred first.
    #[must_use]
    pub fn secure_suites(&self, channel: &str) -> &[SecureSuite] {
        match self.channels.get(channel) {
            Some(c) if !c.secure.is_empty() => &c.secure,
            _ => &self.secure,
        }
    }

    /// AEAD suites for `channel`, most preferred first.
    #[must_use]
    pub fn aead_suites(&self, channel: &str) -> &[AeadSuite] {
        match self.channels.get(channel) {
            Some(c) if !c.aead.is_empty() => &c.aead,
            _ => &self.aead,
        }
    }

    /// Channels with an override.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }
}

fn known_secure(list: Vec<SecureSuite>) -> Vec<SecureSuite> {
    list.into_iter().filter(|s| s.is_known()).collect()
}

fn known_aead(list: Vec<AeadSuite>) -> Vec<AeadSuite> {
    list.into_iter().filter(|s| s.is_known()).collect()
}

/// First entry of `own` that also appears anywhere in `offered`.
///
/// The order of `offered` is irrelevant: the selecting side's preference
/// decides.
#[must_use]
pub fn select<T: Copy + PartialEq>(own: &[T], offered: &[T]) -> Option<T> {
    own.iter().copied().find(|s| offered.contains(s))
}
