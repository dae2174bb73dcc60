//! Handshake configuration

use crate::error::{HandshakeError, Result};
use crate::message::SecureSuite;
use crate::suite::{DEFAULT_AEAD_SUITES, DEFAULT_SECURE_SUITES, SuitePolicy};
use peerlink_crypto::AeadSuite;
use peerlink_transport::DEFAULT_MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Handshake configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Address announced to peers during channel negotiation
    #[serde(default)]
    pub address: String,

    /// Transport suites, most preferred first
    #[serde(default = "default_secure_suites")]
    pub default_secure_suites: Vec<SecureSuite>,

    /// AEAD suites, most preferred first
    #[serde(default = "default_aead_suites")]
    pub default_aead_suites: Vec<AeadSuite>,

    /// Allowed difference between declared and measured RTT before warning
    #[serde(default = "default_rtt_accuracy_ms")]
    pub rtt_accuracy_ms: u64,

    /// Largest frame accepted or sent
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Bound on a whole handshake
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,

    /// Capacity of the ready-peer queue
    #[serde(default = "default_ready_queue")]
    pub ready_queue: usize,

    /// Append handshake secrets to this file. Debugging only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_log_file: Option<PathBuf>,

    /// Per-channel overrides
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelSuites>,
}

/// Suite overrides for one channel. Empty lists keep the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSuites {
    /// Transport suites, most preferred first
    pub secure_suites: Vec<SecureSuite>,
    /// AEAD suites, most preferred first
    pub aead_suites: Vec<AeadSuite>,
}

fn default_secure_suites() -> Vec<SecureSuite> {
    DEFAULT_SECURE_SUITES.to_vec()
}

fn default_aead_suites() -> Vec<AeadSuite> {
    DEFAULT_AEAD_SUITES.to_vec()
}

fn default_rtt_accuracy_ms() -> u64 {
    10
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_handshake_timeout_secs() -> u64 {
    10
}

fn default_ready_queue() -> usize {
    64
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            default_secure_suites: default_secure_suites(),
            default_aead_suites: default_aead_suites(),
            rtt_accuracy_ms: default_rtt_accuracy_ms(),
            max_frame_size: default_max_frame_size(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            ready_queue: default_ready_queue(),
            key_log_file: None,
            channels: BTreeMap::new(),
        }
    }
}

impl HandshakeConfig {
    /// Check the configuration for values the handshake cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.default_secure_suites.is_empty() {
            return Err(HandshakeError::config("default_secure_suites is empty"));
        }
        if self.default_aead_suites.is_empty()
            && self.default_secure_suites.iter().any(|s| s.is_encrypted())
        {
            return Err(HandshakeError::config(
                "default_aead_suites is empty but an encrypted secure suite is enabled",
            ));
        }
        check_known("default", &self.default_secure_suites, &self.default_aead_suites)?;
        for (name, channel) in &self.channels {
            check_known(name, &channel.secure_suites, &channel.aead_suites)?;
        }

        if self.max_frame_size == 0 {
            return Err(HandshakeError::config("max_frame_size must be non-zero"));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(HandshakeError::config("handshake_timeout_secs must be non-zero"));
        }
        if self.ready_queue == 0 {
            return Err(HandshakeError::config("ready_queue must be non-zero"));
        }
        Ok(())
    }

    /// Build the shared suite policy.
    #[must_use]
    pub fn suite_policy(&self) -> SuitePolicy {
        self.channels.iter().fold(
            SuitePolicy::new(
                self.default_secure_suites.clone(),
                self.default_aead_suites.clone(),
            ),
            |policy, (name, c)| {
                policy.with_channel(name.clone(), c.secure_suites.clone(), c.aead_suites.clone())
            },
        )
    }

    /// RTT accuracy bound.
    #[must_use]
    pub fn rtt_accuracy(&self) -> Duration {
        Duration::from_millis(self.rtt_accuracy_ms)
    }

    /// Handshake timeout.
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

fn check_known(scope: &str, secure: &[SecureSuite], aead: &[AeadSuite]) -> Result<()> {
    if secure.iter().any(|s| !s.is_known()) || aead.iter().any(|s| !s.is_known()) {
        return Err(HandshakeError::InvalidConfig(Cow::Owned(format!(
            "{scope}: 'unknown' is not a selectable suite"
        ))));
    }
    Ok(())
}
