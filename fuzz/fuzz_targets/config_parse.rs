//! Fuzz test for configuration file parsing
//!
//! Arbitrary TOML must either be rejected or yield a config whose
//! validation and suite policy do not panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use peerlink_core::HandshakeConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = toml::from_str::<HandshakeConfig>(s) {
            if config.validate().is_ok() {
                let policy = config.suite_policy();
                for channel in config.channels.keys() {
                    assert!(policy.secure_suites(channel).iter().all(|s| s.is_known()));
                }
            }
        }
    }
});
