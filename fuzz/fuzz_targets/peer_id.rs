//! Fuzz test for peer ID and identity key parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use peerlink_core::{Identity, PeerId};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(id) = s.parse::<PeerId>() {
            assert_eq!(id.to_string(), s.to_lowercase());
        }
        if let Ok(identity) = Identity::from_hex(s) {
            assert_eq!(PeerId::from_public_key(identity.public_key()), identity.peer_id());
        }
    }

    if data.len() == 32 {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(data);
        let id = PeerId::from_bytes(bytes);
        assert_eq!(id.to_string().parse::<PeerId>().ok(), Some(id));
    }
});
