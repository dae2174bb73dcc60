//! Fuzz target for wire decoding
//!
//! Feeds arbitrary frames to a handshake in progress. The peer must reject
//! or skip them without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use peerlink_core::message::{
    JoinRequest, SecureRequest, SecureResponse, SignatureRequest, SignatureResponse,
};
use peerlink_core::{HandlerChain, Identity, Packet, Peer, SuitePolicy};
use peerlink_core::{Authenticator, ChannelNegotiator};
use peerlink_transport::{Connection, FrameTransport};
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = Packet::from_bytes(data) {
        let _ = packet.control_kind();
        let _ = packet.decode::<JoinRequest>();
        let _ = packet.decode::<SecureRequest>();
        let _ = packet.decode::<SecureResponse>();
        let _ = packet.decode::<SignatureRequest>();
        let _ = packet.decode::<SignatureResponse>();
    }

    let Ok(runtime) = tokio::runtime::Builder::new_current_thread().enable_all().build() else {
        return;
    };
    runtime.block_on(async {
        let identity = Arc::new(Identity::generate());
        let chain = HandlerChain::new()
            .with(Arc::new(ChannelNegotiator::new("fuzz")))
            .with(Arc::new(Authenticator::new(
                Arc::clone(&identity),
                Arc::new(SuitePolicy::default()),
            )));

        let (a, b) = tokio::io::duplex(64 * 1024);
        let peer = Peer::new(Connection::plain(a, 4096), identity.peer_id(), false, "fuzz");
        let mut remote = Connection::plain(b, 4096);
        if remote.send_frame(data).await.is_err() {
            return;
        }
        drop(remote);
        let _ = chain.run(peer).await;
    });
});
