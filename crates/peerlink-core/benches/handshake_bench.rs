//! End-to-end handshake benchmarks.
//!
//! Run with: `cargo bench -p peerlink-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use peerlink_core::{
    Authenticator, ChannelNegotiator, HandlerChain, Identity, Packet, Peer, SecureSuite,
    SuitePolicy,
};
use peerlink_crypto::AeadSuite;
use peerlink_transport::Connection;
use std::sync::Arc;
use tokio::io::duplex;
use tokio::runtime::Runtime;

fn chain(identity: Arc<Identity>, suite: SecureSuite) -> HandlerChain {
    let policy = SuitePolicy::new(vec![suite], vec![AeadSuite::ChaCha20Poly1305]);
    HandlerChain::new()
        .with(Arc::new(ChannelNegotiator::new("bench")))
        .with(Arc::new(Authenticator::new(identity, Arc::new(policy))))
}

// ============================================================================
// Full handshake over an in-memory stream
// ============================================================================

fn bench_handshake(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dialer_id = Arc::new(Identity::generate());
    let acceptor_id = Arc::new(Identity::generate());

    let mut group = c.benchmark_group("handshake");
    for suite in [SecureSuite::Ecdhe, SecureSuite::Tls, SecureSuite::None] {
        let dialer_chain = chain(Arc::clone(&dialer_id), suite);
        let acceptor_chain = chain(Arc::clone(&acceptor_id), suite);

        group.bench_with_input(BenchmarkId::from_parameter(suite), &suite, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let (a, b) = duplex(64 * 1024);
                    let dialer = Peer::new(Connection::plain(a, 65536), dialer_id.peer_id(), true, "b")
                        .with_channel("bench");
                    let acceptor =
                        Peer::new(Connection::plain(b, 65536), acceptor_id.peer_id(), false, "a");
                    let (d, a) = tokio::join!(dialer_chain.run(dialer), acceptor_chain.run(acceptor));
                    d.unwrap();
                    a.unwrap();
                })
            });
        });
    }
    group.finish();
}

// ============================================================================
// Packet codec
// ============================================================================

fn bench_packet_codec(c: &mut Criterion) {
    let identity = Identity::generate();
    let request = peerlink_core::message::SignatureRequest {
        public_key: identity.public_key().to_vec(),
        signature: identity.sign(b"challenge"),
        rtt: std::time::Duration::from_millis(3),
    };
    let packet = Packet::control(identity.peer_id(), &request).unwrap();
    let wire = packet.to_bytes().unwrap();

    c.bench_function("packet_encode", |b| b.iter(|| packet.to_bytes().unwrap()));
    c.bench_function("packet_decode", |b| {
        b.iter(|| {
            Packet::from_bytes(&wire)
                .unwrap()
                .decode::<peerlink_core::message::SignatureRequest>()
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_handshake, bench_packet_codec);
criterion_main!(benches);
