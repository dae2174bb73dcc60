//! Performance benchmarks for peerlink-crypto.
//!
//! Run with: `cargo bench -p peerlink-crypto`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use peerlink_crypto::aead::{AeadSuite, RecordCipher};
use peerlink_crypto::secure_key::SecureKey;
use peerlink_crypto::signatures::SigningKey;
use rand_core::OsRng;

// ============================================================================
// Record layer
// ============================================================================

fn bench_record_seal(c: &mut Criterion) {
    let sizes = [64, 1024, 16384, 65536];

    for suite in AeadSuite::SUPPORTED {
        let mut group = c.benchmark_group(format!("record_seal/{suite}"));
        for size in sizes {
            let plaintext = vec![0xAA; size];
            let mut cipher = RecordCipher::new(suite, &[0x42u8; 32], &[0x24u8; 32]).unwrap();

            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
                b.iter(|| cipher.seal(black_box(&plaintext)))
            });
        }
        group.finish();
    }
}

// ============================================================================
// Handshake crypto
// ============================================================================

fn bench_secure_key_setup(c: &mut Criterion) {
    c.bench_function("secure_key_setup", |b| {
        b.iter(|| {
            let mut local = SecureKey::new();
            let remote = SecureKey::new();
            local
                .setup(
                    AeadSuite::ChaCha20Poly1305,
                    black_box(&remote.public_param()),
                    true,
                )
                .unwrap();
            local
        })
    });
}

fn bench_sign_verify(c: &mut Criterion) {
    let key = SigningKey::generate(&mut OsRng);
    let verifying = key.verifying_key();
    let challenge = [0x17u8; 32];
    let signature = key.sign(&challenge);

    c.bench_function("ed25519_sign", |b| b.iter(|| key.sign(black_box(&challenge))));
    c.bench_function("ed25519_verify", |b| {
        b.iter(|| verifying.verify(black_box(&challenge), black_box(&signature)))
    });
}

criterion_group!(record_benches, bench_record_seal);
criterion_group!(handshake_benches, bench_secure_key_setup, bench_sign_verify);
criterion_main!(record_benches, handshake_benches);
