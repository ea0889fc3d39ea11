use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn ed25519_sign_bench(c: &mut Criterion) {
    let kp = raze_crypto::generate_keypair();
    let msg = [42u8; 32];

    c.bench_function("ed25519_sign_digest", |b| {
        b.iter(|| raze_crypto::sign_message(&kp.private, black_box(&msg)))
    });
}

fn ed25519_verify_bench(c: &mut Criterion) {
    let kp = raze_crypto::generate_keypair();
    let msg = [42u8; 32];
    let sig = raze_crypto::sign_message(&kp.private, &msg);

    c.bench_function("ed25519_verify_digest", |b| {
        b.iter(|| raze_crypto::validate_message(&kp.public, black_box(&msg), &sig))
    });
}

fn blake2b_256_bench(c: &mut Criterion) {
    let data = [0xABu8; 256];

    c.bench_function("blake2b_256_256B", |b| {
        b.iter(|| raze_crypto::blake2b_256(black_box(&data)))
    });
}

fn blake2b_multi_bench(c: &mut Criterion) {
    let parts: Vec<&[u8]> = vec![&[1u8; 32], &[2u8; 32], &[3u8; 16]];

    c.bench_function("blake2b_256_multi_hashables", |b| {
        b.iter(|| raze_crypto::blake2b_256_multi(black_box(&parts)))
    });
}

criterion_group!(
    benches,
    ed25519_sign_bench,
    ed25519_verify_bench,
    blake2b_256_bench,
    blake2b_multi_bench
);
criterion_main!(benches);
