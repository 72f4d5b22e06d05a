use sealbox_crypto::{decrypt, decrypt_item, encrypt, encrypt_item, generate_key, PrivateKey, PublicKey};

const ALICE_PRIVATE: &str = include_str!("../tests/fixtures/alice_private.pem");
const ALICE_PUBLIC: &str = include_str!("../tests/fixtures/alice_public.pem");

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt(bencher: divan::Bencher, size: usize) {
    let key = generate_key().unwrap();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encrypt(divan::black_box(&data), divan::black_box(&key)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt(bencher: divan::Bencher, size: usize) {
    let key = generate_key().unwrap();
    let data = make_data(size);
    let blob = encrypt(&data, &key).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| decrypt(divan::black_box(&blob), divan::black_box(&key)).unwrap());
}

#[divan::bench]
fn bench_seal_small_item(bencher: divan::Bencher) {
    let public = PublicKey::from_pem(ALICE_PUBLIC).unwrap();
    let data = make_data(4096);
    bencher.bench(|| encrypt_item("bench.bin", divan::black_box(&data), &public).unwrap());
}

#[divan::bench]
fn bench_open_small_item(bencher: divan::Bencher) {
    let public = PublicKey::from_pem(ALICE_PUBLIC).unwrap();
    let private = PrivateKey::from_pem(ALICE_PRIVATE).unwrap();
    let sealed = encrypt_item("bench.bin", &make_data(4096), &public).unwrap();
    bencher.bench(|| {
        decrypt_item(
            divan::black_box(sealed.wrapped_key()),
            divan::black_box(sealed.ciphertext()),
            &private,
        )
        .unwrap()
    });
}

fn main() {
    divan::main();
}
