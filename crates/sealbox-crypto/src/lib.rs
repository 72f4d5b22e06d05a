//! sealbox-crypto: hybrid envelope encryption
//!
//! Every file gets its own random AES-256-GCM key. That key travels with the
//! original file name inside a small JSON metadata record, which is wrapped
//! with RSA-OAEP(SHA-256) under the recipient's public key.
//!
//! ```text
//! encrypt: plaintext ──AES-256-GCM(file key)──▶ ciphertext blob  [12 nonce][ct][16 tag]
//!          {filename, file key} ──JSON──▶ metadata ──RSA-OAEP──▶ wrapped key blob (modulus bytes)
//!
//! decrypt: wrapped key ──RSA-OAEP⁻¹(private key)──▶ metadata ──▶ {filename, file key}
//!          ciphertext ──AES-256-GCM⁻¹(file key)──▶ plaintext
//! ```

pub mod cipher;
pub mod envelope;
pub mod keys;
pub mod pipeline;
pub mod wrap;

pub use cipher::{decrypt, encrypt, generate_key, SymmetricKey};
pub use envelope::{pack_metadata, unpack_metadata, validate_name, SealedEnvelope};
pub use keys::{generate_keypair, PrivateKey, PublicKey};
pub use pipeline::{decrypt_item, encrypt_item, DecryptStage, EncryptStage, RestoredItem};
pub use wrap::{unwrap, wrap, UnwrappingKey, WrappingKey};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Minimum RSA modulus accepted by key generation
pub const MIN_RSA_BITS: usize = 2048;
