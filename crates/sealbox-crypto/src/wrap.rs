//! RSA-OAEP(SHA-256) wrapping of the metadata record
//!
//! One RSA block carries the whole record, so its size is bounded by
//! `modulus_bytes - 2 * hash_len - 2`: 190 bytes for a 2048-bit key.
//!
//! Unwrap failures are deliberately indistinguishable: wrong key, wrong
//! padding and corruption all produce the same `UnwrapError`. Decryption uses
//! RSA blinding, but the underlying big-integer code is not audited
//! constant-time.

use rand::rngs::OsRng;
use rsa::Oaep;
use sealbox_core::{SealboxError, SealboxResult};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::keys::{PrivateKey, PublicKey};

/// SHA-256 output length
const OAEP_HASH_LEN: usize = 32;

/// Bytes of OAEP padding per block
pub const OAEP_OVERHEAD: usize = 2 * OAEP_HASH_LEN + 2;

/// The encrypting half of a key pair.
pub trait WrappingKey {
    /// Largest payload `wrap_payload` accepts.
    fn max_payload_len(&self) -> usize;

    fn wrap_payload(&self, payload: &[u8]) -> SealboxResult<Vec<u8>>;
}

/// The decrypting half of a key pair.
pub trait UnwrappingKey {
    fn unwrap_payload(&self, blob: &[u8]) -> SealboxResult<Zeroizing<Vec<u8>>>;
}

impl WrappingKey for PublicKey {
    fn max_payload_len(&self) -> usize {
        self.size().saturating_sub(OAEP_OVERHEAD)
    }

    fn wrap_payload(&self, payload: &[u8]) -> SealboxResult<Vec<u8>> {
        let max = self.max_payload_len();
        if payload.len() > max {
            return Err(SealboxError::PayloadTooLarge {
                len: payload.len(),
                max,
            });
        }

        self.rsa()
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), payload)
            .map_err(|e| match e {
                rsa::Error::MessageTooLong => SealboxError::PayloadTooLarge {
                    len: payload.len(),
                    max,
                },
                other => SealboxError::Other(anyhow::anyhow!("RSA-OAEP encryption failed: {other}")),
            })
    }
}

impl UnwrappingKey for PrivateKey {
    fn unwrap_payload(&self, blob: &[u8]) -> SealboxResult<Zeroizing<Vec<u8>>> {
        if blob.len() != self.size() {
            return Err(SealboxError::UnwrapError);
        }
        self.rsa()
            .decrypt_blinded(&mut OsRng, Oaep::new::<Sha256>(), blob)
            .map(Zeroizing::new)
            .map_err(|_| SealboxError::UnwrapError)
    }
}

/// Wrap `metadata` so only the holder of the matching private key can read it.
pub fn wrap(metadata: &[u8], public: &impl WrappingKey) -> SealboxResult<Vec<u8>> {
    public.wrap_payload(metadata)
}

/// Inverse of [`wrap`].
pub fn unwrap(blob: &[u8], private: &impl UnwrappingKey) -> SealboxResult<Zeroizing<Vec<u8>>> {
    private.unwrap_payload(blob)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE_PRIVATE: &str = include_str!("../tests/fixtures/alice_private.pem");
    const ALICE_PUBLIC: &str = include_str!("../tests/fixtures/alice_public.pem");
    const BOB_PRIVATE: &str = include_str!("../tests/fixtures/bob_private.pem");
    const SMALL_PUBLIC: &str = include_str!("../tests/fixtures/small_public.pem");

    fn alice() -> (PublicKey, PrivateKey) {
        (
            PublicKey::from_pem(ALICE_PUBLIC).unwrap(),
            PrivateKey::from_pem(ALICE_PRIVATE).unwrap(),
        )
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let (public, private) = alice();
        let payload = br#"{"filename":"a.txt","key":"AAAA"}"#;

        let blob = wrap(payload, &public).unwrap();
        assert_eq!(blob.len(), 256, "wrapped blob is one modulus long");

        let opened = unwrap(&blob, &private).unwrap();
        assert_eq!(opened.as_slice(), payload);
    }

    #[test]
    fn test_wrap_is_randomized() {
        let (public, _) = alice();
        let a = wrap(b"same", &public).unwrap();
        let b = wrap(b"same", &public).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_max_payload_2048() {
        let (public, _) = alice();
        assert_eq!(public.max_payload_len(), 190);
    }

    #[test]
    fn test_payload_at_bound_fits() {
        let (public, private) = alice();
        let payload = vec![0x5Au8; 190];

        let blob = wrap(&payload, &public).unwrap();
        assert_eq!(unwrap(&blob, &private).unwrap().as_slice(), payload.as_slice());
    }

    #[test]
    fn test_payload_too_large() {
        let (public, _) = alice();
        let err = wrap(&[0u8; 191], &public).unwrap_err();
        assert!(matches!(
            err,
            SealboxError::PayloadTooLarge { len: 191, max: 190 }
        ));
    }

    #[test]
    fn test_small_modulus_bound() {
        let public = PublicKey::from_pem(SMALL_PUBLIC).unwrap();
        // 1024-bit: 128 - 66
        assert_eq!(public.max_payload_len(), 62);
        assert!(matches!(
            wrap(&[0u8; 63], &public),
            Err(SealboxError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_unwrap_wrong_private_key() {
        let (public, _) = alice();
        let bob = PrivateKey::from_pem(BOB_PRIVATE).unwrap();

        let blob = wrap(b"for alice only", &public).unwrap();
        assert!(matches!(unwrap(&blob, &bob), Err(SealboxError::UnwrapError)));
    }

    #[test]
    fn test_unwrap_corrupted_blob() {
        let (public, private) = alice();
        let mut blob = wrap(b"payload", &public).unwrap();
        blob[100] ^= 0x01;

        assert!(matches!(unwrap(&blob, &private), Err(SealboxError::UnwrapError)));
    }

    #[test]
    fn test_unwrap_other_padding() {
        let (public, private) = alice();
        let blob = public
            .rsa()
            .encrypt(&mut OsRng, rsa::Pkcs1v15Encrypt, b"pkcs1 v1.5 payload")
            .unwrap();
        assert_eq!(blob.len(), 256);

        assert!(matches!(unwrap(&blob, &private), Err(SealboxError::UnwrapError)));
    }

    #[test]
    fn test_unwrap_wrong_length() {
        let (_, private) = alice();
        for len in [0, 1, 255, 257] {
            assert!(matches!(
                unwrap(&vec![1u8; len], &private),
                Err(SealboxError::UnwrapError)
            ));
        }
    }

    #[test]
    fn test_unwrap_errors_share_one_message() {
        let (public, private) = alice();
        let bob = PrivateKey::from_pem(BOB_PRIVATE).unwrap();
        let blob = wrap(b"payload", &public).unwrap();

        let wrong_key = unwrap(&blob, &bob).unwrap_err().to_string();
        let short = unwrap(&blob[..10], &private).unwrap_err().to_string();
        assert_eq!(wrong_key, short);
    }
}
