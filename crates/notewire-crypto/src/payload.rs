//! Payload-at-rest encryption for stored webhook events.
//!
//! Wraps ChaCha20-Poly1305 with the wire format `nonce || ciphertext+tag`.
//! A cipher built without a key is a pass-through: seal and unseal return
//! their input unchanged, which is the "encryption disabled" mode.
//!
//! Unseal never fails. Input that is too short to carry a nonce and tag,
//! or that fails authentication, is returned as-is. This is a deliberate
//! migration aid: an operator can enable encryption on a live store and
//! rows written before the key existed keep reading as plaintext. The
//! trade-off (pre-existing rows stay in the clear) is an operator
//! decision, not a silent failure.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CryptoError;

/// Nonce size for ChaCha20-Poly1305.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Bytes added to a payload by sealing.
pub const SEAL_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Process-wide payload cipher. `None` inside means pass-through.
pub struct PayloadCipher {
    cipher: Option<ChaCha20Poly1305>,
}

impl PayloadCipher {
    /// Build a cipher from a hex-encoded 32-byte key (64 hex chars).
    pub fn from_hex_key(hex_key: &str) -> Result<Self, CryptoError> {
        let key_bytes =
            hex::decode(hex_key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        if key_bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: key_bytes.len(),
            });
        }

        let key = Key::from_slice(&key_bytes);
        Ok(Self {
            cipher: Some(ChaCha20Poly1305::new(key)),
        })
    }

    /// Build the disabled cipher: seal and unseal are the identity.
    pub const fn passthrough() -> Self {
        Self { cipher: None }
    }

    /// Build from the configuration value: empty string disables.
    pub fn from_config(hex_key: &str) -> Result<Self, CryptoError> {
        if hex_key.is_empty() {
            Ok(Self::passthrough())
        } else {
            Self::from_hex_key(hex_key)
        }
    }

    /// Whether encryption is active.
    pub const fn is_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    /// Seal a payload for storage.
    ///
    /// Samples a fresh random nonce per call, so two seals of the same
    /// payload yield distinct ciphertexts.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let Some(cipher) = &self.cipher else {
            return Ok(plaintext.to_vec());
        };

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::SealFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Unseal a stored payload.
    ///
    /// Pass-through when the cipher is disabled, when the input is too
    /// short to be sealed, or when authentication fails (a row written
    /// before encryption was enabled).
    pub fn unseal(&self, stored: &[u8]) -> Vec<u8> {
        let Some(cipher) = &self.cipher else {
            return stored.to_vec();
        };

        if stored.len() < SEAL_OVERHEAD {
            return stored.to_vec();
        }

        let (nonce_bytes, ciphertext) = stored.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        match cipher.decrypt(nonce, ciphertext) {
            Ok(plaintext) => plaintext,
            Err(_) => stored.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn test_cipher() -> PayloadCipher {
        PayloadCipher::from_hex_key(TEST_KEY).unwrap()
    }

    #[test]
    fn seal_unseal_roundtrip() {
        let cipher = test_cipher();
        let plaintext = b"{\"title\":\"hello\"}";

        let sealed = cipher.seal(plaintext).unwrap();
        assert_ne!(sealed.as_slice(), plaintext.as_slice());
        assert_eq!(sealed.len(), plaintext.len() + SEAL_OVERHEAD);

        assert_eq!(cipher.unseal(&sealed), plaintext);
    }

    #[test]
    fn seal_twice_yields_distinct_ciphertexts() {
        let cipher = test_cipher();
        let sealed_a = cipher.seal(b"same payload").unwrap();
        let sealed_b = cipher.seal(b"same payload").unwrap();
        assert_ne!(sealed_a, sealed_b);
    }

    #[test]
    fn seal_empty_payload() {
        let cipher = test_cipher();
        let sealed = cipher.seal(b"").unwrap();
        assert_eq!(sealed.len(), SEAL_OVERHEAD);
        assert!(cipher.unseal(&sealed).is_empty());
    }

    #[test]
    fn seal_large_payload() {
        let cipher = test_cipher();
        let plaintext = vec![0xABu8; 1024 * 1024];
        let sealed = cipher.seal(&plaintext).unwrap();
        assert_eq!(cipher.unseal(&sealed), plaintext);
    }

    #[test]
    fn passthrough_is_identity_both_ways() {
        let cipher = PayloadCipher::passthrough();
        assert!(!cipher.is_enabled());
        assert_eq!(cipher.seal(b"raw bytes").unwrap(), b"raw bytes");
        assert_eq!(cipher.unseal(b"raw bytes"), b"raw bytes");
    }

    #[test]
    fn unseal_short_input_passes_through() {
        let cipher = test_cipher();
        // Shorter than nonce + tag: cannot be sealed data
        let short = b"plaintext under 28 b";
        assert!(short.len() < SEAL_OVERHEAD);
        assert_eq!(cipher.unseal(short), short);
    }

    #[test]
    fn unseal_unauthenticated_input_passes_through() {
        let cipher = test_cipher();
        // Long enough to look sealed, but it never was
        let legacy_row = vec![0x42u8; 100];
        assert_eq!(cipher.unseal(&legacy_row), legacy_row);
    }

    #[test]
    fn unseal_tampered_ciphertext_passes_through() {
        let cipher = test_cipher();
        let mut sealed = cipher.seal(b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        // Authentication fails, so the raw bytes come back unchanged
        assert_eq!(cipher.unseal(&sealed), sealed);
    }

    #[test]
    fn unseal_with_wrong_key_passes_through() {
        let cipher = test_cipher();
        let other = PayloadCipher::from_hex_key(
            "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .unwrap();

        let sealed = cipher.seal(b"secret").unwrap();
        assert_eq!(other.unseal(&sealed), sealed);
    }

    #[test]
    fn from_config_empty_disables() {
        let cipher = PayloadCipher::from_config("").unwrap();
        assert!(!cipher.is_enabled());
    }

    #[test]
    fn from_config_valid_key_enables() {
        let cipher = PayloadCipher::from_config(TEST_KEY).unwrap();
        assert!(cipher.is_enabled());
    }

    #[test]
    fn from_hex_key_rejects_bad_hex() {
        let result = PayloadCipher::from_hex_key("not hex at all");
        assert!(matches!(result, Err(CryptoError::InvalidKey(_))));
    }

    #[test]
    fn from_hex_key_rejects_wrong_length() {
        let result = PayloadCipher::from_hex_key("00ff00ff");
        assert!(matches!(
            result,
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 4
            })
        ));
    }

    #[test]
    fn binary_payload_roundtrip() {
        let cipher = test_cipher();
        let plaintext: Vec<u8> = (0..=255).collect();
        let sealed = cipher.seal(&plaintext).unwrap();
        assert_eq!(cipher.unseal(&sealed), plaintext);
    }
}
