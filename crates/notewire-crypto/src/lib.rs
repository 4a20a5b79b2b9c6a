//! Notewire payload encryption library
//!
//! Authenticated encryption at rest for stored webhook payloads:
//!
//! - **Cipher**: ChaCha20-Poly1305 AEAD, process-wide 32-byte key
//! - **Format**: `nonce || ciphertext+tag`, fresh random 12-byte nonce
//!   per seal
//! - **Compatibility**: unseal passes unrecognized bytes through
//!   unchanged, so a store written before encryption was enabled keeps
//!   reading without a migration

pub mod error;
pub mod payload;

pub use error::CryptoError;
pub use payload::{PayloadCipher, NONCE_SIZE, SEAL_OVERHEAD, TAG_SIZE};
