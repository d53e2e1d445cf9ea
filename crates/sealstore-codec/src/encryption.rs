//! AES-256-GCM and ChaCha20-Poly1305 AEAD frame encryption
//!
//! Each encoded frame is self-contained: a random 96-bit nonce followed by
//! the ciphertext with its 16-byte authentication tag. The frame boundary
//! carries the length, so no further framing is embedded here.

use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CodecError, CodecResult};

/// Nonce length in bytes for both supported AEAD ciphers.
pub const NONCE_LEN: usize = 12;

/// 256-bit (32-byte) encryption key. Supplied by the caller; sealstore does
/// not derive, wrap, or rotate keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey(pub [u8; 32]);

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

/// AEAD cipher selection.
///
/// The wire tag is the on-disk contract: it is written under the
/// `encryption` metadata key and compared byte-for-byte on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EncryptionAlgorithm {
    /// AES-256-GCM — hardware accelerated on x86 with AES-NI
    #[default]
    AesGcm256,
    /// ChaCha20-Poly1305 — constant-time, fast on non-AES hardware
    ChaCha20Poly1305,
}

impl EncryptionAlgorithm {
    /// Stable wire tag stored in object metadata.
    pub fn tag(&self) -> &'static str {
        match self {
            EncryptionAlgorithm::AesGcm256 => "aes256-gcm",
            EncryptionAlgorithm::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }

    /// Resolve a wire tag back to an algorithm.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "aes256-gcm" => Some(EncryptionAlgorithm::AesGcm256),
            "chacha20-poly1305" => Some(EncryptionAlgorithm::ChaCha20Poly1305),
            _ => None,
        }
    }
}

fn random_nonce() -> [u8; NONCE_LEN] {
    use rand::RngCore;
    let mut bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Encrypt one frame. The generated nonce is prepended to the ciphertext.
pub fn seal(
    plaintext: &[u8],
    key: &EncryptionKey,
    algo: EncryptionAlgorithm,
) -> CodecResult<Vec<u8>> {
    let nonce = random_nonce();
    let ciphertext = match algo {
        EncryptionAlgorithm::AesGcm256 => {
            let cipher = Aes256Gcm::new_from_slice(&key.0)
                .map_err(|e| CodecError::EncryptionFailed(e.to_string()))?;
            cipher
                .encrypt(aes_gcm::Nonce::from_slice(&nonce), plaintext)
                .map_err(|e| CodecError::EncryptionFailed(e.to_string()))?
        }
        EncryptionAlgorithm::ChaCha20Poly1305 => {
            use chacha20poly1305::aead::Aead as _;
            use chacha20poly1305::KeyInit as _;
            let cipher = ChaCha20Poly1305::new_from_slice(&key.0)
                .map_err(|e| CodecError::EncryptionFailed(e.to_string()))?;
            cipher
                .encrypt(chacha20poly1305::Nonce::from_slice(&nonce), plaintext)
                .map_err(|e| CodecError::EncryptionFailed(e.to_string()))?
        }
    };
    let mut frame = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    frame.extend_from_slice(&nonce);
    frame.extend_from_slice(&ciphertext);
    Ok(frame)
}

/// Decrypt one nonce-prefixed frame. Returns `DecryptionAuthFailed` when
/// the tag does not verify (tampered, corrupted, or wrong key).
pub fn open(frame: &[u8], key: &EncryptionKey, algo: EncryptionAlgorithm) -> CodecResult<Vec<u8>> {
    if frame.len() < NONCE_LEN {
        return Err(CodecError::TruncatedFrame);
    }
    let (nonce, ciphertext) = frame.split_at(NONCE_LEN);
    match algo {
        EncryptionAlgorithm::AesGcm256 => {
            let cipher = Aes256Gcm::new_from_slice(&key.0)
                .map_err(|e| CodecError::EncryptionFailed(e.to_string()))?;
            cipher
                .decrypt(aes_gcm::Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| CodecError::DecryptionAuthFailed)
        }
        EncryptionAlgorithm::ChaCha20Poly1305 => {
            use chacha20poly1305::aead::Aead as _;
            use chacha20poly1305::KeyInit as _;
            let cipher = ChaCha20Poly1305::new_from_slice(&key.0)
                .map_err(|e| CodecError::EncryptionFailed(e.to_string()))?;
            cipher
                .decrypt(chacha20poly1305::Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| CodecError::DecryptionAuthFailed)
        }
    }
}
