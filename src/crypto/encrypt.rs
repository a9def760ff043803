//! At-rest encryption for escrow secrets
//!
//! AES-256-GCM keyed by SHA-256 of the configured passphrase. Ciphertexts are
//! stored as a colon-separated hex envelope:
//!
//! ```text
//! hex(iv[12]) ":" hex(tag[16]) ":" hex(ciphertext)
//! ```
//!
//! Decryption fails closed on any format or authentication error.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Encryption key (32 bytes for AES-256)
pub type EncryptionKey = [u8; 32];

/// Nonce size for AES-GCM (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Error type for encryption operations
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid ciphertext envelope")]
    InvalidEnvelope,

    #[error("decrypted secret is not valid UTF-8")]
    InvalidPlaintext,
}

/// Derive the AES key from a passphrase
pub fn derive_key(passphrase: &str) -> EncryptionKey {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// Symmetric cipher for secrets stored at rest
#[derive(Clone)]
pub struct SecretCipher {
    key: EncryptionKey,
}

impl SecretCipher {
    /// Create a cipher from the configured passphrase
    pub fn new(passphrase: &str) -> Self {
        Self {
            key: derive_key(passphrase),
        }
    }

    /// Encrypt a secret into the `iv:tag:ciphertext` envelope
    pub fn encrypt_secret(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        // aes-gcm appends the tag to the ciphertext
        let sealed = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt an `iv:tag:ciphertext` envelope
    pub fn decrypt_secret(&self, envelope: &str) -> Result<String, EncryptionError> {
        let mut parts = envelope.split(':');
        let (Some(iv_hex), Some(tag_hex), Some(ct_hex), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(EncryptionError::InvalidEnvelope);
        };

        let iv = hex::decode(iv_hex).map_err(|_| EncryptionError::InvalidEnvelope)?;
        let tag = hex::decode(tag_hex).map_err(|_| EncryptionError::InvalidEnvelope)?;
        let ciphertext = hex::decode(ct_hex).map_err(|_| EncryptionError::InvalidEnvelope)?;

        if iv.len() != NONCE_SIZE || tag.len() != TAG_SIZE {
            return Err(EncryptionError::InvalidEnvelope);
        }

        let cipher =
            Aes256Gcm::new_from_slice(&self.key).map_err(|_| EncryptionError::DecryptionFailed)?;

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| EncryptionError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| EncryptionError::InvalidPlaintext)
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECRET: &str = "SESCROW_SECRET_KEY_ABC123";

    #[test]
    fn test_envelope_has_three_segments() {
        let cipher = SecretCipher::new("test-encryption-secret-32-chars!!");
        let envelope = cipher.encrypt_secret(SECRET).unwrap();

        let parts: Vec<&str> = envelope.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), NONCE_SIZE * 2);
        assert_eq!(parts[1].len(), TAG_SIZE * 2);
        assert!(!envelope.contains(SECRET));
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = SecretCipher::new("passphrase");
        let envelope = cipher.encrypt_secret(SECRET).unwrap();
        assert_eq!(cipher.decrypt_secret(&envelope).unwrap(), SECRET);
    }

    #[test]
    fn test_fresh_iv_per_encryption() {
        let cipher = SecretCipher::new("passphrase");
        let a = cipher.encrypt_secret(SECRET).unwrap();
        let b = cipher.encrypt_secret(SECRET).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let envelope = SecretCipher::new("one").encrypt_secret(SECRET).unwrap();
        assert!(matches!(
            SecretCipher::new("two").decrypt_secret(&envelope),
            Err(EncryptionError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampered_tag_fails_closed() {
        let cipher = SecretCipher::new("passphrase");
        let envelope = cipher.encrypt_secret(SECRET).unwrap();
        let mut parts: Vec<String> = envelope.split(':').map(String::from).collect();
        parts[1] = "00".repeat(TAG_SIZE);
        assert!(matches!(
            cipher.decrypt_secret(&parts.join(":")),
            Err(EncryptionError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_malformed_envelopes() {
        let cipher = SecretCipher::new("passphrase");
        for bad in ["", "abc", "aa:bb", "aa:bb:cc:dd", "zz:zz:zz"] {
            assert!(matches!(
                cipher.decrypt_secret(bad),
                Err(EncryptionError::InvalidEnvelope)
            ));
        }
    }

    proptest! {
        #[test]
        fn prop_roundtrip(secret in "[A-Z2-7]{1,64}", passphrase in ".{1,32}") {
            let cipher = SecretCipher::new(&passphrase);
            let envelope = cipher.encrypt_secret(&secret).unwrap();
            prop_assert_eq!(cipher.decrypt_secret(&envelope).unwrap(), secret);
        }

        /// Flipping any byte of the iv, tag or ciphertext segment is detected
        #[test]
        fn prop_flipped_byte_fails_closed(
            segment in 0usize..3,
            position in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let cipher = SecretCipher::new("passphrase");
            let envelope = cipher.encrypt_secret(SECRET).unwrap();
            let mut parts: Vec<Vec<u8>> = envelope
                .split(':')
                .map(|part| hex::decode(part).unwrap())
                .collect();
            let bytes = &mut parts[segment];
            let index = position.index(bytes.len());
            bytes[index] ^= flip;
            let tampered = parts.iter().map(hex::encode).collect::<Vec<_>>().join(":");

            prop_assert!(matches!(
                cipher.decrypt_secret(&tampered),
                Err(EncryptionError::DecryptionFailed)
            ));
        }
    }
}
