//! Ticket signing and verification
//!
//! Tickets are signed with a single process-wide Ed25519 keypair. The signed
//! payload is the ticket id; gates verify the detached signature before any
//! storage lookup.

use ed25519_dalek::{
    Signature, Signer, SigningKey, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH,
    SIGNATURE_LENGTH,
};
use rand::rngs::OsRng;

use crate::crypto::strkey;

/// Ed25519 signature (64 bytes)
pub type Signature64 = [u8; SIGNATURE_LENGTH];

/// Ed25519 public key (32 bytes)
pub type PublicKey32 = [u8; PUBLIC_KEY_LENGTH];

/// Ed25519 secret key (32 bytes)
pub type SecretKey32 = [u8; SECRET_KEY_LENGTH];

/// Error type for signing operations
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("invalid signature format")]
    InvalidSignatureFormat,

    #[error("invalid public key format")]
    InvalidPublicKeyFormat,

    #[error("invalid secret key format")]
    InvalidSecretKeyFormat,

    #[error("ticket signing key is not configured")]
    MissingSecretKey,

    #[error("signature verification failed")]
    VerificationFailed,
}

// ============================================================================
// Key Parsing
// ============================================================================

/// Parse a secret key from an `S...` seed or 32-byte hex (with or without 0x prefix)
pub fn parse_secret_key(value: &str) -> Result<SecretKey32, SigningError> {
    let value = value.trim();
    if value.starts_with('S') {
        return strkey::decode_seed(value).map_err(|_| SigningError::InvalidSecretKeyFormat);
    }
    decode_hex_32(value).ok_or(SigningError::InvalidSecretKeyFormat)
}

/// Parse a public key from a `G...` account id or 32-byte hex (with or without 0x prefix)
pub fn parse_public_key(value: &str) -> Result<PublicKey32, SigningError> {
    let value = value.trim();
    if value.starts_with('G') {
        return strkey::decode_account_id(value).map_err(|_| SigningError::InvalidPublicKeyFormat);
    }
    decode_hex_32(value).ok_or(SigningError::InvalidPublicKeyFormat)
}

fn decode_hex_32(value: &str) -> Option<[u8; 32]> {
    let value = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(value).ok()?.try_into().ok()
}

/// Parse a signature from hex (with or without 0x prefix)
pub fn signature_from_hex(hex_str: &str) -> Result<Signature64, SigningError> {
    let hex_str = hex_str.trim();
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(hex_str).map_err(|_| SigningError::InvalidSignatureFormat)?;
    bytes
        .try_into()
        .map_err(|_| SigningError::InvalidSignatureFormat)
}

// ============================================================================
// Ticket Signer
// ============================================================================

/// Process-wide ticket signer.
///
/// Construction never fails: malformed or missing keys are detected lazily so
/// that `sign` reports a [`SigningError`] and `verify` returns `false`.
#[derive(Clone)]
pub struct TicketSigner {
    signing_key: Option<SigningKey>,
    verifying_key: Option<VerifyingKey>,
}

impl TicketSigner {
    /// Build a signer from configured secret and public key strings.
    ///
    /// If no public key is configured it is derived from the secret.
    pub fn from_config(secret: Option<&str>, public: Option<&str>) -> Self {
        let signing_key = match secret.map(parse_secret_key) {
            Some(Ok(bytes)) => Some(SigningKey::from_bytes(&bytes)),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Ticket signing secret is malformed");
                None
            }
            None => None,
        };

        let verifying_key = match public {
            Some(value) => parse_public_key(value)
                .ok()
                .and_then(|bytes| VerifyingKey::from_bytes(&bytes).ok()),
            None => signing_key.as_ref().map(|k| k.verifying_key()),
        };

        if signing_key.is_none() {
            tracing::warn!("Ticket signing key not configured; issuance will fail");
        }

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Generate a fresh random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key: Some(signing_key),
            verifying_key: Some(verifying_key),
        }
    }

    /// Create from raw secret key bytes
    pub fn from_secret_bytes(bytes: &SecretKey32) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key: Some(signing_key),
            verifying_key: Some(verifying_key),
        }
    }

    /// Public key as a `G...` account id, if configured
    pub fn public_key_strkey(&self) -> Option<String> {
        self.verifying_key
            .as_ref()
            .map(|k| strkey::encode_account_id(&k.to_bytes()))
    }

    /// Sign a payload and return the hex-encoded signature
    pub fn sign(&self, payload: &[u8]) -> Result<String, SigningError> {
        let key = self
            .signing_key
            .as_ref()
            .ok_or(SigningError::MissingSecretKey)?;
        Ok(hex::encode(key.sign(payload).to_bytes()))
    }

    /// Verify a hex-encoded signature over a payload.
    ///
    /// Total: any malformed input or missing key yields `false`.
    pub fn verify(&self, payload: &[u8], signature_hex: &str) -> bool {
        let Some(key) = self.verifying_key.as_ref() else {
            return false;
        };
        let Ok(signature) = signature_from_hex(signature_hex) else {
            return false;
        };
        key.verify(payload, &Signature::from_bytes(&signature))
            .is_ok()
    }
}

impl std::fmt::Debug for TicketSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketSigner")
            .field("public_key", &self.public_key_strkey())
            .field("can_sign", &self.signing_key.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Verify a detached signature from an arbitrary public key.
///
/// Used for wallet ownership proofs where the signer is the wallet holder.
pub fn verify_detached(
    public_key: &str,
    message: &[u8],
    signature_hex: &str,
) -> Result<(), SigningError> {
    let public_key = parse_public_key(public_key)?;
    let verifying_key =
        VerifyingKey::from_bytes(&public_key).map_err(|_| SigningError::InvalidPublicKeyFormat)?;
    let signature = signature_from_hex(signature_hex)?;
    verifying_key
        .verify(message, &Signature::from_bytes(&signature))
        .map_err(|_| SigningError::VerificationFailed)
}

/// Generate a new Stellar-style keypair as `(G..., S...)` strings
pub fn generate_keypair_strkeys() -> (String, String) {
    let signing_key = SigningKey::generate(&mut OsRng);
    (
        strkey::encode_account_id(&signing_key.verifying_key().to_bytes()),
        strkey::encode_seed(&signing_key.to_bytes()),
    )
}

/// Derive the `G...` account id from an `S...` seed
pub fn account_id_from_seed(seed: &str) -> Result<String, SigningError> {
    let secret = parse_secret_key(seed)?;
    let signing_key = SigningKey::from_bytes(&secret);
    Ok(strkey::encode_account_id(
        &signing_key.verifying_key().to_bytes(),
    ))
}

/// Sign a message with an `S...` seed, returning hex
pub fn sign_with_seed(seed: &str, message: &[u8]) -> Result<String, SigningError> {
    let secret = parse_secret_key(seed)?;
    Ok(hex::encode(
        SigningKey::from_bytes(&secret).sign(message).to_bytes(),
    ))
}

// ============================================================================
// Tests
// ============================================================================
