//! Stellar StrKey encoding
//!
//! Account ids (`G...`) and secret seeds (`S...`) are rendered as
//! `base32(version_byte || key(32) || crc16_xmodem_le(2))` without padding.

/// Version byte for ed25519 account ids (renders as `G`)
pub const VERSION_ACCOUNT_ID: u8 = 6 << 3;

/// Version byte for ed25519 secret seeds (renders as `S`)
pub const VERSION_SEED: u8 = 18 << 3;

/// Encoded StrKey length for 32-byte keys
pub const STRKEY_LEN: usize = 56;

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Error type for StrKey decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrKeyError {
    #[error("invalid strkey length")]
    InvalidLength,

    #[error("invalid base32 character")]
    InvalidCharacter,

    #[error("unexpected version byte: expected {expected}, got {actual}")]
    InvalidVersion { expected: u8, actual: u8 },

    #[error("checksum mismatch")]
    InvalidChecksum,
}

/// Kind of key carried by a StrKey
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrKeyKind {
    AccountId,
    Seed,
}

impl StrKeyKind {
    fn version_byte(self) -> u8 {
        match self {
            StrKeyKind::AccountId => VERSION_ACCOUNT_ID,
            StrKeyKind::Seed => VERSION_SEED,
        }
    }
}

/// Encode a 32-byte key as a StrKey of the given kind
pub fn encode(kind: StrKeyKind, key: &[u8; 32]) -> String {
    let mut raw = Vec::with_capacity(35);
    raw.push(kind.version_byte());
    raw.extend_from_slice(key);
    let crc = crc16_xmodem(&raw);
    raw.extend_from_slice(&crc.to_le_bytes());
    base32_encode(&raw)
}

/// Decode a StrKey of the given kind into its 32-byte key
pub fn decode(kind: StrKeyKind, encoded: &str) -> Result<[u8; 32], StrKeyError> {
    if encoded.len() != STRKEY_LEN {
        return Err(StrKeyError::InvalidLength);
    }

    let raw = base32_decode(encoded)?;
    if raw.len() != 35 {
        return Err(StrKeyError::InvalidLength);
    }

    let expected = kind.version_byte();
    if raw[0] != expected {
        return Err(StrKeyError::InvalidVersion {
            expected,
            actual: raw[0],
        });
    }

    let (body, checksum) = raw.split_at(33);
    let crc = crc16_xmodem(body).to_le_bytes();
    if checksum != crc {
        return Err(StrKeyError::InvalidChecksum);
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&body[1..]);
    Ok(key)
}

/// Encode an ed25519 public key as a `G...` account id
pub fn encode_account_id(key: &[u8; 32]) -> String {
    encode(StrKeyKind::AccountId, key)
}

/// Decode a `G...` account id
pub fn decode_account_id(encoded: &str) -> Result<[u8; 32], StrKeyError> {
    decode(StrKeyKind::AccountId, encoded)
}

/// Encode an ed25519 seed as an `S...` secret
pub fn encode_seed(seed: &[u8; 32]) -> String {
    encode(StrKeyKind::Seed, seed)
}

/// Decode an `S...` secret seed
pub fn decode_seed(encoded: &str) -> Result<[u8; 32], StrKeyError> {
    decode(StrKeyKind::Seed, encoded)
}

/// Whether the string is a well-formed `G...` account id
pub fn is_valid_account_id(encoded: &str) -> bool {
    decode_account_id(encoded).is_ok()
}

// ============================================================================
// Primitives
// ============================================================================

fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for byte in data {
        buffer = (buffer << 8) | *byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    out
}

fn base32_decode(encoded: &str) -> Result<Vec<u8>, StrKeyError> {
    let mut out = Vec::with_capacity(encoded.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for c in encoded.bytes() {
        let value = match c {
            b'A'..=b'Z' => c - b'A',
            b'2'..=b'7' => c - b'2' + 26,
            _ => return Err(StrKeyError::InvalidCharacter),
        };
        buffer = (buffer << 5) | value as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }

    // Leftover bits must be zero for a canonical encoding
    if bits > 0 && buffer & ((1 << bits) - 1) != 0 {
        return Err(StrKeyError::InvalidCharacter);
    }

    Ok(out)
}
