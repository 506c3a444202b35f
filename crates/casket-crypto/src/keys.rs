//! TACT encryption key names and key material
//!
//! Encrypted BLTE blocks name their key with 8 raw bytes. The textual form used
//! by key lists and the keyring file is the byte-reversed hex of those bytes,
//! which is simply the little-endian `u64` printed as 16 hex digits.

use std::fmt;
use std::str::FromStr;

use crate::error::CryptoError;

/// 64-bit key name of a TACT encryption key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyName(pub u64);

impl KeyName {
    /// Build a key name from the 8 bytes stored in an encrypted block header
    pub const fn from_block_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    /// Raw 64-bit value
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for KeyName {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 16 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CryptoError::InvalidKeyName(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKeyName(format!("{s}: {e}")))
    }
}

/// A TACT encryption key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TactKey {
    /// Key name
    pub name: KeyName,
    /// 16-byte encryption key
    pub key: [u8; 16],
}

impl TactKey {
    /// Create a new TACT key
    pub const fn new(name: KeyName, key: [u8; 16]) -> Self {
        Self { name, key }
    }

    /// Parse a key pair from its textual form (16 hex name, 32 hex key)
    pub fn from_hex_pair(name: &str, key: &str) -> Result<Self, CryptoError> {
        let name: KeyName = name.parse()?;
        let key = key.trim();
        if key.len() != 32 {
            return Err(CryptoError::InvalidKeySize {
                expected: 32,
                actual: key.len(),
            });
        }

        let mut bytes = [0u8; 16];
        hex::decode_to_slice(key, &mut bytes)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("invalid hex: {e}")))?;
        Ok(Self::new(name, bytes))
    }

    /// Lowercase hex of the key material
    pub fn key_hex(&self) -> String {
        hex::encode(self.key)
    }
}

impl fmt::Display for TactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.key_hex())
    }
}

/// Parse a key list of `name key` lines
///
/// A usable line holds exactly two space-separated tokens. Every other line
/// is skipped; invalid pairs are returned separately so callers can log them.
pub fn parse_key_list(content: &str) -> (Vec<TactKey>, Vec<String>) {
    let mut keys = Vec::new();
    let mut rejected = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split(' ').collect();
        if parts.len() != 2 {
            continue;
        }

        match TactKey::from_hex_pair(parts[0].trim(), parts[1].trim()) {
            Ok(key) => keys.push(key),
            Err(_) => rejected.push(line.to_string()),
        }
    }

    (keys, rejected)
}
