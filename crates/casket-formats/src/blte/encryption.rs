//! Encrypted block envelope
//!
//! Layout after the `E` mode byte:
//! `[name len = 8][key name][iv len = 4][iv][cipher][ciphertext]`

use casket_crypto::{KeyName, KeyProvider, Salsa20Cipher};

use super::error::{BlteError, BlteResult};

/// Cipher identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionType {
    /// Salsa20 (`S`)
    Salsa20,
    /// ARC4 (`A`), recognised but never decrypted
    Arc4,
}

impl EncryptionType {
    /// Parse from the cipher byte
    pub fn from_byte(byte: u8) -> BlteResult<Self> {
        match byte {
            b'S' => Ok(Self::Salsa20),
            b'A' => Ok(Self::Arc4),
            other => Err(BlteError::UnsupportedEncryption(other)),
        }
    }

    /// Cipher byte
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Salsa20 => b'S',
            Self::Arc4 => b'A',
        }
    }
}

/// Parsed encryption envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedHeader {
    /// Name of the key the block is encrypted with
    pub key_name: KeyName,
    /// Block IV before mixing in the block index
    pub iv: [u8; 4],
    /// Cipher
    pub encryption_type: EncryptionType,
}

impl EncryptedHeader {
    /// Encoded size of the envelope
    pub const SIZE: usize = 1 + 8 + 1 + 4 + 1;

    /// Parse the envelope, returning it and the ciphertext that follows
    pub fn parse(data: &[u8]) -> BlteResult<(Self, &[u8])> {
        if data.len() < Self::SIZE {
            return Err(BlteError::InvalidEncryptedBlock(format!(
                "{} bytes is too short for the envelope",
                data.len()
            )));
        }

        if data[0] != 8 {
            return Err(BlteError::InvalidEncryptedBlock(format!(
                "unexpected key name size {}",
                data[0]
            )));
        }
        let mut name = [0u8; 8];
        name.copy_from_slice(&data[1..9]);

        if data[9] != 4 {
            return Err(BlteError::InvalidEncryptedBlock(format!(
                "unexpected IV size {}",
                data[9]
            )));
        }
        let mut iv = [0u8; 4];
        iv.copy_from_slice(&data[10..14]);

        let encryption_type = EncryptionType::from_byte(data[14])?;

        Ok((
            Self {
                key_name: KeyName::from_block_bytes(name),
                iv,
                encryption_type,
            },
            &data[Self::SIZE..],
        ))
    }

    /// Serialize the envelope
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0] = 8;
        out[1..9].copy_from_slice(&self.key_name.get().to_le_bytes());
        out[9] = 4;
        out[10..14].copy_from_slice(&self.iv);
        out[14] = self.encryption_type.as_byte();
        out
    }
}

/// Result of attempting to decrypt one block
#[derive(Debug)]
pub enum Decrypted {
    /// Plaintext, itself a typed block
    Plain(Vec<u8>),
    /// The named key is not in the provider
    MissingKey(KeyName),
}

/// Decrypt the payload of an `E` block at position `block_index`
pub fn decrypt_block(
    data: &[u8],
    block_index: usize,
    keys: &dyn KeyProvider,
) -> BlteResult<Decrypted> {
    let (header, ciphertext) = EncryptedHeader::parse(data)?;

    let Some(key) = keys.key(header.key_name) else {
        return Ok(Decrypted::MissingKey(header.key_name));
    };

    if header.encryption_type == EncryptionType::Arc4 {
        return Err(BlteError::UnsupportedEncryption(b'A'));
    }

    let mut plain = ciphertext.to_vec();
    Salsa20Cipher::new(&key, &header.iv, block_index as u32).apply_keystream(&mut plain);
    Ok(Decrypted::Plain(plain))
}

/// Encrypt a typed block into an `E` block payload (without the mode byte)
pub fn encrypt_block(
    plain: &[u8],
    key: &[u8; 16],
    header: &EncryptedHeader,
    block_index: usize,
) -> Vec<u8> {
    let mut out = header.to_bytes().to_vec();
    let start = out.len();
    out.extend_from_slice(plain);
    Salsa20Cipher::new(key, &header.iv, block_index as u32).apply_keystream(&mut out[start..]);
    out
}
