//! Salsa20 variant used by encrypted BLTE blocks
//!
//! CASC keys are 16 bytes, so the state uses the "expand 16-byte k" constants
//! with the key repeated. The 4-byte block IV has the block index XORed into
//! its little-endian bytes and is zero-padded to the 8-byte nonce.

const TAU: [u32; 4] = [0x6170_7865, 0x3120_646e, 0x7962_2d36, 0x6b20_6574];

/// Salsa20 keystream generator for one BLTE block
pub struct Salsa20Cipher {
    state: [u32; 16],
    keystream: [u8; 64],
    keystream_pos: usize,
}

impl Salsa20Cipher {
    /// Create the cipher for block `block_index` of a BLTE stream
    pub fn new(key: &[u8; 16], iv: &[u8; 4], block_index: u32) -> Self {
        let mut nonce = [0u8; 8];
        for (out, (iv_byte, idx_byte)) in nonce
            .iter_mut()
            .zip(iv.iter().zip(block_index.to_le_bytes()))
        {
            *out = iv_byte ^ idx_byte;
        }
        Self::with_nonce(key, &nonce)
    }

    /// Create the cipher from an already derived 8-byte nonce
    pub fn with_nonce(key: &[u8; 16], nonce: &[u8; 8]) -> Self {
        let word = |b: &[u8]| u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        let k = [word(&key[0..4]), word(&key[4..8]), word(&key[8..12]), word(&key[12..16])];

        let state = [
            TAU[0],
            k[0],
            k[1],
            k[2],
            k[3],
            TAU[1],
            word(&nonce[0..4]),
            word(&nonce[4..8]),
            0,
            0,
            TAU[2],
            k[0],
            k[1],
            k[2],
            k[3],
            TAU[3],
        ];

        Self {
            state,
            keystream: [0; 64],
            keystream_pos: 64,
        }
    }

    fn generate_keystream(&mut self) {
        let mut x = self.state;

        for _ in 0..10 {
            Self::quarter_round(&mut x, 0, 4, 8, 12);
            Self::quarter_round(&mut x, 5, 9, 13, 1);
            Self::quarter_round(&mut x, 10, 14, 2, 6);
            Self::quarter_round(&mut x, 15, 3, 7, 11);

            Self::quarter_round(&mut x, 0, 1, 2, 3);
            Self::quarter_round(&mut x, 5, 6, 7, 4);
            Self::quarter_round(&mut x, 10, 11, 8, 9);
            Self::quarter_round(&mut x, 15, 12, 13, 14);
        }

        for (i, (out, init)) in x.iter().zip(self.state.iter()).enumerate() {
            self.keystream[i * 4..(i + 1) * 4].copy_from_slice(&out.wrapping_add(*init).to_le_bytes());
        }

        self.state[8] = self.state[8].wrapping_add(1);
        if self.state[8] == 0 {
            self.state[9] = self.state[9].wrapping_add(1);
        }
        self.keystream_pos = 0;
    }

    fn quarter_round(s: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
        s[b] ^= s[a].wrapping_add(s[d]).rotate_left(7);
        s[c] ^= s[b].wrapping_add(s[a]).rotate_left(9);
        s[d] ^= s[c].wrapping_add(s[b]).rotate_left(13);
        s[a] ^= s[d].wrapping_add(s[c]).rotate_left(18);
    }

    /// XOR the keystream into `data`; encryption and decryption are the same
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            if self.keystream_pos >= 64 {
                self.generate_keystream();
            }
            *byte ^= self.keystream[self.keystream_pos];
            self.keystream_pos += 1;
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [
        0xBD, 0xC5, 0x18, 0x62, 0xAB, 0xED, 0x79, 0xB2, 0xDE, 0x48, 0xC8, 0xE7, 0xE6, 0x6C, 0x62,
        0x00,
    ];

    #[test]
    fn test_estream_vector() {
        // eSTREAM Salsa20/20 128-bit key, set 1 vector 0
        let mut key = [0u8; 16];
        key[0] = 0x80;
        let mut stream = [0u8; 64];
        Salsa20Cipher::with_nonce(&key, &[0; 8]).apply_keystream(&mut stream);
        assert_eq!(
            hex::encode_upper(stream),
            "4DFA5E481DA23EA09A31022050859936DA52FCEE218005164F267CB65F5CFD7F\
             2B4F97E0FF16924A52DF269515110A07F9E460BC65EF95DA58F740B7D1DBB0AA"
        );
    }

    #[test]
    fn test_keystream_is_symmetric() {
        let original: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
        let mut data = original.clone();

        Salsa20Cipher::new(&KEY, &[1, 2, 3, 4], 0).apply_keystream(&mut data);
        assert_ne!(data, original);

        Salsa20Cipher::new(&KEY, &[1, 2, 3, 4], 0).apply_keystream(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn test_block_index_changes_keystream() {
        let mut first = [0u8; 32];
        let mut second = [0u8; 32];
        Salsa20Cipher::new(&KEY, &[1, 2, 3, 4], 0).apply_keystream(&mut first);
        Salsa20Cipher::new(&KEY, &[1, 2, 3, 4], 1).apply_keystream(&mut second);
        assert_ne!(first, second);
    }

    #[test]
    fn test_block_index_xors_into_iv() {
        let mut derived = [0u8; 32];
        let mut explicit = [0u8; 32];
        Salsa20Cipher::new(&KEY, &[0x10, 0x20, 0x30, 0x40], 0x0102).apply_keystream(&mut derived);
        Salsa20Cipher::with_nonce(&KEY, &[0x12, 0x21, 0x30, 0x40, 0, 0, 0, 0])
            .apply_keystream(&mut explicit);
        assert_eq!(derived, explicit);
    }

    #[test]
    fn test_split_application_matches_single_pass() {
        let mut whole = [0u8; 150];
        Salsa20Cipher::new(&KEY, &[9, 9, 9, 9], 3).apply_keystream(&mut whole);

        let mut parts = [0u8; 150];
        let mut cipher = Salsa20Cipher::new(&KEY, &[9, 9, 9, 9], 3);
        let (a, b) = parts.split_at_mut(70);
        cipher.apply_keystream(a);
        cipher.apply_keystream(b);
        assert_eq!(whole, parts);
    }
}
