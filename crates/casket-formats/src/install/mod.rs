//! Install manifest
//!
//! Lists the files a client lays out on disk, each tagged (platform,
//! locale, ...) through one bitmask per tag.
//!
//! - **Header** (10 bytes): magic `IN`, version, hash size, tag count (BE16),
//!   file count (BE32)
//! - **Tags**: C string name, BE16 type, `ceil(files / 8)` mask bytes
//! - **Files**: C string name, hash, BE32 size

use std::io::{BufRead, Cursor, Read};

use binrw::{BinRead, BinReaderExt};
use thiserror::Error;

/// Errors from install manifest parsing
#[derive(Debug, Error)]
pub enum InstallError {
    /// Magic is not `IN`
    #[error("invalid install manifest magic: {0:02x?}")]
    InvalidMagic([u8; 2]),

    /// Data ended early
    #[error("install manifest truncated while reading {0}")]
    Truncated(&'static str),

    /// Header could not be read
    #[error("binary read error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Fixed manifest header
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead)]
#[br(big)]
pub struct InstallHeader {
    /// `IN`
    pub magic: [u8; 2],
    /// Format version
    pub version: u8,
    /// Length of each file hash
    pub hash_size: u8,
    /// Number of tags
    pub tag_count: u16,
    /// Number of files
    pub file_count: u32,
}

/// A tag and the files it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTag {
    /// Tag name, e.g. `Windows` or `enUS`
    pub name: String,
    /// Raw tag type
    pub tag_type: u16,
    /// One bit per file, most significant bit first
    pub mask: Vec<u8>,
}

impl InstallTag {
    /// Whether file `index` carries this tag
    pub fn has_file(&self, index: usize) -> bool {
        self.mask
            .get(index / 8)
            .is_some_and(|byte| byte & (0x80 >> (index % 8)) != 0)
    }
}

/// One file entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallFile {
    /// Install path
    pub name: String,
    /// Content hash, lowercase hex
    pub hash: String,
    /// Size in bytes
    pub size: u32,
}

/// Parsed install manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallManifest {
    /// Header fields
    pub header: InstallHeader,
    /// Tags in file order
    pub tags: Vec<InstallTag>,
    /// Files in file order
    pub files: Vec<InstallFile>,
}

impl InstallManifest {
    /// Parse a decoded install manifest
    pub fn parse(data: &[u8]) -> Result<Self, InstallError> {
        let mut cursor = Cursor::new(data);
        let header: InstallHeader = cursor.read_be()?;
        if header.magic != *b"IN" {
            return Err(InstallError::InvalidMagic(header.magic));
        }

        let mask_size = (header.file_count as usize).div_ceil(8);
        let mut tags = Vec::with_capacity(usize::from(header.tag_count));
        for _ in 0..header.tag_count {
            let name = read_cstring(&mut cursor)?;
            let tag_type: u16 = cursor.read_be().map_err(|_| InstallError::Truncated("tag"))?;
            let mut mask = vec![0u8; mask_size];
            cursor
                .read_exact(&mut mask)
                .map_err(|_| InstallError::Truncated("tag mask"))?;
            tags.push(InstallTag {
                name,
                tag_type,
                mask,
            });
        }

        let mut files = Vec::new();
        let mut hash = vec![0u8; usize::from(header.hash_size)];
        for _ in 0..header.file_count {
            let name = read_cstring(&mut cursor)?;
            cursor
                .read_exact(&mut hash)
                .map_err(|_| InstallError::Truncated("file hash"))?;
            let size: u32 = cursor.read_be().map_err(|_| InstallError::Truncated("file size"))?;
            files.push(InstallFile {
                name,
                hash: hex::encode(&hash),
                size,
            });
        }

        Ok(Self {
            header,
            tags,
            files,
        })
    }

    /// Names of the tags that cover file `index`
    pub fn tags_for_file(&self, index: usize) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|tag| tag.has_file(index))
            .map(|tag| tag.name.as_str())
            .collect()
    }

    /// Files covered by every named tag
    pub fn files_with_tags<'a>(&'a self, names: &'a [&str]) -> impl Iterator<Item = &'a InstallFile> {
        let selected: Vec<&InstallTag> = self
            .tags
            .iter()
            .filter(|tag| names.contains(&tag.name.as_str()))
            .collect();
        self.files
            .iter()
            .enumerate()
            .filter(move |(index, _)| selected.iter().all(|tag| tag.has_file(*index)))
            .map(|(_, file)| file)
    }
}

fn read_cstring(cursor: &mut Cursor<&[u8]>) -> Result<String, InstallError> {
    let mut bytes = Vec::new();
    cursor
        .read_until(0, &mut bytes)
        .map_err(|_| InstallError::Truncated("name"))?;
    if bytes.pop() != Some(0) {
        return Err(InstallError::Truncated("name"));
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"IN");
        data.extend_from_slice(&[1, 16]);
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&3u32.to_be_bytes());

        data.extend_from_slice(b"Windows\0");
        data.extend_from_slice(&1u16.to_be_bytes());
        data.push(0b1100_0000);
        data.extend_from_slice(b"enUS\0");
        data.extend_from_slice(&3u16.to_be_bytes());
        data.push(0b0110_0000);

        for (name, size) in [("Wow.exe", 100u32), ("enUS.txt", 20), ("other.dat", 7)] {
            data.extend_from_slice(name.as_bytes());
            data.push(0);
            data.extend_from_slice(&[0xAB; 16]);
            data.extend_from_slice(&size.to_be_bytes());
        }
        data
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = InstallManifest::parse(&sample()).expect("Manifest should parse");
        assert_eq!(manifest.header.file_count, 3);
        assert_eq!(manifest.tags.len(), 2);
        assert_eq!(manifest.files[1].name, "enUS.txt");
        assert_eq!(manifest.files[0].hash, "ab".repeat(16));
        assert_eq!(manifest.files[2].size, 7);
    }

    #[test]
    fn test_tags_for_file() {
        let manifest = InstallManifest::parse(&sample()).expect("Manifest should parse");
        assert_eq!(manifest.tags_for_file(0), vec!["Windows"]);
        assert_eq!(manifest.tags_for_file(1), vec!["Windows", "enUS"]);
        assert_eq!(manifest.tags_for_file(2), vec!["enUS"]);

        let both: Vec<_> = manifest
            .files_with_tags(&["Windows", "enUS"])
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(both, vec!["enUS.txt"]);
    }

    #[test]
    fn test_rejects_bad_magic_and_truncation() {
        let mut data = sample();
        data[0] = b'X';
        assert!(matches!(
            InstallManifest::parse(&data),
            Err(InstallError::InvalidMagic(_))
        ));

        let data = sample();
        assert!(matches!(
            InstallManifest::parse(&data[..data.len() - 2]),
            Err(InstallError::Truncated(_))
        ));
    }
}
