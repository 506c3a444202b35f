//! Local `.idx` journal parsing
//!
//! Each journal starts with a guarded header block, padded to a 16-byte
//! boundary, followed by a guarded block of 18-byte records. A record maps the
//! first 9 bytes of an encoding key to a location inside `data.NNN`.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::{Cursor, Seek, SeekFrom};
use std::path::Path;

use binrw::{BinRead, BinReaderExt, BinResult, BinWrite, BinWriterExt, Endian};
use casket_crypto::EncodingKey;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::{Result, StorageError};

/// Size of one journal record
const RECORD_SIZE: usize = 18;

/// Where an encoded blob sits inside the local data archives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalLocation {
    /// Archive file number (data.NNN)
    pub archive_id: u16,
    /// Offset of the local header within the archive
    pub offset: u32,
    /// Size including the local header
    pub size: u32,
}

/// Custom binrw parser for archive location (5 bytes: 1 high + 4 packed)
fn parse_archive_location<R: std::io::Read + std::io::Seek>(
    reader: &mut R,
    _endian: Endian,
    _args: (),
) -> BinResult<(u16, u32)> {
    let index_high = u16::from(reader.read_be::<u8>()?);
    let index_low = reader.read_be::<u32>()?;

    // Top 2 bits of the low word extend the archive number
    let archive_id = (index_high << 2) | ((index_low >> 30) & 0x03) as u16;
    Ok((archive_id, index_low & 0x3FFF_FFFF))
}

fn write_archive_location<W: std::io::Write + std::io::Seek>(
    location: &(u16, u32),
    writer: &mut W,
    _endian: Endian,
    _args: (),
) -> BinResult<()> {
    let (archive_id, offset) = *location;
    let index_high = u8::try_from(archive_id >> 2).map_err(|e| binrw::Error::AssertFail {
        pos: 0,
        message: format!("Archive ID too large: {e}"),
    })?;
    writer.write_be(&index_high)?;
    writer.write_be(&((u32::from(archive_id & 0x03) << 30) | (offset & 0x3FFF_FFFF)))?;
    Ok(())
}

/// One 18-byte journal record
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
struct IndexRecord {
    key: [u8; 9],
    #[br(parse_with = parse_archive_location)]
    #[bw(write_with = write_archive_location)]
    location: (u16, u32),
    #[brw(little)]
    size: u32,
}

/// Merged view of every `.idx` journal in a storage directory
#[derive(Debug, Clone, Default)]
pub struct LocalIndex {
    entries: HashMap<[u8; 9], LocalLocation>,
}

impl LocalIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.idx` file in `dir`, in file name order
    pub async fn load_dir(dir: &Path) -> Result<Self> {
        let mut names = Vec::new();
        let mut read_dir = fs::read_dir(dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "idx") {
                names.push(path);
            }
        }
        names.sort();

        let mut index = Self::new();
        for path in &names {
            let data = fs::read(path).await?;
            match index.add_journal(&data) {
                Ok(added) => debug!(path = %path.display(), added, "parsed local index"),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable local index"),
            }
        }

        info!(
            files = names.len(),
            entries = index.len(),
            "loaded local indexes"
        );
        Ok(index)
    }

    /// Merge one journal, returning how many new keys it contributed
    ///
    /// A key already present keeps its earlier location.
    pub fn add_journal(&mut self, data: &[u8]) -> Result<usize> {
        let mut cursor = Cursor::new(data);
        let parse = |e: binrw::Error| StorageError::InvalidFormat(format!("local index: {e}"));

        let header_size: u32 = cursor.read_le().map_err(parse)?;
        let aligned = (8 + u64::from(header_size) + 0x0F) & !0x0F;
        cursor.seek(SeekFrom::Start(aligned))?;

        let data_length: u32 = cursor.read_le().map_err(parse)?;
        let _data_hash: u32 = cursor.read_le().map_err(parse)?;

        let available = data.len().saturating_sub(aligned as usize + 8);
        let declared = data_length as usize;
        if declared > available {
            return Err(StorageError::InvalidFormat(format!(
                "local index declares {declared} bytes of records, only {available} present"
            )));
        }

        let mut added = 0;
        for _ in 0..declared / RECORD_SIZE {
            let record: IndexRecord = cursor.read_be().map_err(parse)?;
            if let Entry::Vacant(slot) = self.entries.entry(record.key) {
                slot.insert(LocalLocation {
                    archive_id: record.location.0,
                    offset: record.location.1,
                    size: record.size,
                });
                added += 1;
            }
        }
        Ok(added)
    }

    /// Location of `key`, matched on its first 9 bytes
    pub fn lookup(&self, key: &EncodingKey) -> Option<LocalLocation> {
        self.entries.get(&key.first_9()).copied()
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are indexed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Serialize records into journal form
///
/// Used to lay out synthetic installations. Hashes are written as zero.
pub fn build_index_file(records: &[(EncodingKey, LocalLocation)]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    let write = |e: binrw::Error| StorageError::InvalidFormat(format!("local index: {e}"));

    // Header block: version 7, 4-byte sizes, 5-byte locations, 9-byte keys, 30 offset bits
    let header: [u8; 8] = [0x07, 0x00, 0x00, 0x00, 0x04, 0x05, 0x09, 0x1E];
    cursor.write_le(&(header.len() as u32)).map_err(write)?;
    cursor.write_le(&0u32).map_err(write)?;
    cursor.write_le(&header).map_err(write)?;
    let aligned = (8 + header.len() as u64 + 0x0F) & !0x0F;
    cursor.get_mut().resize(aligned as usize, 0);
    cursor.seek(SeekFrom::Start(aligned))?;

    let data_length = u32::try_from(records.len() * RECORD_SIZE)
        .map_err(|_| StorageError::InvalidFormat("too many index records".to_string()))?;
    cursor.write_le(&data_length).map_err(write)?;
    cursor.write_le(&0u32).map_err(write)?;

    for (key, location) in records {
        let record = IndexRecord {
            key: key.first_9(),
            location: (location.archive_id, location.offset),
            size: location.size,
        };
        cursor.write_be(&record).map_err(write)?;
    }

    Ok(cursor.into_inner())
}
