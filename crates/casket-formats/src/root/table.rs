use std::collections::HashMap;

use binrw::BinReaderExt;
use binrw::io::{Cursor, Seek, SeekFrom};
use casket_crypto::{ContentKey, FileDataId};
use tracing::debug;

use super::error::{RootError, Unresolved};
use super::flags::{ContentFlags, LocaleFlags};

/// `TSFM` read as a little-endian u32
pub const ROOT_MAGIC: u32 = 0x4D46_5354;

/// Header size field value of the versioned modern header
pub const MODERN_HEADER_SIZE: u32 = 0x18;

/// Locale and content flags shared by every record of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootVariant {
    /// Content flags
    pub content_flags: ContentFlags,
    /// Locale mask
    pub locale_flags: LocaleFlags,
}

impl RootVariant {
    /// Whether this variant is selectable for `locale`
    pub const fn is_usable_for(&self, locale: LocaleFlags) -> bool {
        self.locale_flags.intersects(locale)
            && !self.content_flags.contains(ContentFlags::LOW_VIOLENCE)
    }
}

/// Which on-disk layout the table was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootFormat {
    /// Headerless, name hash after every content key
    Legacy,
    /// `TSFM` header
    Modern {
        /// Header version; 0 for the 12-byte header
        version: u32,
        /// Total file count
        total_files: u32,
        /// Named file count
        named_files: u32,
    },
}

/// Identifier to content key table
///
/// Every block of the file becomes one [`RootVariant`]; each identifier keeps
/// its `(variant index, content key)` pairs in file order.
#[derive(Debug, Clone)]
pub struct RootTable {
    format: RootFormat,
    variants: Vec<RootVariant>,
    entries: HashMap<FileDataId, Vec<(u32, ContentKey)>>,
}

struct Block {
    offset: u64,
    count: u32,
    variant: RootVariant,
}

impl RootTable {
    /// Parse a decoded root table
    pub fn parse(data: &[u8]) -> Result<Self, RootError> {
        let mut table = Self {
            format: RootFormat::Legacy,
            variants: Vec::new(),
            entries: HashMap::new(),
        };

        let mut cursor = Cursor::new(data);
        let len = data.len() as u64;

        let magic = if data.len() >= 4 {
            cursor.read_le::<u32>()?
        } else {
            0
        };

        if magic == ROOT_MAGIC {
            let mut header_size: u32 = cursor.read_le()?;
            let mut version: u32 = cursor.read_le()?;

            let (total_files, named_files) = if header_size == MODERN_HEADER_SIZE {
                if version != 1 && version != 2 {
                    return Err(RootError::UnsupportedVersion(version));
                }
                (cursor.read_le::<u32>()?, cursor.read_le::<u32>()?)
            } else {
                // 12-byte header: the two fields are the file counts
                let counts = (header_size, version);
                version = 0;
                header_size = 12;
                counts
            };

            table.format = RootFormat::Modern {
                version,
                total_files,
                named_files,
            };
            cursor.seek(SeekFrom::Start(u64::from(header_size))).map_err(binrw::Error::Io)?;

            let allow_nameless = total_files != named_files;
            while cursor.position() < len {
                let block = Self::read_block_header(&mut cursor, version)?;
                let ids = Self::read_ids(&mut cursor, &block, len)?;

                let variant_index = table.variants.len() as u32;
                for &id in &ids {
                    let ckey = ContentKey::from_bytes(cursor.read_le()?);
                    table.insert(id, variant_index, ckey);
                }

                let nameless = allow_nameless
                    && block
                        .variant
                        .content_flags
                        .contains(ContentFlags::NO_NAME_HASH);
                if !nameless {
                    cursor.seek(SeekFrom::Current(8 * i64::from(block.count))).map_err(binrw::Error::Io)?;
                }

                table.variants.push(block.variant);
            }
        } else {
            cursor.set_position(0);
            while cursor.position() < len {
                let block = Self::read_block_header(&mut cursor, 0)?;
                let ids = Self::read_ids(&mut cursor, &block, len)?;

                let variant_index = table.variants.len() as u32;
                for &id in &ids {
                    let ckey = ContentKey::from_bytes(cursor.read_le()?);
                    cursor.seek(SeekFrom::Current(8)).map_err(binrw::Error::Io)?;
                    table.insert(id, variant_index, ckey);
                }

                table.variants.push(block.variant);
            }
        }

        debug!(
            format = ?table.format,
            blocks = table.variants.len(),
            files = table.entries.len(),
            "parsed root table"
        );
        Ok(table)
    }

    fn read_block_header(cursor: &mut Cursor<&[u8]>, version: u32) -> Result<Block, RootError> {
        let offset = cursor.position();
        let count: u32 = cursor.read_le()?;

        let (content_flags, locale_flags) = if version == 2 {
            let locale: u32 = cursor.read_le()?;
            let flags1: u32 = cursor.read_le()?;
            let flags2: u32 = cursor.read_le()?;
            let flags3: u8 = cursor.read_le()?;
            (flags1 | flags2 | (u32::from(flags3) << 17), locale)
        } else {
            let content: u32 = cursor.read_le()?;
            let locale: u32 = cursor.read_le()?;
            (content, locale)
        };

        Ok(Block {
            offset,
            count,
            variant: RootVariant {
                content_flags: ContentFlags(content_flags),
                locale_flags: LocaleFlags(locale_flags),
            },
        })
    }

    fn read_ids(
        cursor: &mut Cursor<&[u8]>,
        block: &Block,
        len: u64,
    ) -> Result<Vec<FileDataId>, RootError> {
        // every record needs at least its delta and content key
        let needed = u64::from(block.count) * 20;
        if needed > len.saturating_sub(cursor.position()) {
            return Err(RootError::Truncated {
                offset: block.offset,
                count: block.count,
            });
        }

        let mut ids = Vec::with_capacity(block.count as usize);
        let mut next: i64 = 0;
        for _ in 0..block.count {
            let delta: i32 = cursor.read_le()?;
            let value = next + i64::from(delta);
            let id = u32::try_from(value).map_err(|_| RootError::InvalidFileDataId {
                offset: block.offset,
                value,
            })?;
            ids.push(FileDataId(id));
            next = value + 1;
        }
        Ok(ids)
    }

    fn insert(&mut self, id: FileDataId, variant: u32, ckey: ContentKey) {
        let list = self.entries.entry(id).or_default();
        match list.last_mut() {
            Some(last) if last.0 == variant => last.1 = ckey,
            _ => list.push((variant, ckey)),
        }
    }

    /// Layout the table was read from
    pub fn format(&self) -> RootFormat {
        self.format
    }

    /// All variants in block order
    pub fn variants(&self) -> &[RootVariant] {
        &self.variants
    }

    /// Number of distinct identifiers
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Variants recorded for an identifier, in file order
    pub fn variants_for(&self, id: FileDataId) -> impl Iterator<Item = (&RootVariant, ContentKey)> {
        self.entries
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|&(index, ckey)| Some((self.variants.get(index as usize)?, ckey)))
    }

    /// Select the content key for an identifier
    ///
    /// The first variant in file order whose locale intersects `locale` and
    /// which is not low-violence wins.
    pub fn select_content_key(
        &self,
        id: FileDataId,
        locale: LocaleFlags,
    ) -> Result<ContentKey, Unresolved> {
        if !self.entries.contains_key(&id) {
            return Err(Unresolved::UnknownFileDataId(id));
        }

        self.variants_for(id)
            .find(|(variant, _)| variant.is_usable_for(locale))
            .map(|(_, ckey)| ckey)
            .ok_or(Unresolved::NoMatchingVariant { id, locale })
    }

    /// Whether an identifier has a usable variant for `locale`
    pub fn file_exists(&self, id: FileDataId, locale: LocaleFlags) -> bool {
        self.variants_for(id)
            .any(|(variant, _)| variant.is_usable_for(locale))
    }

    /// Identifiers with a usable variant for `locale`, ascending
    pub fn valid_file_ids(&self, locale: LocaleFlags) -> Vec<FileDataId> {
        let mut ids: Vec<FileDataId> = self
            .entries
            .keys()
            .copied()
            .filter(|&id| self.file_exists(id, locale))
            .collect();
        ids.sort_unstable();
        ids
    }
}
