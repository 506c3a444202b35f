use casket_crypto::{ContentKey, FileDataId};

use super::flags::ContentFlags;
use super::table::{MODERN_HEADER_SIZE, ROOT_MAGIC, RootVariant};

#[derive(Debug, Clone)]
struct PendingBlock {
    variant: RootVariant,
    records: Vec<(FileDataId, ContentKey)>,
}

/// Builds root tables, mostly for fixtures
///
/// Name hashes are written unless the layout allows omitting them: a modern
/// table whose total and named counts differ, for blocks flagged
/// [`ContentFlags::NO_NAME_HASH`].
#[derive(Debug, Clone)]
pub struct RootBuilder {
    version: Option<u32>,
    blocks: Vec<PendingBlock>,
}

impl RootBuilder {
    /// Headerless legacy layout
    pub fn legacy() -> Self {
        Self {
            version: None,
            blocks: Vec::new(),
        }
    }

    /// `TSFM` layout; version 0 selects the 12-byte header
    pub fn modern(version: u32) -> Self {
        Self {
            version: Some(version),
            blocks: Vec::new(),
        }
    }

    /// Append a block; records should be in ascending identifier order
    #[must_use]
    pub fn block(mut self, variant: RootVariant, records: &[(FileDataId, ContentKey)]) -> Self {
        self.blocks.push(PendingBlock {
            variant,
            records: records.to_vec(),
        });
        self
    }

    fn counts(&self) -> (u32, u32) {
        let total: usize = self.blocks.iter().map(|b| b.records.len()).sum();
        let named: usize = self
            .blocks
            .iter()
            .filter(|b| !b.variant.content_flags.contains(ContentFlags::NO_NAME_HASH))
            .map(|b| b.records.len())
            .sum();
        (total as u32, named as u32)
    }

    /// Serialize the table
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let (total, named) = self.counts();

        if let Some(version) = self.version {
            out.extend_from_slice(&ROOT_MAGIC.to_le_bytes());
            if version == 0 {
                out.extend_from_slice(&total.to_le_bytes());
                out.extend_from_slice(&named.to_le_bytes());
            } else {
                out.extend_from_slice(&MODERN_HEADER_SIZE.to_le_bytes());
                out.extend_from_slice(&version.to_le_bytes());
                out.extend_from_slice(&total.to_le_bytes());
                out.extend_from_slice(&named.to_le_bytes());
                out.resize(MODERN_HEADER_SIZE as usize, 0);
            }
        }

        let version = self.version.unwrap_or(0);
        for block in &self.blocks {
            let flags = block.variant.content_flags.0;
            let locale = block.variant.locale_flags.0;

            out.extend_from_slice(&(block.records.len() as u32).to_le_bytes());
            if version == 2 {
                out.extend_from_slice(&locale.to_le_bytes());
                out.extend_from_slice(&flags.to_le_bytes());
                out.extend_from_slice(&0u32.to_le_bytes());
                out.push(0);
            } else {
                out.extend_from_slice(&flags.to_le_bytes());
                out.extend_from_slice(&locale.to_le_bytes());
            }

            let mut next: i64 = 0;
            for (id, _) in &block.records {
                let delta = i64::from(id.get()) - next;
                out.extend_from_slice(&(delta as i32).to_le_bytes());
                next = i64::from(id.get()) + 1;
            }

            let hash = |id: FileDataId| u64::from(id.get()).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            if self.version.is_none() {
                for (id, ckey) in &block.records {
                    out.extend_from_slice(ckey.as_bytes());
                    out.extend_from_slice(&hash(*id).to_le_bytes());
                }
                continue;
            }

            for (_, ckey) in &block.records {
                out.extend_from_slice(ckey.as_bytes());
            }
            let nameless = total != named
                && block
                    .variant
                    .content_flags
                    .contains(ContentFlags::NO_NAME_HASH);
            if !nameless {
                for (id, _) in &block.records {
                    out.extend_from_slice(&hash(*id).to_le_bytes());
                }
            }
        }

        out
    }
}
