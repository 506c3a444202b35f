//! Locale and content flags of root blocks

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Locale bitmask of a root block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LocaleFlags(pub u32);

const LOCALE_TAGS: [(&str, u32); 15] = [
    ("enUS", 0x2),
    ("koKR", 0x4),
    ("frFR", 0x10),
    ("deDE", 0x20),
    ("zhCN", 0x40),
    ("esES", 0x80),
    ("zhTW", 0x100),
    ("enGB", 0x200),
    ("enCN", 0x400),
    ("enTW", 0x800),
    ("esMX", 0x1000),
    ("ruRU", 0x2000),
    ("ptBR", 0x4000),
    ("itIT", 0x8000),
    ("ptPT", 0x10000),
];

impl LocaleFlags {
    /// English (US)
    pub const EN_US: Self = Self(0x2);
    /// Korean
    pub const KO_KR: Self = Self(0x4);
    /// French
    pub const FR_FR: Self = Self(0x10);
    /// German
    pub const DE_DE: Self = Self(0x20);
    /// Chinese (simplified)
    pub const ZH_CN: Self = Self(0x40);
    /// Spanish (Spain)
    pub const ES_ES: Self = Self(0x80);
    /// Chinese (traditional)
    pub const ZH_TW: Self = Self(0x100);
    /// English (GB)
    pub const EN_GB: Self = Self(0x200);
    /// English (China)
    pub const EN_CN: Self = Self(0x400);
    /// English (Taiwan)
    pub const EN_TW: Self = Self(0x800);
    /// Spanish (Mexico)
    pub const ES_MX: Self = Self(0x1000);
    /// Russian
    pub const RU_RU: Self = Self(0x2000);
    /// Portuguese (Brazil)
    pub const PT_BR: Self = Self(0x4000);
    /// Italian
    pub const IT_IT: Self = Self(0x8000);
    /// Portuguese (Portugal)
    pub const PT_PT: Self = Self(0x10000);

    /// Parse a locale tag such as `enUS` (case-insensitive)
    pub fn from_tag(tag: &str) -> Option<Self> {
        LOCALE_TAGS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(tag))
            .map(|&(_, bits)| Self(bits))
    }

    /// Tag of a single-locale mask
    pub fn tag(self) -> Option<&'static str> {
        LOCALE_TAGS
            .iter()
            .find(|&&(_, bits)| bits == self.0)
            .map(|&(name, _)| name)
    }

    /// Whether the masks share any locale
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl fmt::Display for LocaleFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag() {
            Some(tag) => f.write_str(tag),
            None => write!(f, "0x{:x}", self.0),
        }
    }
}

impl BitOr for LocaleFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for LocaleFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for LocaleFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Content flags of a root block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentFlags(pub u32);

impl ContentFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// Loaded on Windows
    pub const LOAD_ON_WINDOWS: Self = Self(0x8);
    /// Loaded on macOS
    pub const LOAD_ON_MACOS: Self = Self(0x10);
    /// Low-violence variant
    pub const LOW_VIOLENCE: Self = Self(0x80);
    /// Never loaded by the client
    pub const DO_NOT_LOAD: Self = Self(0x100);
    /// Update plugin
    pub const UPDATE_PLUGIN: Self = Self(0x800);
    /// Content is encrypted
    pub const ENCRYPTED: Self = Self(0x0800_0000);
    /// Block carries no name hashes
    pub const NO_NAME_HASH: Self = Self(0x1000_0000);
    /// Uncommon resolution
    pub const UNCOMMON_RESOLUTION: Self = Self(0x2000_0000);
    /// Bundled
    pub const BUNDLE: Self = Self(0x4000_0000);
    /// Stored uncompressed
    pub const NO_COMPRESSION: Self = Self(0x8000_0000);

    /// Whether every bit of `flag` is set
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }
}

impl BitOr for ContentFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
