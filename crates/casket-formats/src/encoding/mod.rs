//! Encoding table: content key to encoding key
//!
//! The table is the second hop of every lookup. After the 22-byte header and
//! the encoding spec block comes a page index, then fixed-size pages of
//! `{key count, 40-bit size, content key, encoding keys...}` records. A zero
//! key count ends a page early.

mod builder;
mod error;
mod header;
mod table;

pub use builder::EncodingBuilder;
pub use error::EncodingError;
pub use header::EncodingHeader;
pub use table::{EncodingEntry, EncodingTable};
