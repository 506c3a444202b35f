//! BPSV (pipe separated values) documents
//!
//! Used by `.build.info` and by the patch server's `versions` and `cdns`
//! endpoints. The first line declares the columns as `Name!TYPE:size`;
//! `## seqn = N` carries a sequence number; other `#` lines are comments.

mod document;
mod schema;

pub use document::{BpsvDocument, BpsvRow};
pub use schema::{BpsvField, BpsvSchema, BpsvType};

use thiserror::Error;

/// Errors from BPSV parsing
#[derive(Debug, Error)]
pub enum BpsvError {
    /// No header row
    #[error("empty BPSV document")]
    EmptyDocument,

    /// Header row is malformed
    #[error("invalid BPSV header: {0}")]
    InvalidHeader(String),

    /// A row has more values than the header has columns
    #[error("row {row} has {actual} values, header declares {expected}")]
    FieldCountMismatch {
        /// Row number
        row: usize,
        /// Column count
        expected: usize,
        /// Value count
        actual: usize,
    },
}

/// Parse a BPSV document
pub fn parse(content: &str) -> Result<BpsvDocument, BpsvError> {
    let mut lines = content.lines();
    let header = lines
        .by_ref()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or(BpsvError::EmptyDocument)?;

    let schema = BpsvSchema::parse(header)?;
    let mut rows = Vec::new();
    let mut sequence_number = None;

    for line in lines {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("## seqn") {
            sequence_number = rest.trim_start_matches([' ', '=']).trim().parse().ok();
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let values: Vec<String> = line.split('|').map(str::to_string).collect();
        if values.len() > schema.field_count() {
            return Err(BpsvError::FieldCountMismatch {
                row: rows.len(),
                expected: schema.field_count(),
                actual: values.len(),
            });
        }
        rows.push(BpsvRow::new(values));
    }

    Ok(BpsvDocument::new(schema, rows, sequence_number))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const VERSIONS: &str = "Region!STRING:0|BuildConfig!HEX:16|CDNConfig!HEX:16|KeyRing!HEX:16|BuildId!DEC:4|VersionsName!String:0|ProductConfig!HEX:16\n\
## seqn = 2241282\n\
us|be2bb98dc28aee05bbee519393696cdb|fac77b9ca52c84ac28ad83a7dbe1c829|3ca57fe7319a297346440e4d2a03a0cd|56461|11.0.2.56461|53020d32e1a25648c8e1eafd5771935f\n\
eu|be2bb98dc28aee05bbee519393696cdb|fac77b9ca52c84ac28ad83a7dbe1c829|3ca57fe7319a297346440e4d2a03a0cd|56461|11.0.2.56461|53020d32e1a25648c8e1eafd5771935f\n";

    #[test]
    fn test_parse_versions() {
        let doc = parse(VERSIONS).expect("Document should parse");
        assert_eq!(doc.sequence_number(), Some(2_241_282));
        assert_eq!(doc.rows().len(), 2);
        assert_eq!(doc.value(1, "Region"), Some("eu"));
        assert_eq!(doc.value(0, "BuildId"), Some("56461"));
        assert_eq!(doc.schema().fields()[4].field_type, BpsvType::Dec(4));
    }

    #[test]
    fn test_spaced_names() {
        let doc = parse("Branch!STRING:0|Build Key!HEX:16|Product!STRING:0\r\n# comment\r\nus|abcd|wow\r\n")
            .expect("Document should parse");
        assert_eq!(doc.value(0, "Build Key"), Some("abcd"));
        assert_eq!(doc.value(0, "BuildKey"), Some("abcd"));
        assert_eq!(doc.value(0, "Product"), Some("wow"));
        assert!(doc.find_row("Product", "wow").is_some());
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse("\n\n"), Err(BpsvError::EmptyDocument)));
        assert!(matches!(parse("Name|Other"), Err(BpsvError::InvalidHeader(_))));
        assert!(matches!(
            parse("A!STRING:0\nx|y"),
            Err(BpsvError::FieldCountMismatch { .. })
        ));
    }
}
