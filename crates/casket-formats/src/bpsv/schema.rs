use crate::bpsv::BpsvError;

/// Declared type of a BPSV column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpsvType {
    /// `STRING:n`
    String(u32),
    /// `HEX:n`, `n` bytes as hex
    Hex(u32),
    /// `DEC:n`
    Dec(u32),
}

impl BpsvType {
    /// Parse a `TYPE:size` spec (case-insensitive)
    pub fn parse(spec: &str) -> Result<Self, BpsvError> {
        let (kind, size) = spec.split_once(':').unwrap_or((spec, "0"));
        let size = size
            .trim()
            .parse()
            .map_err(|_| BpsvError::InvalidHeader(format!("invalid size in {spec}")))?;

        match kind.trim().to_ascii_uppercase().as_str() {
            "STRING" => Ok(Self::String(size)),
            "HEX" => Ok(Self::Hex(size)),
            "DEC" => Ok(Self::Dec(size)),
            other => Err(BpsvError::InvalidHeader(format!("unknown field type {other}"))),
        }
    }
}

/// One column of the header row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpsvField {
    /// Column name as written (may contain spaces, e.g. `Build Key`)
    pub name: String,
    /// Declared type
    pub field_type: BpsvType,
}

impl BpsvField {
    /// Parse a `Name!TYPE:size` spec
    pub fn parse(spec: &str) -> Result<Self, BpsvError> {
        let (name, ty) = spec
            .split_once('!')
            .ok_or_else(|| BpsvError::InvalidHeader(format!("missing type in {spec}")))?;
        Ok(Self {
            name: name.trim().to_string(),
            field_type: BpsvType::parse(ty)?,
        })
    }
}

/// Header row of a BPSV document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BpsvSchema {
    fields: Vec<BpsvField>,
}

impl BpsvSchema {
    /// Parse the header row
    pub fn parse(header: &str) -> Result<Self, BpsvError> {
        let fields = header
            .split('|')
            .map(BpsvField::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { fields })
    }

    /// Columns in order
    pub fn fields(&self) -> &[BpsvField] {
        &self.fields
    }

    /// Column index by name
    ///
    /// Names match exactly, or with spaces removed so `BuildKey` finds
    /// `Build Key`.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .or_else(|| {
                self.fields
                    .iter()
                    .position(|f| f.name.replace(' ', "").eq_ignore_ascii_case(&name.replace(' ', "")))
            })
    }

    /// Number of columns
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}
