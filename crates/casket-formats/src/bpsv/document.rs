use crate::bpsv::schema::BpsvSchema;

/// One data row; values stay as written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpsvRow {
    values: Vec<String>,
}

impl BpsvRow {
    /// Create a row from raw values
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    /// Raw value by column index
    pub fn get_raw(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    /// Raw value by column name
    pub fn get_raw_by_name<'a>(&'a self, name: &str, schema: &BpsvSchema) -> Option<&'a str> {
        schema.field_index(name).and_then(|i| self.get_raw(i))
    }

    /// All raw values
    pub fn raw_values(&self) -> &[String] {
        &self.values
    }
}

/// Parsed BPSV document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BpsvDocument {
    schema: BpsvSchema,
    rows: Vec<BpsvRow>,
    sequence_number: Option<u32>,
}

impl BpsvDocument {
    /// Assemble a document
    pub fn new(schema: BpsvSchema, rows: Vec<BpsvRow>, sequence_number: Option<u32>) -> Self {
        Self {
            schema,
            rows,
            sequence_number,
        }
    }

    /// Header row
    pub fn schema(&self) -> &BpsvSchema {
        &self.schema
    }

    /// Data rows in file order
    pub fn rows(&self) -> &[BpsvRow] {
        &self.rows
    }

    /// `## seqn = N` value, if present
    pub fn sequence_number(&self) -> Option<u32> {
        self.sequence_number
    }

    /// Value of column `name` in row `index`
    pub fn value(&self, index: usize, name: &str) -> Option<&str> {
        self.rows
            .get(index)
            .and_then(|row| row.get_raw_by_name(name, &self.schema))
    }

    /// First row whose column `name` equals `value`
    pub fn find_row(&self, name: &str, value: &str) -> Option<&BpsvRow> {
        let index = self.schema.field_index(name)?;
        self.rows.iter().find(|row| row.get_raw(index) == Some(value))
    }
}
