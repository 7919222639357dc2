//! Database type definitions
//!
//! Core data structures for representing query result values and the
//! JSON records they are shaped into.

/// One result row: column name → value, in result-column order.
///
/// `serde_json` is built with `preserve_order`, so the map keeps the
/// insertion order of the columns.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Introspected column metadata, as reported by `information_schema.columns`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type, e.g. `integer` or `character varying`
    pub data_type: String,
    pub nullable: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }
}

/// Database data types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    // Integer types
    SmallInt,
    Integer,
    BigInt,

    // Floating point
    Real,
    Double,
    Numeric,

    // Text types
    Text,
    Varchar,
    Char,

    // Boolean
    Boolean,

    // Date/time types
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,

    // JSON types
    Json,
    Jsonb,

    // Binary data
    Bytea,

    // UUID
    Uuid,

    // Array type
    Array(Box<DataType>),

    // Other/unknown types
    Unknown(String),
}

/// A cell value (single column value in a row)
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// NULL value
    Null,

    /// Integer value
    Integer(i64),

    /// Floating point value
    Float(f64),

    /// Text/string value
    Text(String),

    /// Boolean value
    Boolean(bool),

    /// JSON value (parsed)
    Json(serde_json::Value),

    /// Binary data
    Binary(Vec<u8>),

    /// Date/time value, rendered as text
    DateTime(String),

    /// UUID value
    Uuid(String),

    /// Array value
    Array(Vec<CellValue>),
}

impl CellValue {
    /// Convert to a JSON value, keeping the type where JSON can express it.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Integer(i) => serde_json::json!(*i),
            CellValue::Float(f) => {
                if f.is_finite() {
                    serde_json::json!(*f)
                } else {
                    // NaN / Infinity aren't valid JSON numbers
                    serde_json::Value::String(f.to_string())
                }
            }
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
            CellValue::Boolean(b) => serde_json::Value::Bool(*b),
            CellValue::Json(v) => v.clone(),
            CellValue::Binary(b) => serde_json::Value::String(hex_encode(b)),
            CellValue::DateTime(s) => serde_json::Value::String(s.clone()),
            CellValue::Uuid(s) => serde_json::Value::String(s.clone()),
            CellValue::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(CellValue::to_json).collect())
            }
        }
    }
}

/// Build a record from column names and cell values of one row.
pub fn to_record<'a>(names: impl IntoIterator<Item = &'a str>, values: Vec<CellValue>) -> Record {
    let mut record = Record::new();
    for (name, value) in names.into_iter().zip(values) {
        record.insert(name.to_string(), value.to_json());
    }
    record
}

/// Hex-encode binary data (e.g. `\xdeadbeef`), matching PostgreSQL's bytea output.
fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(2 + bytes.len() * 2);
    s.push_str("\\x");
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}
