//! Text-to-typed field conversion
//!
//! [`coerce`] splits one comma-delimited line and converts each positional
//! field according to the schema:
//!
//! | declared   | empty text | other text                                     |
//! |------------|------------|------------------------------------------------|
//! | any        | null       | -                                              |
//! | BOOLEAN    | null       | true/false for known tokens, else text as-is   |
//! | FLOAT      | null       | `f64`, or a conversion error                   |
//! | INTEGER    | null       | `i64`, or a conversion error                   |
//! | DATETIME   | null       | text as-is (already in wire format)            |
//! | STRING/other | null     | text as-is                                     |
//!
//! The field count of the line is not checked against the schema; pairing
//! stops at whichever runs out first.

use serde::ser::{Serialize, SerializeMap, Serializer};
use spendlake_common::{Result, SpendlakeError};

use crate::schema::{FieldType, Schema};

/// Text accepted as boolean true
pub const TRUE_TOKENS: [&str; 3] = ["t", "Y", "YES"];

/// Text accepted as boolean false
pub const FALSE_TOKENS: [&str; 3] = ["f", "N", "NO"];

/// A single converted value
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Float(f64),
    Integer(i64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

/// One line of a delimited file with its 1-based position in that file
#[derive(Debug, Clone, Copy)]
pub struct RawLine<'a> {
    pub index: usize,
    pub text: &'a str,
}

impl<'a> RawLine<'a> {
    pub fn new(index: usize, text: &'a str) -> Self {
        Self { index, text }
    }
}

/// Converted line, in schema order. Field names borrow from the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRecord<'s> {
    fields: Vec<(&'s str, FieldValue)>,
}

impl<'s> TypedRecord<'s> {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'s str, &FieldValue)> + '_ {
        self.fields.iter().map(|(name, value)| (*name, value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// Serialized as a JSON object whose key order is the schema order
impl Serialize for TypedRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Convert one raw line into a typed record
///
/// Fails only when a FLOAT or INTEGER field holds non-numeric text, or when
/// the line itself is not valid delimited text.
pub fn coerce<'s>(schema: &'s Schema, line: RawLine<'_>) -> Result<TypedRecord<'s>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(line.text.as_bytes());

    let mut record = csv::StringRecord::new();
    reader.read_record(&mut record).map_err(|e| {
        SpendlakeError::Parse(format!("line {}: {}", line.index, e))
    })?;

    let mut fields = Vec::with_capacity(schema.len());
    for (field, raw) in schema.fields().iter().zip(record.iter()) {
        let value = coerce_value(&field.field_type, raw).ok_or_else(|| {
            SpendlakeError::Conversion {
                line: line.index,
                field: field.name.clone(),
                value: raw.to_string(),
                expected: field.field_type.to_string(),
            }
        })?;
        fields.push((field.name.as_str(), value));
    }

    Ok(TypedRecord { fields })
}

/// Convert a single field; `None` means the text does not parse as the
/// declared numeric type.
pub fn coerce_value(field_type: &FieldType, raw: &str) -> Option<FieldValue> {
    if raw.is_empty() {
        return Some(FieldValue::Null);
    }

    let value = match field_type {
        FieldType::Boolean => {
            if TRUE_TOKENS.contains(&raw) {
                FieldValue::Bool(true)
            } else if FALSE_TOKENS.contains(&raw) {
                FieldValue::Bool(false)
            } else {
                // Unknown tokens stay text until a policy for them exists
                FieldValue::Text(raw.to_string())
            }
        },
        FieldType::Float => FieldValue::Float(raw.trim().parse().ok()?),
        FieldType::Integer => FieldValue::Integer(raw.trim().parse().ok()?),
        FieldType::Datetime | FieldType::String | FieldType::Other(_) => {
            FieldValue::Text(raw.to_string())
        },
    };

    Some(value)
}
