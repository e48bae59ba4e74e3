//! Declared table schema
//!
//! A [`SchemaDefinition`] is the field list exactly as read from the schema
//! file. [`SchemaDefinition::normalize`] turns it into the active [`Schema`]:
//! derived `log1p` columns are dropped and names starting with a digit get a
//! letter prefix so they are legal column identifiers downstream.
//!
//! The data files are NOT rewritten to match. Normalization assumes the
//! dropped columns are also absent from the delimited input; if they are
//! present, positional mapping shifts and values land in the wrong fields.

use serde::{Deserialize, Serialize};
use spendlake_common::{Result, SpendlakeError};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Substring marking derived log-transformed columns that are never loaded
pub const LOG1P_MARKER: &str = "log1p";

/// Prefix given to field names that start with a digit
pub const DIGIT_PREFIX: &str = "x";

/// Column type as declared in the schema file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    String,
    Boolean,
    Float,
    Integer,
    Datetime,
    /// Any other warehouse type; values pass through untouched
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "STRING",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Float => "FLOAT",
            FieldType::Integer => "INTEGER",
            FieldType::Datetime => "DATETIME",
            FieldType::Other(name) => name,
        }
    }
}

/// Names are matched case-insensitively and aliases collapse to one variant,
/// so the declared spelling is not kept
impl From<String> for FieldType {
    fn from(name: String) -> Self {
        let upper = name.trim().to_uppercase();
        match upper.as_str() {
            "STRING" => FieldType::String,
            "BOOLEAN" | "BOOL" => FieldType::Boolean,
            "FLOAT" | "FLOAT64" => FieldType::Float,
            "INTEGER" | "INT64" => FieldType::Integer,
            "DATETIME" => FieldType::Datetime,
            _ => FieldType::Other(upper),
        }
    }
}

impl From<&str> for FieldType {
    fn from(name: &str) -> Self {
        FieldType::from(name.to_string())
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        field_type.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: impl Into<FieldType>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
        }
    }
}

#[derive(Deserialize)]
struct FieldList {
    fields: Vec<SchemaField>,
}

/// Accepted layouts of the schema file
#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaDocument {
    /// Full table description as printed by the warehouse CLI
    Table { schema: FieldList },
    Fields(FieldList),
    Bare(Vec<SchemaField>),
}

/// Field list as declared, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDefinition {
    fields: Vec<SchemaField>,
}

impl SchemaDefinition {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }

    /// Read a schema file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SpendlakeError::Schema(format!("Cannot read schema {}: {}", path.display(), e))
        })?;
        let definition = Self::from_json(&text)?;
        info!(
            path = %path.display(),
            fields = definition.fields.len(),
            "Loaded schema definition"
        );
        Ok(definition)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let document: SchemaDocument = serde_json::from_str(text)
            .map_err(|e| SpendlakeError::Schema(format!("Unrecognized schema document: {}", e)))?;
        let fields = match document {
            SchemaDocument::Table { schema } => schema.fields,
            SchemaDocument::Fields(list) => list.fields,
            SchemaDocument::Bare(fields) => fields,
        };
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    /// Drop `log1p` columns, prefix digit-leading names, then validate
    pub fn normalize(self) -> Result<Schema> {
        let declared = self.fields.len();
        let fields: Vec<SchemaField> = self
            .fields
            .into_iter()
            .filter(|field| {
                let keep = !field.name.contains(LOG1P_MARKER);
                if !keep {
                    debug!(field = %field.name, "Dropping derived column");
                }
                keep
            })
            .map(|mut field| {
                if field.name.starts_with(|c: char| c.is_ascii_digit()) {
                    let renamed = format!("{}{}", DIGIT_PREFIX, field.name);
                    debug!(from = %field.name, to = %renamed, "Renaming digit-leading column");
                    field.name = renamed;
                }
                field
            })
            .collect();

        debug!(declared, active = fields.len(), "Normalized schema");
        Schema::new(fields)
    }
}

/// Active, validated schema with its derived lookups
///
/// Built once per process and shared by reference; nothing here is
/// recomputed per line.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<SchemaField>,
    header: Vec<String>,
    types: HashMap<String, FieldType>,
    type_list: String,
}

impl Schema {
    /// Validate names (non-empty, unique) and derive the lookups
    pub fn new(fields: Vec<SchemaField>) -> Result<Self> {
        if fields.is_empty() {
            return Err(SpendlakeError::Schema("Schema has no fields".to_string()));
        }

        let mut seen = HashSet::with_capacity(fields.len());
        for (position, field) in fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(SpendlakeError::Schema(format!(
                    "Field at position {} has an empty name",
                    position
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SpendlakeError::Schema(format!(
                    "Duplicate field name '{}'",
                    field.name
                )));
            }
        }

        let header = fields.iter().map(|f| f.name.clone()).collect();
        let types = fields
            .iter()
            .map(|f| (f.name.clone(), f.field_type.clone()))
            .collect();
        let type_list = fields
            .iter()
            .map(|f| format!("{}:{}", f.name, f.field_type))
            .collect::<Vec<_>>()
            .join(",");

        Ok(Self {
            fields,
            header,
            types,
            type_list,
        })
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    /// Column names in positional order
    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn field_type(&self, name: &str) -> Option<&FieldType> {
        self.types.get(name)
    }

    /// `name:TYPE,name:TYPE,...` as the warehouse load API expects it
    ///
    /// Types appear in canonical form, not as declared: the `BOOL`,
    /// `FLOAT64` and `INT64` aliases are written as `BOOLEAN`, `FLOAT` and
    /// `INTEGER`, and every other name is upper-cased.
    pub fn type_list(&self) -> &str {
        &self.type_list
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
