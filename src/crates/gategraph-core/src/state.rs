//! State record, schema and merge rules
//!
//! The state carried between nodes is a record with a fixed, explicitly
//! declared set of fields. Each field is either:
//!
//! - **Overwrite**: an update replaces the prior value entirely
//!   (a decision, a score)
//! - **Append**: an update is concatenated to the existing sequence
//!   (a message log); order of appends is order of node completion
//!
//! A field that has never been written is *absent*: it has no key in the
//! record. Absence is distinct from `null`, `""` or `[]`, so a node can tell
//! "not yet computed" from "computed and empty".
//!
//! # Example
//!
//! ```rust
//! use gategraph_core::state::{merge, FieldKind, StateRecord, StateSchema, StateUpdate};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let schema = Arc::new(
//!     StateSchema::from_fields([
//!         ("decision", FieldKind::Overwrite),
//!         ("messages", FieldKind::Append),
//!     ])
//!     .unwrap(),
//! );
//!
//! let state = StateRecord::from_input(schema, json!({"messages": ["hi"]})).unwrap();
//! assert!(state.is_absent("decision"));
//!
//! let update = StateUpdate::new()
//!     .set("decision", json!("COUNTER"))
//!     .append_one("messages", json!("countering"));
//! let state = merge(&state, update).unwrap();
//!
//! assert_eq!(state.get_str("decision"), Some("COUNTER"));
//! assert_eq!(state.get("messages"), Some(&json!(["hi", "countering"])));
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by schema construction and merging
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    /// A field was declared twice
    #[error("Field declared more than once: {0}")]
    DuplicateField(String),

    /// An update or input names a field the schema does not declare
    #[error("Field not declared in schema: {0}")]
    UnknownField(String),

    /// An append field received something other than an array
    #[error("Append field '{field}' requires an array, got {found}")]
    AppendRequiresSequence {
        /// The append field
        field: String,
        /// JSON type that was supplied instead
        found: &'static str,
    },

    /// Input or stored values were not a JSON object
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A field value could not be decoded into the requested type
    #[error("Field '{field}' could not be decoded: {message}")]
    Decode {
        /// The field being read
        field: String,
        /// Decoder message
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, StateError>;

/// How updates to a field are combined with its current value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Replace the current value
    Overwrite,
    /// Concatenate the update to the current sequence
    Append,
}

impl FieldKind {
    /// Reducer name as shown in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Overwrite => "overwrite",
            FieldKind::Append => "append",
        }
    }

    /// Combine `current` (absent when `None`) with `update`
    pub fn reduce(&self, field: &str, current: Option<&Value>, update: Value) -> Result<Value> {
        match self {
            FieldKind::Overwrite => Ok(update),
            FieldKind::Append => {
                let Value::Array(items) = update else {
                    return Err(StateError::AppendRequiresSequence {
                        field: field.to_string(),
                        found: type_name(&update),
                    });
                };
                match current {
                    None => Ok(Value::Array(items)),
                    Some(Value::Array(existing)) => {
                        let mut combined = existing.clone();
                        combined.extend(items);
                        Ok(Value::Array(combined))
                    }
                    Some(other) => Err(StateError::AppendRequiresSequence {
                        field: field.to_string(),
                        found: type_name(other),
                    }),
                }
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

/// Declared fields of a state record, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSchema {
    fields: Vec<FieldSpec>,
}

impl StateSchema {
    /// Create a new empty state schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema from `(name, kind)` pairs
    pub fn from_fields<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, FieldKind)>,
        S: Into<String>,
    {
        let mut schema = Self::new();
        for (name, kind) in fields {
            schema.add_field(name, kind)?;
        }
        Ok(schema)
    }

    /// Declare a field
    pub fn add_field(&mut self, name: impl Into<String>, kind: FieldKind) -> Result<()> {
        let name = name.into();
        if self.kind(&name).is_some() {
            return Err(StateError::DuplicateField(name));
        }
        self.fields.push(FieldSpec { name, kind });
        Ok(())
    }

    /// Kind of a declared field
    pub fn kind(&self, name: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn check_field(&self, name: &str, value: &Value) -> Result<FieldKind> {
        let kind = self
            .kind(name)
            .ok_or_else(|| StateError::UnknownField(name.to_string()))?;
        if kind == FieldKind::Append && !value.is_array() {
            return Err(StateError::AppendRequiresSequence {
                field: name.to_string(),
                found: type_name(value),
            });
        }
        Ok(kind)
    }
}

/// Values of the declared fields; a missing key means "absent"
#[derive(Debug, Clone)]
pub struct StateRecord {
    schema: Arc<StateSchema>,
    values: Map<String, Value>,
}

impl StateRecord {
    /// Create a record with every field absent
    pub fn new(schema: Arc<StateSchema>) -> Self {
        Self {
            schema,
            values: Map::new(),
        }
    }

    /// Initialise a record from caller input
    ///
    /// `input` must be a JSON object (or `null` for an empty record) whose
    /// keys are declared fields; append fields must hold arrays.
    pub fn from_input(schema: Arc<StateSchema>, input: Value) -> Result<Self> {
        match input {
            Value::Null => Ok(Self::new(schema)),
            Value::Object(values) => Self::from_values(schema, values),
            other => Err(StateError::InvalidState(format!(
                "input must be an object, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Rebuild a record from stored values (for example a checkpoint)
    pub fn from_values(schema: Arc<StateSchema>, values: Map<String, Value>) -> Result<Self> {
        for (name, value) in &values {
            schema.check_field(name, value)?;
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &Arc<StateSchema> {
        &self.schema
    }

    /// Value of a field, `None` when absent
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// String value of a field, `None` when absent or not a string
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(Value::as_str)
    }

    /// Decode a field into `T`, `Ok(None)` when absent
    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>> {
        self.values
            .get(field)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| StateError::Decode {
                    field: field.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    /// Whether a field has never been written
    pub fn is_absent(&self, field: &str) -> bool {
        !self.values.contains_key(field)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Prefix every append field with the history held by `prior`
    ///
    /// Used when a finished thread is run again so that append fields never
    /// shrink over the lifetime of a thread id.
    pub fn carry_history(&mut self, prior: &StateRecord) -> Result<()> {
        for spec in self.schema.fields() {
            if spec.kind != FieldKind::Append {
                continue;
            }
            let Some(previous) = prior.get(&spec.name) else {
                continue;
            };
            let fresh = self
                .values
                .remove(&spec.name)
                .unwrap_or_else(|| Value::Array(Vec::new()));
            let combined = spec.kind.reduce(&spec.name, Some(previous), fresh)?;
            self.values.insert(spec.name.clone(), combined);
        }
        Ok(())
    }
}

impl PartialEq for StateRecord {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Serialize for StateRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

/// Partial update produced by a node
///
/// Only the fields present are merged; everything else is left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateUpdate {
    fields: Map<String, Value>,
}

impl StateUpdate {
    /// Create an empty update
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an update from a JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            Value::Null => Ok(Self::new()),
            other => Err(StateError::InvalidState(format!(
                "update must be an object, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Set a field to `value`
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Append several items to a sequence field
    pub fn append<I>(mut self, field: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let entry = self
            .fields
            .entry(field.into())
            .or_insert_with(|| Value::Array(Vec::new()));
        match entry {
            Value::Array(existing) => existing.extend(items),
            other => *other = Value::Array(items.into_iter().collect()),
        }
        self
    }

    /// Append a single item to a sequence field
    pub fn append_one(self, field: impl Into<String>, item: impl Into<Value>) -> Self {
        self.append(field, std::iter::once(item.into()))
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// Merge a partial update into a state record
///
/// For each field in `update`: overwrite fields take the update's value,
/// append fields become `current ++ update`. Fields missing from `update`
/// are unchanged. `current` is not modified.
pub fn merge(current: &StateRecord, update: StateUpdate) -> Result<StateRecord> {
    let schema = current.schema.clone();
    let mut values = current.values.clone();

    for (field, value) in update.fields {
        let kind = schema
            .kind(&field)
            .ok_or_else(|| StateError::UnknownField(field.clone()))?;
        let reduced = kind.reduce(&field, values.get(&field), value)?;
        values.insert(field, reduced);
    }

    Ok(StateRecord { schema, values })
}
