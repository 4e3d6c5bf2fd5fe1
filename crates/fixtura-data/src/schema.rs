//! Entity schema descriptors.
//!
//! An [`EntitySchema`] describes one persisted entity (a table or a document
//! collection): its columns, which of them are required and which form the
//! primary key. Schemas are supplied by the caller; the engine only reads them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DataError, DataResult};
use crate::value::Attributes;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
	/// 64-bit signed integer.
	Integer,
	/// Double precision float.
	Real,
	/// UTF-8 text.
	Text,
	/// Boolean.
	Boolean,
	/// Arbitrary JSON, stored as text in relational stores.
	Json,
}

/// One column of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
	/// Column name.
	pub name: String,
	/// Storage type.
	pub column_type: ColumnType,
	/// Whether a record must provide a value (no nulls, no store default).
	pub required: bool,
}

/// Descriptor of one persisted entity.
///
/// # Example
///
/// ```
/// use fixtura_data::schema::{ColumnType, EntitySchema};
///
/// let article = EntitySchema::new("Article")
///     .primary_key("stub", ColumnType::Text)
///     .column("name", ColumnType::Text)
///     .column("score", ColumnType::Integer);
///
/// assert_eq!(article.table(), "Article");
/// assert_eq!(article.primary_key_columns(), ["stub".to_string()]);
/// assert!(article.has_column("score"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
	name: String,
	table: String,
	columns: Vec<Column>,
	primary_key: Vec<String>,
}

impl EntitySchema {
	/// Creates a schema whose table name equals the entity name.
	pub fn new(name: impl Into<String>) -> Self {
		let name = name.into();
		Self {
			table: name.clone(),
			name,
			columns: Vec::new(),
			primary_key: Vec::new(),
		}
	}

	/// Sets the table or collection name.
	pub fn with_table(mut self, table: impl Into<String>) -> Self {
		self.table = table.into();
		self
	}

	/// Adds a primary key column. Call repeatedly for composite keys.
	pub fn primary_key(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
		let name = name.into();
		self.primary_key.push(name.clone());
		self.columns.push(Column {
			name,
			column_type,
			required: true,
		});
		self
	}

	/// Adds an optional column.
	pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
		self.columns.push(Column {
			name: name.into(),
			column_type,
			required: false,
		});
		self
	}

	/// Adds a column every record must provide.
	pub fn required_column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
		self.columns.push(Column {
			name: name.into(),
			column_type,
			required: true,
		});
		self
	}

	/// Returns the entity name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns the table or collection name.
	pub fn table(&self) -> &str {
		&self.table
	}

	/// Returns the columns in declaration order.
	pub fn columns(&self) -> &[Column] {
		&self.columns
	}

	/// Returns the column named `name`.
	pub fn column_named(&self, name: &str) -> Option<&Column> {
		self.columns.iter().find(|column| column.name == name)
	}

	/// Returns true if the entity declares `name`.
	pub fn has_column(&self, name: &str) -> bool {
		self.column_named(name).is_some()
	}

	/// Returns the primary key column names.
	pub fn primary_key_columns(&self) -> &[String] {
		&self.primary_key
	}

	/// Checks that the schema can identify rows.
	pub fn ensure_keyed(&self) -> DataResult<()> {
		if self.primary_key.is_empty() {
			return Err(DataError::NoPrimaryKey(self.name.clone()));
		}
		Ok(())
	}

	/// Validates a record's resolved attributes against the schema.
	///
	/// # Errors
	///
	/// Returns [`DataError::UnknownAttribute`] for an attribute the entity does
	/// not declare and [`DataError::MissingAttribute`] for a required column
	/// left without a value.
	pub fn validate(&self, record: &str, attributes: &Attributes) -> DataResult<()> {
		self.ensure_keyed()?;
		if let Some(attribute) = attributes.keys().find(|key| !self.has_column(key)) {
			return Err(DataError::UnknownAttribute {
				entity: self.name.clone(),
				record: record.to_string(),
				attribute: attribute.clone(),
			});
		}
		for column in self.columns.iter().filter(|column| column.required) {
			match attributes.get(&column.name) {
				Some(value) if !value.is_null() => {}
				_ => {
					return Err(DataError::MissingAttribute {
						entity: self.name.clone(),
						record: record.to_string(),
						attribute: column.name.clone(),
					});
				}
			}
		}
		Ok(())
	}

	/// Extracts the primary key of a record.
	///
	/// Returns `None` if any key column is absent or null.
	pub fn key_of(&self, attributes: &Attributes) -> Option<RecordKey> {
		if self.primary_key.is_empty() {
			return None;
		}
		self.primary_key
			.iter()
			.map(|column| match attributes.get(column) {
				Some(value) if !value.is_null() => Some((column.clone(), value.clone())),
				_ => None,
			})
			.collect::<Option<Vec<_>>>()
			.map(RecordKey)
	}

	/// Builds a key from a bare value.
	///
	/// A single-column key accepts any value; a composite key expects a JSON
	/// array with one element per key column.
	pub fn key_from_value(&self, value: Value) -> Option<RecordKey> {
		match (self.primary_key.as_slice(), value) {
			([], _) => None,
			([column], value) => Some(RecordKey::single(column.clone(), value)),
			(columns, Value::Array(values)) if values.len() == columns.len() => Some(RecordKey(
				columns.iter().cloned().zip(values).collect(),
			)),
			_ => None,
		}
	}
}

/// Primary key of one row: `(column, value)` pairs in key column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordKey(pub Vec<(String, Value)>);

impl RecordKey {
	/// Creates a single-column key.
	pub fn single(column: impl Into<String>, value: impl Into<Value>) -> Self {
		Self(vec![(column.into(), value.into())])
	}

	/// Returns the key columns and values.
	pub fn parts(&self) -> &[(String, Value)] {
		&self.0
	}

	/// Returns the key as an attribute mapping, usable as an equality filter.
	pub fn to_attributes(&self) -> Attributes {
		self.0.iter().cloned().collect()
	}

	/// Returns a stable string form, used to detect repeated keys.
	pub fn canonical(&self) -> String {
		self.0
			.iter()
			.map(|(column, value)| format!("{}={}", column, value))
			.collect::<Vec<_>>()
			.join("&")
	}
}

impl fmt::Display for RecordKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.0.as_slice() {
			[(_, value)] => write!(f, "{}", value),
			parts => {
				let rendered = parts
					.iter()
					.map(|(column, value)| format!("{}={}", column, value))
					.collect::<Vec<_>>();
				write!(f, "({})", rendered.join(", "))
			}
		}
	}
}
