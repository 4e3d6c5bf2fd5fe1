//! Record declarations and their materialized form.
//!
//! A [`RecordDecl`] is what a test author writes: a name, optional base
//! records and explicit attribute values. Materialization merges it with the
//! owning group's defaults and overrides into an immutable [`Datum`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::DataResult;
use crate::schema::{EntitySchema, RecordKey};
use crate::value::{AttrValue, Attributes, Producer};

/// Declaration of one record before materialization.
///
/// # Example
///
/// ```
/// use fixtura_data::datum::RecordDecl;
///
/// let decl = RecordDecl::new("article1")
///     .set("stub", "article1")
///     .set("name", "The First Article");
/// assert_eq!(decl.name(), "article1");
/// ```
#[derive(Debug, Clone)]
pub struct RecordDecl {
	name: String,
	bases: Vec<Arc<Datum>>,
	values: IndexMap<String, AttrValue>,
}

impl RecordDecl {
	/// Creates an empty declaration.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			bases: Vec::new(),
			values: IndexMap::new(),
		}
	}

	/// Creates a declaration from an already built attribute mapping.
	pub fn from_attributes(name: impl Into<String>, attributes: Attributes) -> Self {
		Self {
			name: name.into(),
			bases: Vec::new(),
			values: attributes
				.into_iter()
				.map(|(key, value)| (key, AttrValue::Literal(value)))
				.collect(),
		}
	}

	/// Inherits every attribute of `base`.
	///
	/// Bases added first take precedence over bases added later; the
	/// record's own values take precedence over all bases.
	pub fn extends(mut self, base: &Arc<Datum>) -> Self {
		self.bases.push(Arc::clone(base));
		self
	}

	/// Sets a literal attribute.
	pub fn set(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.attr(key, AttrValue::Literal(value.into()))
	}

	/// Sets an attribute produced on materialization.
	pub fn set_lazy(self, key: impl Into<String>, producer: Producer) -> Self {
		self.attr(key, AttrValue::Lazy(producer))
	}

	/// Sets an attribute from an [`AttrValue`].
	pub fn attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
		self.values.insert(key.into(), value);
		self
	}

	/// Returns the record name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Resolves the declaration into a [`Datum`].
	///
	/// Precedence, lowest first: `defaults` (only for keys nothing else
	/// sets), bases, explicit values, `overrides`. Lazy values are invoked
	/// once, in resolution order, after the merge.
	pub(crate) fn materialize(
		self,
		entity: Option<&Arc<EntitySchema>>,
		defaults: &IndexMap<String, AttrValue>,
		overrides: &IndexMap<String, AttrValue>,
	) -> DataResult<Datum> {
		let mut merged: IndexMap<String, AttrValue> = IndexMap::new();
		for base in self.bases.iter().rev() {
			for (key, value) in base.attributes() {
				merged.insert(key.clone(), AttrValue::Literal(value.clone()));
			}
		}
		for (key, value) in self.values {
			merged.insert(key, value);
		}
		for (key, value) in defaults {
			if !merged.contains_key(key) {
				merged.insert(key.clone(), value.clone());
			}
		}
		for (key, value) in overrides {
			merged.insert(key.clone(), value.clone());
		}

		let attributes: Attributes = merged
			.into_iter()
			.map(|(key, value)| (key, value.resolve()))
			.collect();

		let entity = entity
			.cloned()
			.or_else(|| self.bases.iter().find_map(|base| base.entity.clone()));
		if let Some(schema) = &entity {
			schema.validate(&self.name, &attributes)?;
		}

		Ok(Datum {
			name: self.name,
			entity,
			attributes,
		})
	}
}

/// One fully resolved, immutable record.
///
/// Equality compares the name, entity and attributes; hashing uses only the
/// name and entity so that data groups can be compared as sets.
#[derive(Debug, Clone)]
pub struct Datum {
	name: String,
	entity: Option<Arc<EntitySchema>>,
	attributes: Attributes,
}

impl Datum {
	/// Returns the record name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns the entity schema, if known at declaration time.
	pub fn entity(&self) -> Option<&Arc<EntitySchema>> {
		self.entity.as_ref()
	}

	/// Returns the entity name, if known at declaration time.
	pub fn entity_name(&self) -> Option<&str> {
		self.entity.as_deref().map(EntitySchema::name)
	}

	/// Returns the value of one attribute.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.attributes.get(key)
	}

	/// Returns the resolved attributes.
	pub fn attributes(&self) -> &Attributes {
		&self.attributes
	}

	/// Returns the attribute names.
	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.attributes.keys().map(String::as_str)
	}

	/// Returns a copy of the attributes.
	pub fn to_attributes(&self) -> Attributes {
		self.attributes.clone()
	}

	/// Returns a copy of the attributes with `extra` applied on top.
	pub fn to_attributes_with<I, K, V>(&self, extra: I) -> Attributes
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<Value>,
	{
		let mut attributes = self.attributes.clone();
		for (key, value) in extra {
			attributes.insert(key.into(), value.into());
		}
		attributes
	}

	/// Returns the primary key of this record under `schema`.
	pub fn key_for(&self, schema: &EntitySchema) -> Option<RecordKey> {
		schema.key_of(&self.attributes)
	}
}

impl PartialEq for Datum {
	fn eq(&self, other: &Self) -> bool {
		self.name == other.name
			&& self.entity_name() == other.entity_name()
			&& self.attributes == other.attributes
	}
}

impl Eq for Datum {}

impl Hash for Datum {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.name.hash(state);
		self.entity_name().hash(state);
	}
}

impl fmt::Display for Datum {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.entity_name() {
			Some(entity) => write!(f, "{}.{}", entity, self.name),
			None => f.write_str(&self.name),
		}
	}
}
