//! Entity catalog.
//!
//! The catalog maps entity names and group-key aliases to schemas. Its
//! registration order is the load order: register referenced entities
//! before the entities that reference them. Deletion runs in reverse.

use std::collections::HashMap;
use std::sync::Arc;

use fixtura_data::{Datum, EntitySchema};
use indexmap::IndexMap;

use crate::error::{LoaderError, LoaderResult};

/// Ordered registry of the entities a loader can write.
///
/// # Example
///
/// ```
/// use fixtura_data::{ColumnType, EntitySchema};
/// use fixtura_loader::EntityCatalog;
///
/// let catalog = EntityCatalog::new()
///     .register(EntitySchema::new("Article").primary_key("stub", ColumnType::Text))
///     .register(EntitySchema::new("Comment").primary_key("id", ColumnType::Integer))
///     .with_alias("Comments", "Comment");
///
/// assert_eq!(catalog.position("Comment"), Some(1));
/// assert!(catalog.get("Article").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
	entities: IndexMap<String, Arc<EntitySchema>>,
	aliases: HashMap<String, String>,
}

impl EntityCatalog {
	/// Creates an empty catalog.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an entity after every entity registered so far.
	pub fn register(mut self, schema: impl Into<Arc<EntitySchema>>) -> Self {
		let schema = schema.into();
		self.entities.insert(schema.name().to_string(), schema);
		self
	}

	/// Resolves records of group `group_key` to `entity`.
	pub fn with_alias(mut self, group_key: impl Into<String>, entity: impl Into<String>) -> Self {
		self.aliases.insert(group_key.into(), entity.into());
		self
	}

	/// Returns the schema registered as `name`.
	pub fn get(&self, name: &str) -> Option<&Arc<EntitySchema>> {
		self.entities.get(name)
	}

	/// Returns the schema registered as `name` or fails.
	pub fn require(&self, name: &str) -> LoaderResult<&Arc<EntitySchema>> {
		self.get(name)
			.ok_or_else(|| LoaderError::UnknownEntity(name.to_string()))
	}

	/// Returns the registration position of `name`.
	pub fn position(&self, name: &str) -> Option<usize> {
		self.entities.get_index_of(name)
	}

	/// Iterates over the schemas in registration order.
	pub fn entities(&self) -> impl DoubleEndedIterator<Item = &Arc<EntitySchema>> {
		self.entities.values()
	}

	/// Determines the entity of `datum`, declared under `group_key`.
	///
	/// The record's own entity wins, then an alias for the group key, then an
	/// entity named like the group key.
	pub fn resolve(&self, group_key: &str, datum: &Datum) -> LoaderResult<Arc<EntitySchema>> {
		let name = match datum.entity_name() {
			Some(name) => name,
			None => match self.aliases.get(group_key) {
				Some(entity) => entity.as_str(),
				None if self.entities.contains_key(group_key) => group_key,
				None => {
					return Err(LoaderError::LookupAmbiguity {
						group: group_key.to_string(),
						record: datum.name().to_string(),
					});
				}
			},
		};
		self.require(name).cloned()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fixtura_data::{ColumnType, DataGroup, RecordDecl};
	use rstest::{fixture, rstest};

	#[fixture]
	fn catalog() -> EntityCatalog {
		EntityCatalog::new()
			.register(EntitySchema::new("Article").primary_key("stub", ColumnType::Text))
			.register(EntitySchema::new("Comment").primary_key("id", ColumnType::Integer))
			.with_alias("Feedback", "Comment")
	}

	fn untagged(name: &str) -> Arc<Datum> {
		let group = DataGroup::builder("any")
			.record(RecordDecl::new(name))
			.build()
			.unwrap();
		Arc::clone(group.get(name).unwrap())
	}

	#[rstest]
	fn test_resolve_by_group_key(catalog: EntityCatalog) {
		let schema = catalog.resolve("Article", &untagged("a")).unwrap();
		assert_eq!(schema.name(), "Article");
	}

	#[rstest]
	fn test_resolve_by_alias(catalog: EntityCatalog) {
		let schema = catalog.resolve("Feedback", &untagged("c")).unwrap();
		assert_eq!(schema.name(), "Comment");
	}

	#[rstest]
	fn test_unresolvable_group_is_ambiguous(catalog: EntityCatalog) {
		let error = catalog.resolve("Misc", &untagged("x")).unwrap_err();
		assert!(matches!(error, LoaderError::LookupAmbiguity { ref group, .. } if group == "Misc"));
	}

	#[rstest]
	fn test_declared_entity_must_be_registered(catalog: EntityCatalog) {
		let tag = Arc::new(EntitySchema::new("Tag").primary_key("id", ColumnType::Integer));
		let group = DataGroup::builder("Article")
			.entity(&tag)
			.record(RecordDecl::new("t").set("id", 1))
			.build()
			.unwrap();

		let error = catalog
			.resolve("Article", group.get("t").unwrap())
			.unwrap_err();
		assert!(matches!(error, LoaderError::UnknownEntity(ref name) if name == "Tag"));
	}
}
