//! Document store backend.
//!
//! [`DocumentLoader`] writes fixtures into any [`DocumentStore`]: one
//! collection per entity, one document per record, matched on the primary
//! key attributes. Document stores have no multi-document transactions here,
//! so a failed load undoes the writes it already made before returning.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fixtura_data::{Attributes, Fixture, RecordKey};
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::Loader;
use crate::catalog::EntityCatalog;
use crate::error::{LoaderError, LoaderResult};
use crate::plan::{BatchLedger, LoadPlan, deletion_batches};
use crate::report::{ChangeReport, TrackedInsertion, TrackedUpdate};
use crate::settings::{LoadMode, LoaderSettings};

/// Minimal document store interface.
///
/// A filter matches a document when every `(key, value)` pair of the filter
/// equals the document's value for that key.
#[async_trait]
pub trait DocumentStore: Send + Sync {
	/// Returns the first document matching `filter`.
	async fn find_one(&self, collection: &str, filter: &Attributes)
	-> LoaderResult<Option<Attributes>>;

	/// Returns every document matching `filter`.
	async fn find_many(&self, collection: &str, filter: &Attributes) -> LoaderResult<Vec<Attributes>>;

	/// Inserts one document.
	async fn insert_one(&self, collection: &str, document: Attributes) -> LoaderResult<()>;

	/// Replaces the first document matching `filter`; returns the number of
	/// documents replaced.
	async fn replace_one(
		&self,
		collection: &str,
		filter: &Attributes,
		document: Attributes,
	) -> LoaderResult<u64>;

	/// Deletes every document matching any of `filters`; returns the number
	/// of documents deleted.
	async fn delete_many(&self, collection: &str, filters: &[Attributes]) -> LoaderResult<u64>;

	/// Counts the documents of a collection.
	async fn count(&self, collection: &str) -> LoaderResult<u64>;

	/// Removes a collection.
	async fn drop_collection(&self, collection: &str) -> LoaderResult<()>;
}

/// Applies `record` on top of `existing`; fields the record does not set
/// keep their stored value.
fn merged(mut existing: Attributes, record: &Attributes) -> Attributes {
	for (key, value) in record {
		existing.insert(key.clone(), value.clone());
	}
	existing
}

fn matches(document: &Attributes, filter: &Attributes) -> bool {
	filter
		.iter()
		.all(|(key, value)| document.get(key) == Some(value))
}

/// In-process [`DocumentStore`].
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
	collections: RwLock<HashMap<String, Vec<Attributes>>>,
}

impl MemoryDocumentStore {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns true if `collection` exists.
	pub fn has_collection(&self, collection: &str) -> bool {
		self.collections.read().contains_key(collection)
	}

	/// Returns the collection names, sorted.
	pub fn collection_names(&self) -> Vec<String> {
		let mut names = self.collections.read().keys().cloned().collect::<Vec<_>>();
		names.sort();
		names
	}
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
	async fn find_one(
		&self,
		collection: &str,
		filter: &Attributes,
	) -> LoaderResult<Option<Attributes>> {
		let collections = self.collections.read();
		Ok(collections
			.get(collection)
			.and_then(|documents| documents.iter().find(|doc| matches(doc, filter)))
			.cloned())
	}

	async fn find_many(&self, collection: &str, filter: &Attributes) -> LoaderResult<Vec<Attributes>> {
		let collections = self.collections.read();
		Ok(collections
			.get(collection)
			.map(|documents| {
				documents
					.iter()
					.filter(|doc| matches(doc, filter))
					.cloned()
					.collect()
			})
			.unwrap_or_default())
	}

	async fn insert_one(&self, collection: &str, document: Attributes) -> LoaderResult<()> {
		self.collections
			.write()
			.entry(collection.to_string())
			.or_default()
			.push(document);
		Ok(())
	}

	async fn replace_one(
		&self,
		collection: &str,
		filter: &Attributes,
		document: Attributes,
	) -> LoaderResult<u64> {
		let mut collections = self.collections.write();
		let target = collections
			.get_mut(collection)
			.and_then(|documents| documents.iter_mut().find(|doc| matches(doc, filter)));
		match target {
			Some(existing) => {
				*existing = document;
				Ok(1)
			}
			None => Ok(0),
		}
	}

	async fn delete_many(&self, collection: &str, filters: &[Attributes]) -> LoaderResult<u64> {
		let mut collections = self.collections.write();
		let Some(documents) = collections.get_mut(collection) else {
			return Ok(0);
		};
		let before = documents.len();
		documents.retain(|doc| !filters.iter().any(|filter| matches(doc, filter)));
		Ok((before - documents.len()) as u64)
	}

	async fn count(&self, collection: &str) -> LoaderResult<u64> {
		Ok(self
			.collections
			.read()
			.get(collection)
			.map_or(0, |documents| documents.len() as u64))
	}

	async fn drop_collection(&self, collection: &str) -> LoaderResult<()> {
		self.collections.write().remove(collection);
		Ok(())
	}
}

/// Loader over a [`DocumentStore`].
///
/// Overwriting an existing document sets the record's fields and keeps the
/// rest, like an SQL `UPDATE` of the record's columns. Restoring puts the
/// whole snapshot back.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use fixtura_data::{ColumnType, EntitySchema};
/// use fixtura_loader::backends::document::{DocumentLoader, MemoryDocumentStore};
/// use fixtura_loader::EntityCatalog;
///
/// let catalog = EntityCatalog::new()
///     .register(EntitySchema::new("Article").primary_key("stub", ColumnType::Text));
/// let loader = DocumentLoader::new(catalog, Arc::new(MemoryDocumentStore::new()));
/// ```
#[derive(Debug)]
pub struct DocumentLoader<S> {
	catalog: EntityCatalog,
	store: Arc<S>,
	settings: LoaderSettings,
}

impl<S: DocumentStore> DocumentLoader<S> {
	/// Creates a loader with default settings.
	pub fn new(catalog: EntityCatalog, store: Arc<S>) -> Self {
		Self::with_settings(catalog, store, LoaderSettings::default())
	}

	/// Creates a loader with explicit settings.
	pub fn with_settings(catalog: EntityCatalog, store: Arc<S>, settings: LoaderSettings) -> Self {
		Self {
			catalog,
			store,
			settings,
		}
	}

	/// Returns the underlying store.
	pub fn store(&self) -> &Arc<S> {
		&self.store
	}

	/// Returns the loader settings.
	pub fn settings(&self) -> &LoaderSettings {
		&self.settings
	}

	fn collection(&self, entity: &str) -> LoaderResult<String> {
		Ok(self.catalog.require(entity)?.table().to_string())
	}

	async fn apply(&self, plan: &LoadPlan, ledger: &mut BatchLedger) -> LoaderResult<()> {
		for record in plan.records() {
			let entity = record.entity.name();
			let collection = record.entity.table();
			let filter = record.key.to_attributes();

			if ledger.created_here(entity, &record.key) {
				if self.settings.load_mode == LoadMode::Overwrite {
					if let Some(existing) = self.store.find_one(collection, &filter).await? {
						self.store
							.replace_one(collection, &filter, merged(existing, record.attributes()))
							.await?;
					}
				}
				continue;
			}

			match self.store.find_one(collection, &filter).await? {
				None => {
					self.store
						.insert_one(collection, record.attributes().clone())
						.await?;
					ledger.record_insert(entity, &record.key);
					debug!(entity, key = %record.key, "inserted document");
				}
				Some(_) if self.settings.load_mode == LoadMode::KeepExisting => {
					warn!(entity, key = %record.key, "keeping existing document");
				}
				Some(existing) => {
					let document = merged(existing.clone(), record.attributes());
					ledger.record_update(entity, &record.key, existing);
					self.store.replace_one(collection, &filter, document).await?;
					debug!(entity, key = %record.key, "overwrote document");
				}
			}
		}
		Ok(())
	}
}

#[async_trait]
impl<S: DocumentStore + 'static> Loader for DocumentLoader<S> {
	type Handle = Arc<S>;

	fn catalog(&self) -> &EntityCatalog {
		&self.catalog
	}

	async fn connect(&self) -> LoaderResult<Arc<S>> {
		Ok(Arc::clone(&self.store))
	}

	async fn add_data(&self, handle: &mut Arc<S>, fixture: &Fixture) -> LoaderResult<ChangeReport> {
		let plan = LoadPlan::build(&self.catalog, fixture)?;
		let mut ledger = BatchLedger::new(&plan);

		if let Err(error) = self.apply(&plan, &mut ledger).await {
			let partial = ledger.finish();
			warn!(
				fixture = fixture.name(),
				inserted = partial.inserted_count(),
				updated = partial.updated_count(),
				"load failed, undoing partial writes"
			);
			if let Err(undo) = self.delete_data(handle, &partial.inserted).await {
				warn!(error = %undo, "failed to delete partially loaded documents");
			}
			if let Err(undo) = self.restore_data(handle, &partial.updated).await {
				warn!(error = %undo, "failed to restore partially overwritten documents");
			}
			return Err(error);
		}

		let report = ledger.finish();
		debug!(
			fixture = fixture.name(),
			inserted = report.inserted_count(),
			updated = report.updated_count(),
			"loaded fixture into document store"
		);
		Ok(report)
	}

	async fn delete_data(
		&self,
		handle: &mut Arc<S>,
		insertions: &[TrackedInsertion],
	) -> LoaderResult<()> {
		for (schema, keys) in deletion_batches(&self.catalog, insertions)? {
			let collection = schema.table();
			let mut deleted = 0;
			for chunk in keys.chunks(self.settings.chunk_size()) {
				let filters = chunk.iter().map(RecordKey::to_attributes).collect::<Vec<_>>();
				deleted += handle.delete_many(collection, &filters).await?;
			}
			debug!(entity = schema.name(), count = deleted, "deleted documents");
			if handle.count(collection).await? == 0 {
				handle.drop_collection(collection).await?;
				debug!(collection, "dropped empty collection");
			}
		}
		Ok(())
	}

	async fn restore_data(&self, handle: &mut Arc<S>, updates: &[TrackedUpdate]) -> LoaderResult<()> {
		for update in updates {
			let collection = self.collection(&update.entity)?;
			let filter = update.key.to_attributes();
			if handle.find_one(&collection, &filter).await?.is_none() {
				return Err(LoaderError::RestoreTargetMissing {
					entity: update.entity.clone(),
					key: update.key.to_string(),
				});
			}
			handle
				.replace_one(&collection, &filter, update.original.clone())
				.await?;
		}
		if !updates.is_empty() {
			debug!(count = updates.len(), "restored documents");
		}
		Ok(())
	}

	async fn count(&self, handle: &mut Arc<S>, entity: &str) -> LoaderResult<u64> {
		let collection = self.collection(entity)?;
		handle.count(&collection).await
	}

	async fn all(&self, handle: &mut Arc<S>, entity: &str) -> LoaderResult<Vec<Attributes>> {
		let collection = self.collection(entity)?;
		handle.find_many(&collection, &Attributes::new()).await
	}

	async fn get(
		&self,
		handle: &mut Arc<S>,
		entity: &str,
		key: &RecordKey,
	) -> LoaderResult<Option<Attributes>> {
		let collection = self.collection(entity)?;
		handle.find_one(&collection, &key.to_attributes()).await
	}

	async fn filter_by(
		&self,
		handle: &mut Arc<S>,
		entity: &str,
		filter: &Attributes,
	) -> LoaderResult<Vec<Attributes>> {
		let collection = self.collection(entity)?;
		handle.find_many(&collection, filter).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fixtura_data::{ColumnType, DataGroup, EntitySchema, RecordDecl};
	use rstest::{fixture, rstest};
	use serde_json::json;

	#[fixture]
	fn loader() -> DocumentLoader<MemoryDocumentStore> {
		let catalog = EntityCatalog::new().register(
			EntitySchema::new("Article")
				.with_table("articles")
				.primary_key("stub", ColumnType::Text)
				.column("name", ColumnType::Text),
		);
		DocumentLoader::new(catalog, Arc::new(MemoryDocumentStore::new()))
	}

	fn articles(names: &[(&str, &str)]) -> Arc<Fixture> {
		let group = names
			.iter()
			.fold(DataGroup::builder("Article"), |group, (stub, name)| {
				group.record(RecordDecl::new(*stub).set("stub", *stub).set("name", *name))
			})
			.build()
			.unwrap();
		Fixture::builder("articles").group(&group).build().unwrap()
	}

	#[rstest]
	#[tokio::test]
	async fn test_load_then_delete_drops_collection(loader: DocumentLoader<MemoryDocumentStore>) {
		// Arrange
		let fixture = articles(&[("a1", "First"), ("a2", "Second")]);
		let mut handle = loader.connect().await.unwrap();

		// Act
		let report = loader.add_data(&mut handle, &fixture).await.unwrap();
		let loaded = loader.count(&mut handle, "Article").await.unwrap();
		loader.delete_data(&mut handle, &report.inserted).await.unwrap();

		// Assert
		assert_eq!(loaded, 2);
		assert_eq!(report.inserted_count(), 2);
		assert!(!loader.store().has_collection("articles"));
	}

	#[rstest]
	#[tokio::test]
	async fn test_overwrite_then_restore(loader: DocumentLoader<MemoryDocumentStore>) {
		// Arrange
		let mut handle = loader.connect().await.unwrap();
		let original = articles(&[("a1", "Original")]);
		loader.add_data(&mut handle, &original).await.unwrap();

		// Act
		let report = loader
			.add_data(&mut handle, &articles(&[("a1", "Changed")]))
			.await
			.unwrap();
		let changed = loader
			.get(&mut handle, "Article", &RecordKey::single("stub", "a1"))
			.await
			.unwrap()
			.unwrap();
		loader.restore_data(&mut handle, &report.updated).await.unwrap();
		let restored = loader
			.get(&mut handle, "Article", &RecordKey::single("stub", "a1"))
			.await
			.unwrap()
			.unwrap();

		// Assert
		assert!(report.inserted.is_empty());
		assert_eq!(changed.get("name"), Some(&json!("Changed")));
		assert_eq!(restored.get("name"), Some(&json!("Original")));
	}

	#[rstest]
	#[tokio::test]
	async fn test_overwrite_keeps_unset_fields(loader: DocumentLoader<MemoryDocumentStore>) {
		// Arrange
		let existing: Attributes = [
			("stub".to_string(), json!("a1")),
			("name".to_string(), json!("Original")),
			("views".to_string(), json!(42)),
		]
		.into_iter()
		.collect();
		loader.store().insert_one("articles", existing.clone()).await.unwrap();
		let mut handle = loader.connect().await.unwrap();

		// Act
		let report = loader
			.add_data(&mut handle, &articles(&[("a1", "Changed")]))
			.await
			.unwrap();
		let overwritten = loader
			.store()
			.find_one("articles", &RecordKey::single("stub", "a1").to_attributes())
			.await
			.unwrap()
			.unwrap();
		loader.restore_data(&mut handle, &report.updated).await.unwrap();
		let restored = loader
			.store()
			.find_one("articles", &RecordKey::single("stub", "a1").to_attributes())
			.await
			.unwrap()
			.unwrap();

		// Assert
		assert_eq!(overwritten.get("name"), Some(&json!("Changed")));
		assert_eq!(overwritten.get("views"), Some(&json!(42)));
		assert_eq!(restored, existing);
	}

	#[rstest]
	#[tokio::test]
	async fn test_restore_of_deleted_document_fails(loader: DocumentLoader<MemoryDocumentStore>) {
		let mut handle = loader.connect().await.unwrap();
		let first = loader
			.add_data(&mut handle, &articles(&[("a1", "Original")]))
			.await
			.unwrap();
		let second = loader
			.add_data(&mut handle, &articles(&[("a1", "Changed")]))
			.await
			.unwrap();
		loader.delete_data(&mut handle, &first.inserted).await.unwrap();

		let error = loader
			.restore_data(&mut handle, &second.updated)
			.await
			.unwrap_err();

		assert!(matches!(error, LoaderError::RestoreTargetMissing { ref entity, .. } if entity == "Article"));
	}

	#[rstest]
	#[tokio::test]
	async fn test_keep_existing_leaves_document() {
		let catalog = EntityCatalog::new().register(
			EntitySchema::new("Article")
				.primary_key("stub", ColumnType::Text)
				.column("name", ColumnType::Text),
		);
		let loader = DocumentLoader::with_settings(
			catalog,
			Arc::new(MemoryDocumentStore::new()),
			LoaderSettings::new().with_load_mode(LoadMode::KeepExisting),
		);
		let mut handle = loader.connect().await.unwrap();
		loader
			.add_data(&mut handle, &articles(&[("a1", "Original")]))
			.await
			.unwrap();

		let report = loader
			.add_data(&mut handle, &articles(&[("a1", "Changed")]))
			.await
			.unwrap();

		assert!(report.is_empty());
		let rows = loader
			.filter_by(
				&mut handle,
				"Article",
				&[("name".to_string(), json!("Original"))].into_iter().collect(),
			)
			.await
			.unwrap();
		assert_eq!(rows.len(), 1);
	}
}
