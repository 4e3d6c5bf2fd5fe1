//! Load planning shared by every backend.
//!
//! A [`LoadPlan`] resolves and validates every record of a fixture before a
//! single write happens, then orders the records for loading. A
//! [`BatchLedger`] accumulates the change report while a batch runs.

use std::collections::HashSet;
use std::sync::Arc;

use fixtura_data::{Attributes, Datum, EntitySchema, Fixture, RecordKey};
use indexmap::IndexMap;

use crate::catalog::EntityCatalog;
use crate::error::{LoaderError, LoaderResult};
use crate::report::{ChangeReport, TrackedInsertion, TrackedUpdate};

/// One record ready to be written.
#[derive(Debug, Clone)]
pub struct PlannedRecord {
	/// Group key the record was declared under.
	pub group: String,
	/// Resolved entity schema.
	pub entity: Arc<EntitySchema>,
	/// Primary key of the record.
	pub key: RecordKey,
	/// The record itself.
	pub datum: Arc<Datum>,
}

impl PlannedRecord {
	/// Returns the attributes to write.
	pub fn attributes(&self) -> &Attributes {
		self.datum.attributes()
	}
}

/// Validated, ordered list of records to load.
#[derive(Debug, Clone, Default)]
pub struct LoadPlan {
	records: Vec<PlannedRecord>,
}

impl LoadPlan {
	/// Resolves every record of `fixture` against `catalog`.
	///
	/// Records are ordered by the catalog position of their entity, then by
	/// group order, then by declaration order.
	///
	/// # Errors
	///
	/// Fails with the first resolution or validation error; nothing has been
	/// written at that point.
	pub fn build(catalog: &EntityCatalog, fixture: &Fixture) -> LoaderResult<Self> {
		let mut records = Vec::new();
		for (group, datum) in fixture.records() {
			let entity = catalog.resolve(group, datum)?;
			entity.validate(datum.name(), datum.attributes())?;
			let key = datum
				.key_for(&entity)
				.ok_or_else(|| LoaderError::MissingKey {
					entity: entity.name().to_string(),
					record: datum.name().to_string(),
				})?;
			records.push(PlannedRecord {
				group: group.to_string(),
				entity,
				key,
				datum: Arc::clone(datum),
			});
		}
		records.sort_by_key(|record| catalog.position(record.entity.name()));
		Ok(Self { records })
	}

	/// Returns the planned records in load order.
	pub fn records(&self) -> &[PlannedRecord] {
		&self.records
	}

	/// Returns the number of planned records.
	pub fn len(&self) -> usize {
		self.records.len()
	}

	/// Returns true if there is nothing to load.
	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	/// Returns the touched entity names in load order.
	pub fn touched(&self) -> Vec<String> {
		let mut touched: Vec<String> = Vec::new();
		for record in &self.records {
			if !touched.iter().any(|name| name == record.entity.name()) {
				touched.push(record.entity.name().to_string());
			}
		}
		touched
	}
}

/// Bookkeeping for one load batch.
///
/// A key written twice within the batch is tracked once: a row the batch
/// created is never snapshotted, and only the first snapshot of an existing
/// row is kept.
#[derive(Debug, Default)]
pub struct BatchLedger {
	inserted: HashSet<String>,
	updated: HashSet<String>,
	report: ChangeReport,
}

impl BatchLedger {
	/// Starts a ledger for `plan`.
	pub fn new(plan: &LoadPlan) -> Self {
		Self {
			report: ChangeReport {
				touched: plan.touched(),
				..ChangeReport::default()
			},
			..Self::default()
		}
	}

	fn slot(entity: &str, key: &RecordKey) -> String {
		format!("{}#{}", entity, key.canonical())
	}

	/// Returns true if the row was created earlier in this batch.
	pub fn created_here(&self, entity: &str, key: &RecordKey) -> bool {
		self.inserted.contains(&Self::slot(entity, key))
	}

	/// Returns true if a snapshot of the row must be taken before writing.
	pub fn needs_snapshot(&self, entity: &str, key: &RecordKey) -> bool {
		let slot = Self::slot(entity, key);
		!self.inserted.contains(&slot) && !self.updated.contains(&slot)
	}

	/// Records a created row.
	pub fn record_insert(&mut self, entity: &str, key: &RecordKey) {
		self.inserted.insert(Self::slot(entity, key));
		self.report.inserted.push(TrackedInsertion {
			entity: entity.to_string(),
			key: key.clone(),
		});
	}

	/// Records an overwritten row and its prior state.
	pub fn record_update(&mut self, entity: &str, key: &RecordKey, original: Attributes) {
		if !self.needs_snapshot(entity, key) {
			return;
		}
		self.updated.insert(Self::slot(entity, key));
		self.report.updated.push(TrackedUpdate {
			entity: entity.to_string(),
			key: key.clone(),
			original,
		});
	}

	/// Returns the finished report.
	pub fn finish(self) -> ChangeReport {
		self.report
	}
}

/// Groups tracked insertions by entity, in reverse catalog order.
///
/// Entities missing from the catalog are reported as
/// [`LoaderError::UnknownEntity`].
pub fn deletion_batches(
	catalog: &EntityCatalog,
	insertions: &[TrackedInsertion],
) -> LoaderResult<Vec<(Arc<EntitySchema>, Vec<RecordKey>)>> {
	let mut by_entity: IndexMap<String, Vec<RecordKey>> = IndexMap::new();
	for insertion in insertions {
		catalog.require(&insertion.entity)?;
		by_entity
			.entry(insertion.entity.clone())
			.or_default()
			.push(insertion.key.clone());
	}
	let mut batches = Vec::with_capacity(by_entity.len());
	for schema in catalog.entities().rev() {
		if let Some(keys) = by_entity.shift_remove(schema.name()) {
			batches.push((Arc::clone(schema), keys));
		}
	}
	Ok(batches)
}

#[cfg(test)]
mod tests {
	use super::*;
	use fixtura_data::{ColumnType, DataError, DataGroup, RecordDecl};
	use rstest::{fixture, rstest};
	use serde_json::json;

	#[fixture]
	fn catalog() -> EntityCatalog {
		EntityCatalog::new()
			.register(
				EntitySchema::new("Article")
					.primary_key("stub", ColumnType::Text)
					.column("name", ColumnType::Text),
			)
			.register(
				EntitySchema::new("Comment")
					.primary_key("id", ColumnType::Integer)
					.column("article_stub", ColumnType::Text),
			)
	}

	#[rstest]
	fn test_records_follow_catalog_order(catalog: EntityCatalog) {
		let comments = DataGroup::builder("Comment")
			.record(RecordDecl::new("c1").set("id", 1).set("article_stub", "a1"))
			.build()
			.unwrap();
		let articles = DataGroup::builder("Article")
			.record(RecordDecl::new("a1").set("stub", "a1"))
			.record(RecordDecl::new("a2").set("stub", "a2"))
			.build()
			.unwrap();
		let fixture = Fixture::builder("blog")
			.group(&comments)
			.group(&articles)
			.build()
			.unwrap();

		let plan = LoadPlan::build(&catalog, &fixture).unwrap();

		let names = plan
			.records()
			.iter()
			.map(|r| r.datum.name())
			.collect::<Vec<_>>();
		assert_eq!(names, ["a1", "a2", "c1"]);
		assert_eq!(plan.touched(), ["Article", "Comment"]);
	}

	#[rstest]
	fn test_validation_happens_before_loading(catalog: EntityCatalog) {
		let articles = DataGroup::builder("Article")
			.record(RecordDecl::new("a1").set("stub", "a1").set("flibble", 1))
			.build()
			.unwrap();
		let fixture = Fixture::builder("bad").group(&articles).build().unwrap();

		let error = LoadPlan::build(&catalog, &fixture).unwrap_err();
		assert!(matches!(
			error,
			LoaderError::Data(DataError::UnknownAttribute { .. })
		));
	}

	#[rstest]
	fn test_missing_key_rejected(catalog: EntityCatalog) {
		let articles = DataGroup::builder("Article")
			.record(RecordDecl::new("a1").set("name", "no stub"))
			.build()
			.unwrap();
		let fixture = Fixture::builder("bad").group(&articles).build().unwrap();

		let error = LoadPlan::build(&catalog, &fixture).unwrap_err();
		assert!(matches!(error, LoaderError::Data(DataError::MissingAttribute { .. })));
	}

	#[rstest]
	fn test_ledger_tracks_each_row_once() {
		let plan = LoadPlan::default();
		let mut ledger = BatchLedger::new(&plan);
		let created = RecordKey::single("id", 1);
		let existing = RecordKey::single("id", 2);

		ledger.record_insert("Comment", &created);
		ledger.record_update("Comment", &created, Attributes::new());
		ledger.record_update("Comment", &existing, [("id".to_string(), json!(2))].into_iter().collect());
		ledger.record_update("Comment", &existing, Attributes::new());

		assert!(ledger.created_here("Comment", &created));
		let report = ledger.finish();
		assert_eq!(report.inserted.len(), 1);
		assert_eq!(report.updated.len(), 1);
		assert_eq!(report.updated[0].original.get("id"), Some(&json!(2)));
	}

	#[rstest]
	fn test_deletion_batches_reverse_catalog_order(catalog: EntityCatalog) {
		let insertions = vec![
			TrackedInsertion {
				entity: "Article".to_string(),
				key: RecordKey::single("stub", "a1"),
			},
			TrackedInsertion {
				entity: "Comment".to_string(),
				key: RecordKey::single("id", 1),
			},
		];

		let batches = deletion_batches(&catalog, &insertions).unwrap();

		let order = batches
			.iter()
			.map(|(schema, _)| schema.name())
			.collect::<Vec<_>>();
		assert_eq!(order, ["Comment", "Article"]);
	}
}
