//! A loader that performs no I/O.
//!
//! Useful for exercising fixture declarations without a store: records are
//! still resolved and validated, but nothing is written and every query
//! returns nothing.

use async_trait::async_trait;
use fixtura_data::{Attributes, Fixture, RecordKey};
use tracing::debug;

use super::Loader;
use crate::catalog::EntityCatalog;
use crate::error::LoaderResult;
use crate::plan::LoadPlan;
use crate::report::{ChangeReport, TrackedInsertion, TrackedUpdate};

/// Loader that validates fixtures and writes nothing.
#[derive(Debug, Clone, Default)]
pub struct NoopLoader {
	catalog: EntityCatalog,
}

impl NoopLoader {
	/// Creates a no-op loader over `catalog`.
	pub fn new(catalog: EntityCatalog) -> Self {
		Self { catalog }
	}
}

#[async_trait]
impl Loader for NoopLoader {
	type Handle = ();

	fn catalog(&self) -> &EntityCatalog {
		&self.catalog
	}

	async fn connect(&self) -> LoaderResult<()> {
		Ok(())
	}

	async fn add_data(&self, _handle: &mut (), fixture: &Fixture) -> LoaderResult<ChangeReport> {
		let plan = LoadPlan::build(&self.catalog, fixture)?;
		debug!(fixture = fixture.name(), records = plan.len(), "skipping load");
		Ok(ChangeReport {
			touched: plan.touched(),
			..ChangeReport::default()
		})
	}

	async fn delete_data(&self, _handle: &mut (), _insertions: &[TrackedInsertion]) -> LoaderResult<()> {
		Ok(())
	}

	async fn restore_data(&self, _handle: &mut (), _updates: &[TrackedUpdate]) -> LoaderResult<()> {
		Ok(())
	}

	async fn count(&self, _handle: &mut (), entity: &str) -> LoaderResult<u64> {
		self.catalog.require(entity)?;
		Ok(0)
	}

	async fn all(&self, _handle: &mut (), entity: &str) -> LoaderResult<Vec<Attributes>> {
		self.catalog.require(entity)?;
		Ok(Vec::new())
	}

	async fn get(
		&self,
		_handle: &mut (),
		entity: &str,
		_key: &RecordKey,
	) -> LoaderResult<Option<Attributes>> {
		self.catalog.require(entity)?;
		Ok(None)
	}

	async fn filter_by(
		&self,
		_handle: &mut (),
		entity: &str,
		_filter: &Attributes,
	) -> LoaderResult<Vec<Attributes>> {
		self.catalog.require(entity)?;
		Ok(Vec::new())
	}
}
