//! Loader backends.
//!
//! A [`Loader`] applies a fixture to one store and reverses exactly what it
//! did. Each open session holds its own [`Loader::Handle`], so nested
//! sessions against the same loader do not share store state.
//!
//! Available backends:
//!
//! - [`SqlLoader`](sql::SqlLoader) for relational stores (feature `sql`)
//! - [`DocumentLoader`](document::DocumentLoader) for document stores
//!   (feature `document`)
//! - [`NoopLoader`](noop::NoopLoader), which touches nothing

use async_trait::async_trait;
use fixtura_data::{Attributes, Fixture, RecordKey};

use crate::catalog::EntityCatalog;
use crate::error::LoaderResult;
use crate::report::{ChangeReport, TrackedInsertion, TrackedUpdate};

#[cfg(feature = "document")]
pub mod document;
pub mod noop;
#[cfg(feature = "sql")]
pub mod sql;

/// Backend-specific adapter between fixtures and a store.
#[async_trait]
pub trait Loader: Send + Sync {
	/// Store handle owned by one session.
	type Handle: Send;

	/// Returns the catalog of entities this loader can write.
	fn catalog(&self) -> &EntityCatalog;

	/// Acquires a store handle.
	async fn connect(&self) -> LoaderResult<Self::Handle>;

	/// Applies every record of `fixture`.
	///
	/// Every record is resolved and validated before the first write. Rows
	/// that do not exist are created; rows that exist are snapshotted and
	/// overwritten, or left alone in keep-existing mode.
	async fn add_data(&self, handle: &mut Self::Handle, fixture: &Fixture)
	-> LoaderResult<ChangeReport>;

	/// Deletes exactly the rows in `insertions`.
	async fn delete_data(
		&self,
		handle: &mut Self::Handle,
		insertions: &[TrackedInsertion],
	) -> LoaderResult<()>;

	/// Overwrites every row in `updates` with its snapshot.
	///
	/// A row that no longer exists fails with
	/// [`LoaderError::RestoreTargetMissing`](crate::LoaderError::RestoreTargetMissing).
	async fn restore_data(
		&self,
		handle: &mut Self::Handle,
		updates: &[TrackedUpdate],
	) -> LoaderResult<()>;

	/// Counts the rows of `entity`.
	async fn count(&self, handle: &mut Self::Handle, entity: &str) -> LoaderResult<u64>;

	/// Returns every row of `entity`.
	async fn all(&self, handle: &mut Self::Handle, entity: &str) -> LoaderResult<Vec<Attributes>>;

	/// Returns the row of `entity` with primary key `key`.
	async fn get(
		&self,
		handle: &mut Self::Handle,
		entity: &str,
		key: &RecordKey,
	) -> LoaderResult<Option<Attributes>>;

	/// Returns the rows of `entity` whose attributes equal every pair of
	/// `filter`.
	async fn filter_by(
		&self,
		handle: &mut Self::Handle,
		entity: &str,
		filter: &Attributes,
	) -> LoaderResult<Vec<Attributes>>;
}
