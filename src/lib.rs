//! # Fixtura
//!
//! Declarative, stackable test-data fixtures.
//!
//! Integration tests declare named, reusable sets of records, load them into
//! a store before the test body runs, and get the store back in its exact
//! prior state afterwards, including when fixtures are nested inside one
//! another.
//!
//! ## Crates
//!
//! - [`data`] - record declarations, data groups, fixtures and entity schemas
//! - [`loader`] - loader backends that apply fixtures and reverse them
//! - [`session`] - sessions that own one load and undo it on close
//!
//! ## Feature Flags
//!
//! - `sql` (default) - relational backend on sqlx and sea-query
//! - `document` (default) - document store backend
//! - `full` - All features enabled
//!
//! The no-op backend is always available.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use fixtura::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = EntityCatalog::new()
//!     .register(
//!         EntitySchema::new("Article")
//!             .primary_key("stub", ColumnType::Text)
//!             .column("name", ColumnType::Text),
//!     );
//! let loader = DocumentLoader::new(catalog, Arc::new(MemoryDocumentStore::new()));
//!
//! let articles = DataGroup::builder("Article")
//!     .default_lazy("name", sequence("Article {n}"))
//!     .record(RecordDecl::new("article1").set("stub", "article1"))
//!     .build()?;
//! let blog = Fixture::builder("blog").group(&articles).build()?;
//!
//! let session = FixtureSession::open(&loader, &blog).await?;
//! let article = session.entity("Article")?.one().await?;
//! assert_eq!(article["stub"], "article1");
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Record declarations, data groups and fixtures.
pub use fixtura_data as data;
/// Loader backends.
pub use fixtura_loader as loader;
/// Fixture sessions.
pub use fixtura_session as session;

pub use fixtura_data::{
	AttrValue, Attributes, ColumnType, DataError, DataGroup, DataResult, Datum, EntitySchema,
	Fixture, RecordDecl, RecordKey, counter, sequence,
};
pub use fixtura_loader::{
	ChangeReport, EntityCatalog, LoadMode, Loader, LoaderError, LoaderResult, LoaderSettings,
	NoopLoader, TrackedInsertion, TrackedUpdate,
};
pub use fixtura_session::{
	BoxError, EntityQuery, FixtureSession, SessionError, SessionOptions, SessionResult,
	TeardownError,
};

#[cfg(feature = "document")]
pub use fixtura_loader::{DocumentLoader, DocumentStore, MemoryDocumentStore};
#[cfg(feature = "sql")]
pub use fixtura_loader::{Dialect, SqlLoader};

/// Convenience re-exports for test modules.
pub mod prelude {
	pub use fixtura_data::prelude::*;
	pub use fixtura_session::prelude::*;

	pub use fixtura_loader::{ChangeReport, LoadMode, LoaderSettings};

	#[cfg(feature = "document")]
	pub use fixtura_loader::{DocumentLoader, DocumentStore, MemoryDocumentStore};
	#[cfg(feature = "sql")]
	pub use fixtura_loader::SqlLoader;
}
