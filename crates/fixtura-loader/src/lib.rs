//! Loader backends for the fixtura fixture engine.
//!
//! A loader applies a [`Fixture`](fixtura_data::Fixture) to a store and
//! records exactly what it changed, so the change can be reversed later:
//!
//! - **Catalog**: [`EntityCatalog`] maps entity names and group keys to
//!   schemas, in load order
//! - **Planning**: [`LoadPlan`](plan::LoadPlan) resolves and validates every
//!   record before the first write
//! - **Reports**: [`ChangeReport`] lists the rows created and the rows
//!   overwritten together with their prior state
//! - **Backends**: relational (`sql`), document (`document`) and no-op
//!
//! # Features
//!
//! - `sql` - relational backend on sqlx and sea-query (enabled by default)
//! - `document` - document store backend (enabled by default)
//! - `full` - All features enabled
//!
//! # Example
//!
//! ```
//! use fixtura_data::prelude::*;
//! use fixtura_loader::{EntityCatalog, Loader, NoopLoader};
//!
//! let catalog = EntityCatalog::new()
//!     .register(EntitySchema::new("Article").primary_key("stub", ColumnType::Text));
//! let loader = NoopLoader::new(catalog);
//! assert!(loader.catalog().get("Article").is_some());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod catalog;
pub mod error;
pub mod plan;
pub mod report;
pub mod settings;

pub use backends::Loader;
pub use backends::noop::NoopLoader;
pub use catalog::EntityCatalog;
pub use error::{LoaderError, LoaderResult};
pub use report::{ChangeReport, TrackedInsertion, TrackedUpdate};
pub use settings::{LoadMode, LoaderSettings};

#[cfg(feature = "document")]
pub use backends::document::{DocumentLoader, DocumentStore, MemoryDocumentStore};
#[cfg(feature = "sql")]
pub use backends::sql::{Dialect, SqlLoader};
