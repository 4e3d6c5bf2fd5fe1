//! Fixture sessions for the fixtura fixture engine.
//!
//! A [`FixtureSession`] is one active fixture load. Opening it applies the
//! fixture through a [`Loader`](fixtura_loader::Loader) and keeps the change
//! report; closing it deletes the rows it created and restores the rows it
//! overwrote. Sessions stack: close them in reverse order of opening and
//! every close returns the store to the state it had when that session
//! opened.
//!
//! - [`FixtureSession::open`] / [`FixtureSession::close`] for explicit
//!   lifetimes
//! - [`FixtureSession::run`] for a scoped body that is always torn down
//! - [`EntityQuery`] for read-only checks against the session's handle
//!
//! # Example
//!
//! ```rust,no_run
//! use fixtura_data::prelude::*;
//! use fixtura_loader::{DocumentLoader, EntityCatalog, MemoryDocumentStore};
//! use fixtura_session::FixtureSession;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = EntityCatalog::new()
//!     .register(EntitySchema::new("Article").primary_key("stub", ColumnType::Text));
//! let loader = DocumentLoader::new(catalog, Arc::new(MemoryDocumentStore::new()));
//!
//! let articles = DataGroup::builder("Article")
//!     .record(RecordDecl::new("article1").set("stub", "article1"))
//!     .build()?;
//! let fixture = Fixture::builder("blog").group(&articles).build()?;
//!
//! let session = FixtureSession::open(&loader, &fixture).await?;
//! assert!(session.entity("Article")?.length_is(1).await?);
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod prelude;
pub mod query;
pub mod session;

pub use error::{BoxError, SessionError, SessionResult, TeardownError};
pub use query::EntityQuery;
pub use session::{FixtureSession, SessionOptions};
