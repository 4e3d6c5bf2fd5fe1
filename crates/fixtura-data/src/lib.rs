//! Declarative test data for the fixtura fixture engine.
//!
//! This crate holds everything that is decided before a store is touched:
//!
//! - **Schemas**: [`EntitySchema`](schema::EntitySchema) describes one table
//!   or collection, its columns and its primary key
//! - **Records**: [`RecordDecl`](datum::RecordDecl) is materialized into an
//!   immutable [`Datum`](datum::Datum)
//! - **Groups**: [`DataGroup`](group::DataGroup) collects records of one
//!   entity and applies shared defaults and overrides
//! - **Fixtures**: [`Fixture`](fixture::Fixture) maps group keys to groups
//!   and can be derived from another fixture
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use fixtura_data::prelude::*;
//!
//! let article = Arc::new(
//!     EntitySchema::new("Article")
//!         .primary_key("stub", ColumnType::Text)
//!         .column("name", ColumnType::Text)
//!         .column("body", ColumnType::Text),
//! );
//!
//! let articles = DataGroup::builder("Article")
//!     .entity(&article)
//!     .default_lazy("body", sequence("Body {n}"))
//!     .record(RecordDecl::new("article1").set("stub", "article1"))
//!     .build()
//!     .unwrap();
//!
//! let blog = Fixture::builder("blog").group(&articles).build().unwrap();
//! assert_eq!(blog.records().count(), 1);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod datum;
pub mod error;
pub mod fixture;
pub mod group;
pub mod prelude;
pub mod schema;
pub mod value;

pub use datum::{Datum, RecordDecl};
pub use error::{DataError, DataResult};
pub use fixture::{Fixture, FixtureBuilder};
pub use group::{DataGroup, DataGroupBuilder};
pub use schema::{Column, ColumnType, EntitySchema, RecordKey};
pub use value::{AttrValue, Attributes, Producer, Sequence, counter, sequence};
