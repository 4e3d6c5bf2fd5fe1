//! Convenience re-exports for declaring fixtures.
//!
//! ```
//! use fixtura_data::prelude::*;
//!
//! let group = DataGroup::builder("Tag").build().unwrap();
//! assert!(group.is_empty());
//! ```

pub use crate::datum::{Datum, RecordDecl};
pub use crate::error::{DataError, DataResult};
pub use crate::fixture::{Fixture, FixtureBuilder};
pub use crate::group::{DataGroup, DataGroupBuilder};
pub use crate::schema::{ColumnType, EntitySchema, RecordKey};
pub use crate::value::{AttrValue, Attributes, Producer, Sequence, counter, sequence};
