//! Error types for loader backends.

use fixtura_data::DataError;
use thiserror::Error;

/// Errors that can occur while applying or reversing a fixture.
#[derive(Debug, Error)]
pub enum LoaderError {
	/// A record failed validation against its entity schema.
	#[error(transparent)]
	Data(#[from] DataError),

	/// The entity of a record could not be determined.
	#[error("cannot determine the entity of record `{record}` in group `{group}`")]
	LookupAmbiguity {
		/// Group key the record was declared under.
		group: String,
		/// Record name.
		record: String,
	},

	/// A record does not provide every primary key column.
	#[error("record `{record}` of {entity} has no primary key value")]
	MissingKey {
		/// Entity the record belongs to.
		entity: String,
		/// Record name.
		record: String,
	},

	/// An entity name is not registered in the catalog.
	#[error("entity `{0}` is not registered in the catalog")]
	UnknownEntity(String),

	/// A row recorded for restoration no longer exists.
	#[error("cannot restore {entity} row {key}: it no longer exists")]
	RestoreTargetMissing {
		/// Entity of the missing row.
		entity: String,
		/// Rendered primary key of the missing row.
		key: String,
	},

	/// A query expected exactly one row.
	#[error("expected exactly one {entity} row, found {found}")]
	NotExactlyOne {
		/// Queried entity.
		entity: String,
		/// Number of rows found.
		found: usize,
	},

	/// Relational store failure.
	#[cfg(feature = "sql")]
	#[error("Database error: {0}")]
	Database(#[from] sqlx::Error),

	/// A statement could not be built.
	#[error("Query error: {0}")]
	Query(String),

	/// Document store failure.
	#[error("Document store error: {0}")]
	Document(String),

	/// JSON encoding or decoding failed.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// Invalid loader configuration.
	#[error("Configuration error: {0}")]
	Config(String),
}

/// Result type alias for loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;
