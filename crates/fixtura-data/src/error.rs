//! Error types for record, group and fixture declarations.
//!
//! Every error in this module is raised while data is being declared, before
//! any backing store is touched.

use thiserror::Error;

/// Errors that can occur while materializing records or composing fixtures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
	/// A record sets an attribute its entity does not declare.
	#[error("{entity} has no attribute `{attribute}` (record `{record}`)")]
	UnknownAttribute {
		/// Entity the record belongs to.
		entity: String,
		/// Record that declared the attribute.
		record: String,
		/// The undeclared attribute.
		attribute: String,
	},

	/// A required attribute has no explicit value, inherited value or default.
	#[error("record `{record}` of {entity} has no value for required attribute `{attribute}`")]
	MissingAttribute {
		/// Entity the record belongs to.
		entity: String,
		/// Record missing the attribute.
		record: String,
		/// The required attribute.
		attribute: String,
	},

	/// Two records of the same group were declared with the same name.
	#[error("record `{record}` is declared more than once in group `{group}`")]
	DuplicateRecord {
		/// Group holding the duplicate.
		group: String,
		/// Duplicated record name.
		record: String,
	},

	/// A fixture extension refers to a group its parent does not define.
	#[error("fixture `{fixture}` has no group `{group}` to extend")]
	UnknownGroup {
		/// Fixture being extended.
		fixture: String,
		/// Missing group key.
		group: String,
	},

	/// An entity schema was declared without a primary key.
	#[error("entity `{0}` declares no primary key column")]
	NoPrimaryKey(String),
}

/// Result type alias for declaration operations.
pub type DataResult<T> = Result<T, DataError>;
