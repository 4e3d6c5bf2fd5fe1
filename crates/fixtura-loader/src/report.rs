//! Change reports: what a load did, and what reversing it takes.

use fixtura_data::{Attributes, RecordKey};
use serde::{Deserialize, Serialize};

/// A row created by a load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedInsertion {
	/// Entity of the created row.
	pub entity: String,
	/// Primary key of the created row.
	pub key: RecordKey,
}

/// A row overwritten by a load, with its state before the write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedUpdate {
	/// Entity of the overwritten row.
	pub entity: String,
	/// Primary key of the overwritten row.
	pub key: RecordKey,
	/// Full row as it was before the write.
	pub original: Attributes,
}

/// Outcome of [`Loader::add_data`](crate::Loader::add_data).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
	/// Entities the fixture touched, in load order.
	pub touched: Vec<String>,
	/// Rows created, in write order.
	pub inserted: Vec<TrackedInsertion>,
	/// Rows overwritten, in write order.
	pub updated: Vec<TrackedUpdate>,
}

impl ChangeReport {
	/// Returns true if the load neither created nor overwrote a row.
	pub fn is_empty(&self) -> bool {
		self.inserted.is_empty() && self.updated.is_empty()
	}

	/// Returns the number of rows created.
	pub fn inserted_count(&self) -> usize {
		self.inserted.len()
	}

	/// Returns the number of rows overwritten.
	pub fn updated_count(&self) -> usize {
		self.updated.len()
	}
}
