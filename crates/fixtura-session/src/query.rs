//! Read-only per-entity queries against a session's store handle.

use std::sync::Arc;

use fixtura_data::{Attributes, EntitySchema};
use fixtura_loader::{Loader, LoaderError};
use serde_json::Value;

use crate::error::SessionResult;
use crate::session::FixtureSession;

/// Query helper for one entity, borrowed from a [`FixtureSession`].
///
/// Every call goes through the session's own store handle, so it sees the
/// rows the session loaded even while they are uncommitted elsewhere.
pub struct EntityQuery<'s, 'l, L: Loader> {
	session: &'s FixtureSession<'l, L>,
	schema: Arc<EntitySchema>,
}

impl<'s, 'l, L: Loader> EntityQuery<'s, 'l, L> {
	pub(crate) fn new(session: &'s FixtureSession<'l, L>, schema: Arc<EntitySchema>) -> Self {
		Self { session, schema }
	}

	/// Returns the queried entity's schema.
	pub fn schema(&self) -> &Arc<EntitySchema> {
		&self.schema
	}

	/// Counts the entity's rows.
	pub async fn count(&self) -> SessionResult<u64> {
		let mut handle = self.session.handle.lock().await;
		let count = self
			.session
			.loader()
			.count(&mut *handle, self.schema.name())
			.await?;
		Ok(count)
	}

	/// Returns true if the entity has exactly `n` rows.
	pub async fn length_is(&self, n: u64) -> SessionResult<bool> {
		Ok(self.count().await? == n)
	}

	/// Returns every row.
	pub async fn all(&self) -> SessionResult<Vec<Attributes>> {
		let mut handle = self.session.handle.lock().await;
		let rows = self
			.session
			.loader()
			.all(&mut *handle, self.schema.name())
			.await?;
		Ok(rows)
	}

	/// Returns the only row.
	///
	/// # Errors
	///
	/// Fails with [`LoaderError::NotExactlyOne`] unless exactly one row exists.
	pub async fn one(&self) -> SessionResult<Attributes> {
		let mut rows = self.all().await?;
		if rows.len() != 1 {
			return Err(LoaderError::NotExactlyOne {
				entity: self.schema.name().to_string(),
				found: rows.len(),
			}
			.into());
		}
		Ok(rows.remove(0))
	}

	/// Returns the row whose primary key is `key`.
	///
	/// For a composite primary key, pass a JSON array holding one value per
	/// key column.
	pub async fn get(&self, key: impl Into<Value>) -> SessionResult<Option<Attributes>> {
		let key = self
			.schema
			.key_from_value(key.into())
			.ok_or_else(|| LoaderError::MissingKey {
				entity: self.schema.name().to_string(),
				record: "<query>".to_string(),
			})?;
		let mut handle = self.session.handle.lock().await;
		let row = self
			.session
			.loader()
			.get(&mut *handle, self.schema.name(), &key)
			.await?;
		Ok(row)
	}

	/// Returns the rows whose attributes equal every given pair.
	pub async fn filter_by<K, V>(
		&self,
		filter: impl IntoIterator<Item = (K, V)>,
	) -> SessionResult<Vec<Attributes>>
	where
		K: Into<String>,
		V: Into<Value>,
	{
		let filter: Attributes = filter
			.into_iter()
			.map(|(column, value)| (column.into(), value.into()))
			.collect();
		let mut handle = self.session.handle.lock().await;
		let rows = self
			.session
			.loader()
			.filter_by(&mut *handle, self.schema.name(), &filter)
			.await?;
		Ok(rows)
	}
}
