//! Fixtures: named aggregations of data groups.
//!
//! A [`Fixture`] maps group keys to [`DataGroup`]s in declaration order. A
//! fixture derived with [`Fixture::extend`] starts from its parent's map and
//! may replace, extend or remove individual groups without affecting the
//! parent.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::datum::Datum;
use crate::error::{DataError, DataResult};
use crate::group::{DataGroup, DataGroupBuilder};

/// Immutable, named set of data groups describing one test scenario.
#[derive(Debug, Clone)]
pub struct Fixture {
	name: String,
	parent: Option<Arc<Fixture>>,
	groups: IndexMap<String, Arc<DataGroup>>,
}

impl Fixture {
	/// Starts declaring a fixture.
	///
	/// # Example
	///
	/// ```
	/// use fixtura_data::datum::RecordDecl;
	/// use fixtura_data::fixture::Fixture;
	/// use fixtura_data::group::DataGroup;
	///
	/// let articles = DataGroup::builder("Article")
	///     .record(RecordDecl::new("article1").set("stub", "article1"))
	///     .build()
	///     .unwrap();
	/// let fixture = Fixture::builder("blog").group(&articles).build().unwrap();
	///
	/// assert_eq!(fixture.keys().collect::<Vec<_>>(), ["Article"]);
	/// ```
	pub fn builder(name: impl Into<String>) -> FixtureBuilder {
		FixtureBuilder {
			name: name.into(),
			parent: None,
			groups: IndexMap::new(),
			error: None,
		}
	}

	/// Starts declaring a fixture preloaded with every group of `parent`.
	pub fn extend(parent: &Arc<Fixture>, name: impl Into<String>) -> FixtureBuilder {
		FixtureBuilder {
			name: name.into(),
			parent: Some(Arc::clone(parent)),
			groups: parent.groups.clone(),
			error: None,
		}
	}

	/// Returns the fixture name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns the fixture this one was derived from.
	pub fn parent(&self) -> Option<&Arc<Fixture>> {
		self.parent.as_ref()
	}

	/// Returns the group bound to `key`.
	pub fn group(&self, key: &str) -> Option<&Arc<DataGroup>> {
		self.groups.get(key)
	}

	/// Iterates over `(key, group)` pairs in declaration order.
	pub fn groups(&self) -> impl Iterator<Item = (&str, &Arc<DataGroup>)> {
		self.groups.iter().map(|(key, group)| (key.as_str(), group))
	}

	/// Returns the group keys in declaration order.
	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.groups.keys().map(String::as_str)
	}

	/// Returns true if the fixture binds `key`.
	pub fn contains(&self, key: &str) -> bool {
		self.groups.contains_key(key)
	}

	/// Returns the number of groups.
	pub fn len(&self) -> usize {
		self.groups.len()
	}

	/// Returns true if the fixture has no groups.
	pub fn is_empty(&self) -> bool {
		self.groups.is_empty()
	}

	/// Iterates over every record as `(group key, datum)`, group by group.
	pub fn records(&self) -> impl Iterator<Item = (&str, &Arc<Datum>)> {
		self.groups
			.iter()
			.flat_map(|(key, group)| group.iter().map(move |datum| (key.as_str(), datum)))
	}
}

impl fmt::Display for Fixture {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let keys = self.keys().collect::<Vec<_>>();
		write!(f, "<Fixture {} [{}]>", self.name, keys.join(", "))
	}
}

/// Builder for [`Fixture`].
#[derive(Debug)]
pub struct FixtureBuilder {
	name: String,
	parent: Option<Arc<Fixture>>,
	groups: IndexMap<String, Arc<DataGroup>>,
	error: Option<DataError>,
}

impl FixtureBuilder {
	/// Binds `group` under its own name, replacing any inherited entry.
	pub fn group(self, group: &Arc<DataGroup>) -> Self {
		let key = group.name().to_string();
		self.group_as(key, group)
	}

	/// Binds `group` under `key`, replacing any inherited entry.
	pub fn group_as(mut self, key: impl Into<String>, group: &Arc<DataGroup>) -> Self {
		self.groups.insert(key.into(), Arc::clone(group));
		self
	}

	/// Derives the inherited group under `key` at the record level.
	///
	/// `configure` receives a [`DataGroupBuilder`] produced by
	/// [`DataGroup::extend`] and may add defaults, overrides or records.
	/// Binding a key the parent does not define fails at [`build`](Self::build)
	/// with [`DataError::UnknownGroup`].
	pub fn extend_group<F>(mut self, key: impl Into<String>, configure: F) -> Self
	where
		F: FnOnce(DataGroupBuilder) -> DataGroupBuilder,
	{
		if self.error.is_some() {
			return self;
		}
		let key = key.into();
		let inherited = self
			.parent
			.as_ref()
			.and_then(|parent| parent.group(&key))
			.cloned();
		match inherited {
			Some(parent_group) => {
				match configure(DataGroup::extend(&parent_group, parent_group.name())).build() {
					Ok(group) => {
						self.groups.insert(key, group);
					}
					Err(error) => self.error = Some(error),
				}
			}
			None => {
				self.error = Some(DataError::UnknownGroup {
					fixture: self.name.clone(),
					group: key,
				});
			}
		}
		self
	}

	/// Leaves `key` out of the resulting fixture.
	pub fn remove(mut self, key: &str) -> Self {
		self.groups.shift_remove(key);
		self
	}

	/// Freezes the fixture.
	///
	/// # Errors
	///
	/// Returns the first error raised while extending a group.
	pub fn build(self) -> DataResult<Arc<Fixture>> {
		if let Some(error) = self.error {
			return Err(error);
		}
		Ok(Arc::new(Fixture {
			name: self.name,
			parent: self.parent,
			groups: self.groups,
		}))
	}
}
