//! Data groups: named, ordered collections of records of one entity type.
//!
//! Groups are declared with a [`DataGroupBuilder`] and are immutable once
//! built. A group compares like a set of its [`Datum`]s, so tests can check
//! query results against it directly.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::datum::{Datum, RecordDecl};
use crate::error::{DataError, DataResult};
use crate::schema::EntitySchema;
use crate::value::{AttrValue, Attributes, Producer};

type Generator = Box<dyn FnOnce() -> Vec<(String, Attributes)> + Send>;

enum Entry {
	Record(RecordDecl),
	Generated(Generator),
}

/// An immutable, ordered collection of records.
#[derive(Debug, Clone)]
pub struct DataGroup {
	name: String,
	entity: Option<Arc<EntitySchema>>,
	defaults: IndexMap<String, AttrValue>,
	overrides: IndexMap<String, AttrValue>,
	members: IndexMap<String, Arc<Datum>>,
}

impl DataGroup {
	/// Starts declaring a new group.
	///
	/// # Example
	///
	/// ```
	/// use fixtura_data::datum::RecordDecl;
	/// use fixtura_data::group::DataGroup;
	///
	/// let articles = DataGroup::builder("Article")
	///     .default("body", "foo")
	///     .record(RecordDecl::new("article1").set("stub", "article1"))
	///     .build()
	///     .unwrap();
	///
	/// assert_eq!(articles.len(), 1);
	/// assert_eq!(articles.get("article1").unwrap().get("body").unwrap(), "foo");
	/// ```
	pub fn builder(name: impl Into<String>) -> DataGroupBuilder {
		DataGroupBuilder::new(name.into(), None)
	}

	/// Starts declaring a group derived from `parent`.
	///
	/// Every member of `parent` is carried over and re-resolved with the
	/// parent's record as its base, so the child's defaults and overrides
	/// apply to it. A child record with the same name replaces the inherited
	/// one in place. `parent` itself is left untouched.
	pub fn extend(parent: &Arc<DataGroup>, name: impl Into<String>) -> DataGroupBuilder {
		DataGroupBuilder::new(name.into(), Some(Arc::clone(parent)))
	}

	/// Returns the group name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns the entity schema bound at declaration, if any.
	pub fn entity(&self) -> Option<&Arc<EntitySchema>> {
		self.entity.as_ref()
	}

	/// Returns the member named `name`.
	pub fn get(&self, name: &str) -> Option<&Arc<Datum>> {
		self.members.get(name)
	}

	/// Iterates over the members in declaration order.
	pub fn iter(&self) -> impl Iterator<Item = &Arc<Datum>> {
		self.members.values()
	}

	/// Returns the number of members.
	pub fn len(&self) -> usize {
		self.members.len()
	}

	/// Returns true if the group has no members.
	pub fn is_empty(&self) -> bool {
		self.members.is_empty()
	}

	/// Returns the member names in declaration order.
	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.members.keys().map(String::as_str)
	}

	/// Returns true if `datum` is a member of this group.
	pub fn contains(&self, datum: &Datum) -> bool {
		self.members
			.get(datum.name())
			.is_some_and(|member| member.as_ref() == datum)
	}

	/// Returns the members as a set.
	pub fn to_set(&self) -> HashSet<Arc<Datum>> {
		self.members.values().cloned().collect()
	}

	/// Returns true if every member is also in `other`.
	pub fn is_subset(&self, other: &HashSet<Arc<Datum>>) -> bool {
		self.members.values().all(|datum| other.contains(datum))
	}

	/// Returns true if every element of `other` is a member.
	pub fn is_superset(&self, other: &HashSet<Arc<Datum>>) -> bool {
		other.iter().all(|datum| self.contains(datum))
	}

	/// Returns the members together with every element of `other`.
	pub fn union(&self, other: &HashSet<Arc<Datum>>) -> HashSet<Arc<Datum>> {
		let mut set = self.to_set();
		set.extend(other.iter().cloned());
		set
	}

	/// Returns the members also found in `other`.
	pub fn intersection(&self, other: &HashSet<Arc<Datum>>) -> HashSet<Arc<Datum>> {
		self.members
			.values()
			.filter(|datum| other.contains(*datum))
			.cloned()
			.collect()
	}

	/// Returns the members not found in `other`.
	pub fn difference(&self, other: &HashSet<Arc<Datum>>) -> HashSet<Arc<Datum>> {
		self.members
			.values()
			.filter(|datum| !other.contains(*datum))
			.cloned()
			.collect()
	}

	fn compare(&self, other: &HashSet<Arc<Datum>>) -> Option<Ordering> {
		let subset = self.is_subset(other);
		let superset = self.is_superset(other);
		match (subset, superset) {
			(true, true) => Some(Ordering::Equal),
			(true, false) => Some(Ordering::Less),
			(false, true) => Some(Ordering::Greater),
			(false, false) => None,
		}
	}
}

impl<'a> IntoIterator for &'a DataGroup {
	type Item = &'a Arc<Datum>;
	type IntoIter = indexmap::map::Values<'a, String, Arc<Datum>>;

	fn into_iter(self) -> Self::IntoIter {
		self.members.values()
	}
}

impl PartialEq<HashSet<Arc<Datum>>> for DataGroup {
	fn eq(&self, other: &HashSet<Arc<Datum>>) -> bool {
		self.compare(other) == Some(Ordering::Equal)
	}
}

impl PartialEq<DataGroup> for HashSet<Arc<Datum>> {
	fn eq(&self, other: &DataGroup) -> bool {
		other == self
	}
}

impl PartialOrd<HashSet<Arc<Datum>>> for DataGroup {
	fn partial_cmp(&self, other: &HashSet<Arc<Datum>>) -> Option<Ordering> {
		self.compare(other)
	}
}

impl PartialEq for DataGroup {
	fn eq(&self, other: &Self) -> bool {
		self.compare(&other.to_set()) == Some(Ordering::Equal)
	}
}

impl PartialOrd for DataGroup {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		self.compare(&other.to_set())
	}
}

impl fmt::Display for DataGroup {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let names = self.names().collect::<Vec<_>>();
		write!(f, "<Data {} ({})>", self.name, names.join(", "))
	}
}

/// Builder for [`DataGroup`].
pub struct DataGroupBuilder {
	name: String,
	parent: Option<Arc<DataGroup>>,
	entity: Option<Arc<EntitySchema>>,
	defaults: IndexMap<String, AttrValue>,
	overrides: IndexMap<String, AttrValue>,
	entries: Vec<Entry>,
}

impl fmt::Debug for DataGroupBuilder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DataGroupBuilder")
			.field("name", &self.name)
			.field("parent", &self.parent.as_ref().map(|parent| parent.name()))
			.field("entries", &self.entries.len())
			.finish_non_exhaustive()
	}
}

impl DataGroupBuilder {
	fn new(name: String, parent: Option<Arc<DataGroup>>) -> Self {
		Self {
			name,
			entity: parent.as_ref().and_then(|parent| parent.entity.clone()),
			parent,
			defaults: IndexMap::new(),
			overrides: IndexMap::new(),
			entries: Vec::new(),
		}
	}

	/// Binds the group to an entity schema, enabling validation at build.
	pub fn entity(mut self, schema: &Arc<EntitySchema>) -> Self {
		self.entity = Some(Arc::clone(schema));
		self
	}

	/// Adds a default attribute, used only where a record sets nothing.
	pub fn default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.defaults
			.insert(key.into(), AttrValue::Literal(value.into()));
		self
	}

	/// Adds a lazily produced default attribute.
	pub fn default_lazy(mut self, key: impl Into<String>, producer: Producer) -> Self {
		self.defaults.insert(key.into(), AttrValue::Lazy(producer));
		self
	}

	/// Adds an override attribute, applied to every record.
	pub fn override_with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.overrides
			.insert(key.into(), AttrValue::Literal(value.into()));
		self
	}

	/// Adds a lazily produced override attribute.
	pub fn override_lazy(mut self, key: impl Into<String>, producer: Producer) -> Self {
		self.overrides.insert(key.into(), AttrValue::Lazy(producer));
		self
	}

	/// Declares one record.
	pub fn record(mut self, decl: RecordDecl) -> Self {
		self.entries.push(Entry::Record(decl));
		self
	}

	/// Registers a bulk generator expanded at build time.
	///
	/// Each `(name, attributes)` pair becomes one member, resolved through
	/// the same defaults and overrides as declared records.
	pub fn generate<F, I>(mut self, generator: F) -> Self
	where
		F: FnOnce() -> I + Send + 'static,
		I: IntoIterator<Item = (String, Attributes)>,
	{
		self.entries.push(Entry::Generated(Box::new(move || {
			generator().into_iter().collect()
		})));
		self
	}

	/// Materializes every record and freezes the group.
	///
	/// # Errors
	///
	/// Returns [`DataError::DuplicateRecord`] when two records share a name,
	/// and any validation error raised while materializing a record.
	pub fn build(self) -> DataResult<Arc<DataGroup>> {
		let mut declared: IndexMap<String, RecordDecl> = IndexMap::new();
		for entry in self.entries {
			let decls = match entry {
				Entry::Record(decl) => vec![decl],
				Entry::Generated(generator) => generator()
					.into_iter()
					.map(|(name, attributes)| RecordDecl::from_attributes(name, attributes))
					.collect(),
			};
			for decl in decls {
				if declared.contains_key(decl.name()) {
					return Err(DataError::DuplicateRecord {
						group: self.name,
						record: decl.name().to_string(),
					});
				}
				declared.insert(decl.name().to_string(), decl);
			}
		}

		let (mut defaults, mut overrides) = match &self.parent {
			Some(parent) => (parent.defaults.clone(), parent.overrides.clone()),
			None => (IndexMap::new(), IndexMap::new()),
		};
		defaults.extend(self.defaults.iter().map(|(k, v)| (k.clone(), v.clone())));
		overrides.extend(self.overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

		let mut members = IndexMap::new();
		if let Some(parent) = &self.parent {
			for (name, inherited) in &parent.members {
				let datum = match declared.shift_remove(name) {
					Some(decl) => decl.materialize(self.entity.as_ref(), &defaults, &overrides)?,
					None => RecordDecl::new(name.clone())
						.extends(inherited)
						.materialize(self.entity.as_ref(), &self.defaults, &self.overrides)?,
				};
				members.insert(name.clone(), Arc::new(datum));
			}
		}
		for (name, decl) in declared {
			let datum = decl.materialize(self.entity.as_ref(), &defaults, &overrides)?;
			members.insert(name, Arc::new(datum));
		}

		Ok(Arc::new(DataGroup {
			name: self.name,
			entity: self.entity,
			defaults,
			overrides,
			members,
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::schema::ColumnType;
	use crate::value::sequence;
	use rstest::{fixture, rstest};
	use serde_json::json;

	#[fixture]
	fn article() -> Arc<EntitySchema> {
		Arc::new(
			EntitySchema::new("Article")
				.primary_key("stub", ColumnType::Text)
				.column("name", ColumnType::Text)
				.column("body", ColumnType::Text),
		)
	}

	#[fixture]
	fn articles(article: Arc<EntitySchema>) -> Arc<DataGroup> {
		DataGroup::builder("Article")
			.entity(&article)
			.default("body", "foo")
			.record(
				RecordDecl::new("article1")
					.set("stub", "article1")
					.set("name", "The First Article"),
			)
			.record(
				RecordDecl::new("article2")
					.set("stub", "article2")
					.set("name", "The Second Article"),
			)
			.build()
			.unwrap()
	}

	#[rstest]
	fn test_members_keep_declaration_order(articles: Arc<DataGroup>) {
		assert_eq!(articles.names().collect::<Vec<_>>(), ["article1", "article2"]);
		assert_eq!(articles.to_string(), "<Data Article (article1, article2)>");
	}

	#[rstest]
	fn test_set_comparisons(articles: Arc<DataGroup>) {
		let all = articles.to_set();
		let first: HashSet<_> = [Arc::clone(articles.get("article1").unwrap())]
			.into_iter()
			.collect();

		assert!(*articles == all);
		assert!(all == *articles);
		assert!(*articles != first);
		assert!(*articles > first);
		assert!(*articles >= first);
		assert!(*articles <= all);
		assert!(!(*articles < all));
		assert!(articles.is_superset(&first));
		assert!(!articles.is_subset(&first));
	}

	#[rstest]
	fn test_set_algebra(articles: Arc<DataGroup>) {
		let first: HashSet<_> = [Arc::clone(articles.get("article1").unwrap())]
			.into_iter()
			.collect();

		assert_eq!(articles.intersection(&first), first);
		assert_eq!(articles.difference(&first).len(), 1);
		assert_eq!(articles.union(&first).len(), 2);
	}

	#[rstest]
	fn test_lazy_default_gives_successive_values(article: Arc<EntitySchema>) {
		let group = DataGroup::builder("Article")
			.entity(&article)
			.default_lazy("name", sequence("Name {n}"))
			.record(RecordDecl::new("a").set("stub", "a"))
			.record(RecordDecl::new("b").set("stub", "b"))
			.build()
			.unwrap();

		assert_eq!(group.get("a").unwrap().get("name"), Some(&json!("Name 1")));
		assert_eq!(group.get("b").unwrap().get("name"), Some(&json!("Name 2")));
	}

	#[rstest]
	fn test_generator_expands_into_members(article: Arc<EntitySchema>) {
		let group = DataGroup::builder("Article")
			.entity(&article)
			.override_with("body", "generated")
			.generate(|| {
				(1..=3).map(|n| {
					let mut attributes = Attributes::new();
					attributes.insert("stub".to_string(), json!(format!("gen{}", n)));
					(format!("gen{}", n), attributes)
				})
			})
			.build()
			.unwrap();

		assert_eq!(group.len(), 3);
		assert!(group.iter().all(|d| d.get("body") == Some(&json!("generated"))));
	}

	#[rstest]
	fn test_duplicate_record_rejected() {
		let result = DataGroup::builder("Article")
			.record(RecordDecl::new("a"))
			.record(RecordDecl::new("a"))
			.build();

		assert_eq!(
			result.unwrap_err(),
			DataError::DuplicateRecord {
				group: "Article".to_string(),
				record: "a".to_string()
			}
		);
	}

	#[rstest]
	fn test_extend_applies_overrides_without_touching_parent(articles: Arc<DataGroup>) {
		let child = DataGroup::extend(&articles, "Article")
			.override_with("body", "bar")
			.record(
				RecordDecl::new("article3")
					.set("stub", "article3")
					.set("name", "The Third Article"),
			)
			.build()
			.unwrap();

		assert_eq!(child.names().collect::<Vec<_>>(), ["article1", "article2", "article3"]);
		assert!(child.iter().all(|d| d.get("body") == Some(&json!("bar"))));
		assert_eq!(child.get("article1").unwrap().get("name"), Some(&json!("The First Article")));
		assert!(articles.iter().all(|d| d.get("body") == Some(&json!("foo"))));
		assert_eq!(articles.len(), 2);
	}

	#[rstest]
	fn test_extend_replaces_same_named_record(articles: Arc<DataGroup>) {
		let child = DataGroup::extend(&articles, "Article")
			.record(
				RecordDecl::new("article1")
					.set("stub", "article1")
					.set("name", "Replaced"),
			)
			.build()
			.unwrap();

		assert_eq!(child.names().collect::<Vec<_>>(), ["article1", "article2"]);
		let replaced = child.get("article1").unwrap();
		assert_eq!(replaced.get("name"), Some(&json!("Replaced")));
		assert_eq!(replaced.get("body"), Some(&json!("foo")));
	}
}
