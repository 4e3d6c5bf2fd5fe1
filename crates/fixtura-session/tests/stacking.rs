//! Nested sessions against the document and relational backends.

use std::sync::Arc;

use fixtura_data::{ColumnType, DataGroup, EntitySchema, Fixture, RecordDecl};
use fixtura_loader::{EntityCatalog, Loader};
use fixtura_session::FixtureSession;
use rstest::rstest;

fn catalog() -> EntityCatalog {
	EntityCatalog::new()
		.register(
			EntitySchema::new("Article")
				.primary_key("stub", ColumnType::Text)
				.column("name", ColumnType::Text),
		)
		.register(
			EntitySchema::new("Comment")
				.primary_key("id", ColumnType::Integer)
				.column("article_stub", ColumnType::Text)
				.required_column("email", ColumnType::Text),
		)
}

/// `outer` loads article1; `inner` overwrites article1 and adds article2.
fn stacked_fixtures() -> (Arc<Fixture>, Arc<Fixture>) {
	let articles = DataGroup::builder("Article")
		.record(
			RecordDecl::new("article1")
				.set("stub", "article1")
				.set("name", "Outer"),
		)
		.build()
		.unwrap();
	let outer = Fixture::builder("outer").group(&articles).build().unwrap();
	let inner = Fixture::extend(&outer, "inner")
		.extend_group("Article", |group| {
			group
				.override_with("name", "Inner")
				.record(RecordDecl::new("article2").set("stub", "article2"))
		})
		.build()
		.unwrap();
	(outer, inner)
}

async fn assert_stacking<L: Loader>(loader: &L) {
	// Arrange
	let (outer, inner) = stacked_fixtures();
	let mut observer = loader.connect().await.unwrap();
	assert_eq!(loader.count(&mut observer, "Article").await.unwrap(), 0);

	// Act / Assert
	let a = FixtureSession::open(loader, &outer).await.unwrap();
	assert!(a.entity("Article").unwrap().length_is(1).await.unwrap());

	let b = FixtureSession::open(loader, &inner).await.unwrap();
	let articles = b.entity("Article").unwrap();
	assert_eq!(articles.count().await.unwrap(), 2);
	let article1 = articles.get("article1").await.unwrap().unwrap();
	assert_eq!(article1["name"], "Inner");
	assert_eq!(b.report().updated.len(), 1);
	assert_eq!(b.report().inserted.len(), 1);

	b.close().await.unwrap();
	let articles = a.entity("Article").unwrap();
	assert_eq!(articles.count().await.unwrap(), 1);
	let article1 = articles.one().await.unwrap();
	assert_eq!(article1["name"], "Outer");

	a.close().await.unwrap();
	assert_eq!(loader.count(&mut observer, "Article").await.unwrap(), 0);
}

/// Three fixtures, each renaming article1 and adding one more article.
fn layered_fixtures() -> Vec<Arc<Fixture>> {
	let articles = DataGroup::builder("Article")
		.record(RecordDecl::new("article1").set("stub", "article1").set("name", "v1"))
		.build()
		.unwrap();
	let first = Fixture::builder("layer1").group(&articles).build().unwrap();
	let second = Fixture::extend(&first, "layer2")
		.extend_group("Article", |group| {
			group
				.override_with("name", "v2")
				.record(RecordDecl::new("article2").set("stub", "article2"))
		})
		.build()
		.unwrap();
	let third = Fixture::extend(&second, "layer3")
		.extend_group("Article", |group| {
			group
				.override_with("name", "v3")
				.record(RecordDecl::new("article3").set("stub", "article3"))
		})
		.build()
		.unwrap();
	vec![first, second, third]
}

async fn name_of_article1<L: Loader>(loader: &L, handle: &mut L::Handle) -> serde_json::Value {
	let key = fixtura_data::RecordKey::single("stub", "article1");
	loader.get(handle, "Article", &key).await.unwrap().unwrap()["name"].clone()
}

/// Expects article1 to exist with name "v0" before the first session opens.
async fn assert_deep_stacking_over_existing_row<L: Loader>(loader: &L) {
	// Arrange
	let layers = layered_fixtures();
	let mut observer = loader.connect().await.unwrap();
	assert_eq!(name_of_article1(loader, &mut observer).await, "v0");

	// Act
	let mut sessions = Vec::new();
	for layer in &layers {
		sessions.push(FixtureSession::open(loader, layer).await.unwrap());
	}
	let mut peeled = Vec::new();
	while let Some(session) = sessions.pop() {
		session.close().await.unwrap();
		peeled.push((
			loader.count(&mut observer, "Article").await.unwrap(),
			name_of_article1(loader, &mut observer).await,
		));
	}

	// Assert
	assert_eq!(
		peeled,
		vec![
			(2, serde_json::json!("v2")),
			(1, serde_json::json!("v1")),
			(1, serde_json::json!("v0")),
		]
	);
}

#[cfg(feature = "document")]
#[rstest]
#[tokio::test]
async fn test_document_sessions_stack() {
	use fixtura_loader::{DocumentLoader, MemoryDocumentStore};

	let loader = DocumentLoader::new(catalog(), Arc::new(MemoryDocumentStore::new()));

	assert_stacking(&loader).await;
	assert!(loader.store().collection_names().is_empty());
}

#[cfg(feature = "document")]
#[rstest]
#[tokio::test]
async fn test_document_sessions_peel_back_to_existing_row() {
	use fixtura_loader::{DocumentLoader, DocumentStore, MemoryDocumentStore};

	let store = Arc::new(MemoryDocumentStore::new());
	let existing = [
		("stub".to_string(), serde_json::json!("article1")),
		("name".to_string(), serde_json::json!("v0")),
	]
	.into_iter()
	.collect();
	store.insert_one("Article", existing).await.unwrap();
	let loader = DocumentLoader::new(catalog(), store);

	assert_deep_stacking_over_existing_row(&loader).await;
}

#[cfg(feature = "sql")]
mod sql {
	use super::*;
	use fixtura_loader::SqlLoader;
	use fixtura_loader::backends::sql::install_drivers;
	use sqlx::any::AnyPoolOptions;
	use tempfile::TempDir;

	async fn setup() -> (TempDir, SqlLoader) {
		install_drivers();
		let dir = TempDir::new().unwrap();
		let url = format!("sqlite://{}?mode=rwc", dir.path().join("session.db").display());
		let pool = AnyPoolOptions::new()
			.max_connections(6)
			.connect(&url)
			.await
			.unwrap();
		for ddl in [
			"CREATE TABLE Article (stub TEXT PRIMARY KEY, name TEXT)",
			"CREATE TABLE Comment (id INTEGER PRIMARY KEY, article_stub TEXT REFERENCES Article(stub), email TEXT NOT NULL)",
		] {
			sqlx::query(ddl).execute(&pool).await.unwrap();
		}
		let loader = SqlLoader::new(catalog(), pool).unwrap();
		(dir, loader)
	}

	#[rstest]
	#[tokio::test]
	async fn test_sql_sessions_stack() {
		let (_dir, loader) = setup().await;

		assert_stacking(&loader).await;
	}

	#[rstest]
	#[tokio::test]
	async fn test_sql_sessions_peel_back_to_existing_row() {
		let (_dir, loader) = setup().await;
		sqlx::query("INSERT INTO Article (stub, name) VALUES ('article1', 'v0')")
			.execute(loader.pool())
			.await
			.unwrap();

		assert_deep_stacking_over_existing_row(&loader).await;
	}

	#[rstest]
	#[tokio::test]
	async fn test_blog_scenario() {
		// Arrange
		let (_dir, loader) = setup().await;
		let articles = DataGroup::builder("Article")
			.record(RecordDecl::new("article1").set("stub", "article1"))
			.build()
			.unwrap();
		let comments = DataGroup::builder("Comment")
			.record(
				RecordDecl::new("comment1")
					.set("id", 1)
					.set("article_stub", "article1")
					.set("email", "reader@example.com"),
			)
			.build()
			.unwrap();
		let blog = Fixture::builder("blog")
			.group(&articles)
			.group(&comments)
			.build()
			.unwrap();

		// Act
		let session = FixtureSession::open(&loader, &blog).await.unwrap();
		let article_count = session.entity("Article").unwrap().count().await.unwrap();
		let comment_count = session.entity("Comment").unwrap().count().await.unwrap();
		let article = session.entity("Article").unwrap().one().await.unwrap();
		let by_article = session
			.entity("Comment")
			.unwrap()
			.filter_by([("article_stub", "article1")])
			.await
			.unwrap();
		session.close().await.unwrap();

		// Assert
		assert_eq!((article_count, comment_count), (1, 1));
		assert_eq!(article["stub"], "article1");
		assert_eq!(by_article.len(), 1);
		let mut handle = loader.connect().await.unwrap();
		assert_eq!(loader.count(&mut handle, "Article").await.unwrap(), 0);
		assert_eq!(loader.count(&mut handle, "Comment").await.unwrap(), 0);
	}
}
