//! Fixture sessions.
//!
//! A [`FixtureSession`] loads one fixture through a [`Loader`], keeps the
//! resulting [`ChangeReport`] and reverses it on close. Because each session
//! snapshots rows at its own open time, sessions opened on top of each other
//! undo cleanly when closed in reverse order.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use fixtura_data::{DataGroup, Fixture};
use fixtura_loader::{ChangeReport, Loader};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{BoxError, SessionError, SessionResult, TeardownError};
use crate::query::EntityQuery;

/// Options for [`FixtureSession::open_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
	/// Load the fixture on open. Without loading, the session only exposes
	/// the declared data and closing it leaves the store alone.
	pub load: bool,
}

impl Default for SessionOptions {
	fn default() -> Self {
		Self { load: true }
	}
}

impl SessionOptions {
	/// Creates default options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets whether the fixture is loaded on open.
	pub fn with_load(mut self, load: bool) -> Self {
		self.load = load;
		self
	}
}

/// One active fixture load.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use fixtura_data::prelude::*;
/// use fixtura_loader::{EntityCatalog, NoopLoader};
/// use fixtura_session::FixtureSession;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let loader = NoopLoader::new(
///     EntityCatalog::new()
///         .register(EntitySchema::new("Article").primary_key("stub", ColumnType::Text)),
/// );
/// let articles = DataGroup::builder("Article")
///     .record(RecordDecl::new("article1").set("stub", "article1"))
///     .build()?;
/// let fixture = Fixture::builder("blog").group(&articles).build()?;
///
/// let session = FixtureSession::open(&loader, &fixture).await?;
/// assert_eq!(session.entity("Article")?.count().await?, 0);
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct FixtureSession<'l, L: Loader> {
	loader: &'l L,
	fixture: Arc<Fixture>,
	pub(crate) handle: Mutex<L::Handle>,
	report: ChangeReport,
	closed: bool,
}

impl<'l, L: Loader> FixtureSession<'l, L> {
	/// Connects and loads `fixture`.
	///
	/// # Errors
	///
	/// Any loader error; in that case no session exists and the fixture
	/// should be considered unusable.
	pub async fn open(loader: &'l L, fixture: &Arc<Fixture>) -> SessionResult<Self> {
		Self::open_with(loader, fixture, SessionOptions::default()).await
	}

	/// Connects and, if `options.load` is set, loads `fixture`.
	pub async fn open_with(
		loader: &'l L,
		fixture: &Arc<Fixture>,
		options: SessionOptions,
	) -> SessionResult<Self> {
		let mut handle = loader.connect().await?;
		let report = if options.load {
			loader.add_data(&mut handle, fixture).await?
		} else {
			ChangeReport::default()
		};
		info!(
			fixture = fixture.name(),
			inserted = report.inserted_count(),
			updated = report.updated_count(),
			"opened fixture session"
		);
		Ok(Self {
			loader,
			fixture: Arc::clone(fixture),
			handle: Mutex::new(handle),
			report,
			closed: false,
		})
	}

	/// Returns the loader this session writes through.
	pub fn loader(&self) -> &'l L {
		self.loader
	}

	/// Returns the loaded fixture.
	pub fn fixture(&self) -> &Arc<Fixture> {
		&self.fixture
	}

	/// Returns what the load changed.
	pub fn report(&self) -> &ChangeReport {
		&self.report
	}

	/// Returns the group bound to `key` in the fixture.
	pub fn group(&self, key: &str) -> Option<&Arc<DataGroup>> {
		self.fixture.group(key)
	}

	/// Iterates over the fixture's `(key, group)` pairs.
	pub fn groups(&self) -> impl Iterator<Item = (&str, &Arc<DataGroup>)> {
		self.fixture.groups()
	}

	/// Returns a read-only query helper for `entity`.
	///
	/// # Errors
	///
	/// Returns [`LoaderError::UnknownEntity`](fixtura_loader::LoaderError::UnknownEntity)
	/// when the loader's catalog does not know `entity`.
	pub fn entity(&self, entity: &str) -> SessionResult<EntityQuery<'_, 'l, L>> {
		let schema = self.loader.catalog().require(entity)?;
		Ok(EntityQuery::new(self, Arc::clone(schema)))
	}

	/// Reverses the load: deletes the created rows, then restores the
	/// overwritten ones.
	///
	/// Both steps are attempted even if the first fails.
	///
	/// # Errors
	///
	/// Returns [`SessionError::Teardown`] carrying every failed step.
	pub async fn close(mut self) -> SessionResult<()> {
		self.teardown()
			.await
			.map_err(|teardown| SessionError::Teardown {
				teardown,
				test: None,
			})
	}

	async fn teardown(&mut self) -> Result<(), TeardownError> {
		self.closed = true;
		let handle = self.handle.get_mut();
		let mut failure = TeardownError::default();
		if let Err(error) = self.loader.delete_data(handle, &self.report.inserted).await {
			failure.delete = Some(error);
		}
		if let Err(error) = self.loader.restore_data(handle, &self.report.updated).await {
			failure.restore = Some(error);
		}
		match failure.into_result() {
			Ok(()) => {
				info!(fixture = self.fixture.name(), "closed fixture session");
				Ok(())
			}
			Err(failure) => {
				error!(fixture = self.fixture.name(), error = %failure, "fixture teardown failed");
				Err(failure)
			}
		}
	}

	/// Opens a session, runs `body` with it and always closes it.
	///
	/// The session is closed when `body` returns an error and when it
	/// panics. A body error and a teardown failure are reported together in
	/// [`SessionError::Teardown`]; a panic is resumed after teardown, with the
	/// teardown failure appended to its message if there is one.
	///
	/// # Example
	///
	/// ```rust,no_run
	/// # use std::sync::Arc;
	/// # use fixtura_data::Fixture;
	/// # use fixtura_loader::NoopLoader;
	/// use fixtura_session::{BoxError, FixtureSession};
	///
	/// # async fn example(loader: NoopLoader, fixture: Arc<Fixture>) -> fixtura_session::SessionResult<()> {
	/// let count = FixtureSession::run(&loader, &fixture, |session| {
	///     Box::pin(async move {
	///         let count = session.entity("Article")?.count().await?;
	///         Ok::<_, BoxError>(count)
	///     })
	/// })
	/// .await?;
	/// assert_eq!(count, 0);
	/// # Ok(())
	/// # }
	/// ```
	pub async fn run<F, T>(loader: &'l L, fixture: &Arc<Fixture>, body: F) -> SessionResult<T>
	where
		F: for<'s> FnOnce(&'s FixtureSession<'l, L>) -> BoxFuture<'s, Result<T, BoxError>>,
	{
		let mut session = Self::open(loader, fixture).await?;
		let outcome = AssertUnwindSafe(body(&session)).catch_unwind().await;
		let closed = session.teardown().await;
		drop(session);

		match (outcome, closed) {
			(Ok(Ok(value)), Ok(())) => Ok(value),
			(Ok(Ok(_)), Err(teardown)) => Err(SessionError::Teardown {
				teardown,
				test: None,
			}),
			(Ok(Err(test)), Ok(())) => Err(SessionError::Test(test)),
			(Ok(Err(test)), Err(teardown)) => Err(SessionError::Teardown {
				teardown,
				test: Some(test),
			}),
			(Err(panic), Ok(())) => std::panic::resume_unwind(panic),
			(Err(panic), Err(teardown)) => {
				let message = panic
					.downcast_ref::<&str>()
					.map(|s| s.to_string())
					.or_else(|| panic.downcast_ref::<String>().cloned())
					.unwrap_or_else(|| "test body panicked".to_string());
				panic!("{}; {}", message, teardown)
			}
		}
	}
}

impl<L: Loader> Drop for FixtureSession<'_, L> {
	fn drop(&mut self) {
		if !self.closed {
			warn!(
				fixture = self.fixture.name(),
				inserted = self.report.inserted_count(),
				updated = self.report.updated_count(),
				"fixture session dropped without close; its changes remain in the store"
			);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fixtura_data::{ColumnType, EntitySchema, RecordDecl};
	use fixtura_loader::{EntityCatalog, NoopLoader};
	use rstest::{fixture, rstest};
	use serial_test::serial;

	#[fixture]
	fn loader() -> NoopLoader {
		NoopLoader::new(
			EntityCatalog::new()
				.register(EntitySchema::new("Article").primary_key("stub", ColumnType::Text)),
		)
	}

	#[fixture]
	fn blog() -> Arc<Fixture> {
		let articles = DataGroup::builder("Article")
			.record(RecordDecl::new("article1").set("stub", "article1"))
			.build()
			.unwrap();
		Fixture::builder("blog").group(&articles).build().unwrap()
	}

	#[rstest]
	#[tokio::test]
	async fn test_noop_counts_stay_zero(loader: NoopLoader, blog: Arc<Fixture>) {
		// Arrange
		let session = FixtureSession::open(&loader, &blog).await.unwrap();

		// Act
		let count = session.entity("Article").unwrap().count().await.unwrap();
		session.close().await.unwrap();

		// Assert
		assert_eq!(count, 0);
	}

	#[rstest]
	#[tokio::test]
	async fn test_session_exposes_groups(loader: NoopLoader, blog: Arc<Fixture>) {
		let session = FixtureSession::open_with(&loader, &blog, SessionOptions::new().with_load(false))
			.await
			.unwrap();

		let article = session.group("Article").unwrap().get("article1").unwrap();

		assert_eq!(article.get("stub").unwrap(), "article1");
		assert_eq!(session.groups().count(), 1);
		assert!(session.report().touched.is_empty());
		session.close().await.unwrap();
	}

	#[rstest]
	#[tokio::test]
	async fn test_unknown_entity(loader: NoopLoader, blog: Arc<Fixture>) {
		let session = FixtureSession::open(&loader, &blog).await.unwrap();

		let result = session.entity("Tag");

		assert!(matches!(
			result,
			Err(SessionError::Loader(fixtura_loader::LoaderError::UnknownEntity(_)))
		));
		session.close().await.unwrap();
	}

	#[rstest]
	#[tokio::test]
	async fn test_run_returns_body_error(loader: NoopLoader, blog: Arc<Fixture>) {
		let result: SessionResult<()> = FixtureSession::run(&loader, &blog, |_session| {
			Box::pin(async move { Err::<(), BoxError>("assertion failed".into()) })
		})
		.await;

		assert!(matches!(result, Err(SessionError::Test(ref e)) if e.to_string() == "assertion failed"));
	}

	#[rstest]
	#[tokio::test]
	#[serial(session_logs)]
	async fn test_drop_without_close_warns(loader: NoopLoader, blog: Arc<Fixture>) {
		use std::sync::Mutex as StdMutex;
		use tracing_subscriber::layer::SubscriberExt as _;
		use tracing_subscriber::util::SubscriberInitExt as _;

		// Arrange
		struct LogCapture {
			logs: Arc<StdMutex<Vec<String>>>,
		}

		impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for LogCapture {
			fn on_event(
				&self,
				event: &tracing::Event<'_>,
				_ctx: tracing_subscriber::layer::Context<'_, S>,
			) {
				struct MessageVisitor {
					message: String,
				}

				impl tracing::field::Visit for MessageVisitor {
					fn record_debug(
						&mut self,
						field: &tracing::field::Field,
						value: &dyn std::fmt::Debug,
					) {
						if field.name() == "message" {
							self.message = format!("{:?}", value);
						}
					}
				}

				let mut visitor = MessageVisitor {
					message: String::new(),
				};
				event.record(&mut visitor);
				self.logs.lock().unwrap().push(format!(
					"[{}] {}",
					event.metadata().level(),
					visitor.message
				));
			}
		}

		let logs = Arc::new(StdMutex::new(Vec::new()));
		let capture = LogCapture { logs: logs.clone() };
		let _guard = tracing_subscriber::registry().with(capture).set_default();

		// Act
		let session = FixtureSession::open(&loader, &blog).await.unwrap();
		drop(session);

		// Assert
		let captured = logs.lock().unwrap();
		assert!(
			captured
				.iter()
				.any(|log| log.contains("WARN") && log.contains("dropped without close")),
			"expected a drop warning, got: {:?}",
			captured
		);
	}
}
