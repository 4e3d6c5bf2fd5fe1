//! Relational backend built on sqlx and sea-query.
//!
//! Statements are built with sea-query and rendered for the dialect of the
//! pool's database URL. Every batch runs on the session's own pooled
//! connection inside one transaction, with referential-integrity checks
//! suspended for its duration.

use std::sync::Once;

use async_trait::async_trait;
use fixtura_data::{Attributes, ColumnType, EntitySchema, Fixture, RecordKey};
use sea_query::{
	Alias, Cond, Expr, ExprTrait, MysqlQueryBuilder, PostgresQueryBuilder, Query,
	QueryStatementWriter, SqliteQueryBuilder,
};
use serde_json::Value;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyConnection, AnyPool, Connection, Row};
use tracing::{debug, warn};

use super::Loader;
use crate::catalog::EntityCatalog;
use crate::error::{LoaderError, LoaderResult};
use crate::plan::{BatchLedger, LoadPlan, deletion_batches};
use crate::report::{ChangeReport, TrackedInsertion, TrackedUpdate};
use crate::settings::{LoadMode, LoaderSettings};

static INSTALL_DRIVERS: Once = Once::new();

/// Installs the sqlx drivers used by [`AnyPool`].
pub fn install_drivers() {
	INSTALL_DRIVERS.call_once(|| {
		sqlx::any::install_default_drivers();
	});
}

/// SQL dialect of a relational store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
	/// SQLite.
	Sqlite,
	/// PostgreSQL.
	Postgres,
	/// MySQL or MariaDB.
	Mysql,
}

impl Dialect {
	/// Detects the dialect from a connection URL.
	///
	/// ```
	/// use fixtura_loader::backends::sql::Dialect;
	///
	/// assert_eq!(Dialect::from_url("sqlite://test.db").unwrap(), Dialect::Sqlite);
	/// assert_eq!(Dialect::from_url("postgresql://localhost/db").unwrap(), Dialect::Postgres);
	/// assert!(Dialect::from_url("redis://localhost").is_err());
	/// ```
	pub fn from_url(url: &str) -> LoaderResult<Self> {
		if url.starts_with("sqlite:") {
			Ok(Self::Sqlite)
		} else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
			Ok(Self::Postgres)
		} else if url.starts_with("mysql://") || url.starts_with("mariadb://") {
			Ok(Self::Mysql)
		} else {
			Err(LoaderError::Config(format!(
				"unsupported database URL scheme: {}",
				url.split(':').next().unwrap_or_default()
			)))
		}
	}

	/// Renders a statement for this dialect.
	pub fn render<S: QueryStatementWriter>(self, statement: &S) -> String {
		match self {
			Self::Sqlite => statement.to_string(SqliteQueryBuilder),
			Self::Postgres => statement.to_string(PostgresQueryBuilder),
			Self::Mysql => statement.to_string(MysqlQueryBuilder),
		}
	}
}

/// Constraint state to put back after a batch.
enum Suspension {
	Untouched,
	SqliteForeignKeys { previously_on: bool },
	MysqlForeignKeyChecks,
	PostgresReplicationRole { previous: &'static str },
}

/// Maps a `session_replication_role` setting onto a literal safe to splice
/// back into `SET`.
fn replication_role(role: &str) -> &'static str {
	match role.trim() {
		"replica" => "replica",
		"local" => "local",
		_ => "origin",
	}
}

/// SQLite reports `BOOLEAN` columns with a type the `Any` driver cannot
/// decode, so those and `REAL` columns are read through a cast.
fn sqlite_cast(column_type: ColumnType) -> Option<&'static str> {
	match column_type {
		ColumnType::Boolean => Some("INTEGER"),
		ColumnType::Real => Some("REAL"),
		_ => None,
	}
}

fn quote_sqlite(name: &str) -> String {
	format!("\"{}\"", name.replace('"', "\"\""))
}

fn ident(name: &str) -> Alias {
	Alias::new(name.to_string())
}

/// Converts a JSON value into a literal for a column of `column_type`.
fn to_expr(column_type: Option<ColumnType>, value: &Value) -> Expr {
	match (column_type, value) {
		(_, Value::Null) => Expr::val(None::<String>),
		(Some(ColumnType::Json), other) => Expr::val(other.to_string()),
		(_, Value::Bool(flag)) => Expr::val(*flag),
		(_, Value::Number(number)) => {
			if let Some(n) = number.as_i64() {
				Expr::val(n)
			} else if let Some(n) = number.as_u64() {
				Expr::val(n)
			} else {
				Expr::val(number.as_f64().unwrap_or_default())
			}
		}
		(_, Value::String(text)) => Expr::val(text.clone()),
		(_, other) => Expr::val(other.to_string()),
	}
}

fn column_condition(schema: &EntitySchema, column: &str, value: &Value) -> Expr {
	let column_type = schema.column_named(column).map(|c| c.column_type);
	let target = Expr::col(ident(column));
	if value.is_null() {
		target.is_null()
	} else {
		target.eq(to_expr(column_type, value))
	}
}

fn match_all(schema: &EntitySchema, filter: &Attributes) -> Cond {
	filter
		.iter()
		.fold(Cond::all(), |cond, (column, value)| {
			cond.add(column_condition(schema, column, value))
		})
}

fn key_condition(schema: &EntitySchema, key: &RecordKey) -> Cond {
	key.parts().iter().fold(Cond::all(), |cond, (column, value)| {
		cond.add(column_condition(schema, column, value))
	})
}

/// Decodes one row according to the schema's column types.
fn decode_row(dialect: Dialect, schema: &EntitySchema, row: &AnyRow) -> LoaderResult<Attributes> {
	let mut attributes = Attributes::new();
	for column in schema.columns() {
		let name = column.name.as_str();
		let value = match column.column_type {
			ColumnType::Integer => row
				.try_get::<Option<i64>, _>(name)?
				.map_or(Value::Null, Value::from),
			ColumnType::Boolean if dialect == Dialect::Sqlite => row
				.try_get::<Option<i64>, _>(name)?
				.map_or(Value::Null, |n| Value::from(n != 0)),
			ColumnType::Real => match row.try_get::<Option<f64>, _>(name) {
				Ok(real) => real.map_or(Value::Null, Value::from),
				Err(_) => row
					.try_get::<Option<i64>, _>(name)?
					.map_or(Value::Null, |n| Value::from(n as f64)),
			},
			ColumnType::Text => row
				.try_get::<Option<String>, _>(name)?
				.map_or(Value::Null, Value::from),
			ColumnType::Boolean => match row.try_get::<Option<bool>, _>(name) {
				Ok(flag) => flag.map_or(Value::Null, Value::from),
				Err(_) => row
					.try_get::<Option<i64>, _>(name)?
					.map_or(Value::Null, |n| Value::from(n != 0)),
			},
			ColumnType::Json => match row.try_get::<Option<String>, _>(name)? {
				Some(text) => serde_json::from_str(&text)?,
				None => Value::Null,
			},
		};
		attributes.insert(column.name.clone(), value);
	}
	Ok(attributes)
}

/// Loader for relational stores reachable through an [`AnyPool`].
///
/// # Example
///
/// ```rust,no_run
/// use fixtura_data::{ColumnType, EntitySchema};
/// use fixtura_loader::backends::sql::SqlLoader;
/// use fixtura_loader::{EntityCatalog, LoaderSettings};
///
/// # async fn example() -> fixtura_loader::LoaderResult<()> {
/// let catalog = EntityCatalog::new()
///     .register(EntitySchema::new("Article").primary_key("stub", ColumnType::Text));
/// let settings = LoaderSettings::new().with_database_url("sqlite://fixtures.db?mode=rwc");
/// let loader = SqlLoader::connect_url(catalog, settings).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SqlLoader {
	catalog: EntityCatalog,
	pool: AnyPool,
	dialect: Dialect,
	settings: LoaderSettings,
}

impl SqlLoader {
	/// Creates a loader over an existing pool with default settings.
	pub fn new(catalog: EntityCatalog, pool: AnyPool) -> LoaderResult<Self> {
		Self::with_settings(catalog, pool, LoaderSettings::default())
	}

	/// Creates a loader over an existing pool.
	pub fn with_settings(
		catalog: EntityCatalog,
		pool: AnyPool,
		settings: LoaderSettings,
	) -> LoaderResult<Self> {
		let dialect = Dialect::from_url(pool.connect_options().database_url.as_str())?;
		Ok(Self {
			catalog,
			pool,
			dialect,
			settings,
		})
	}

	/// Opens a pool for `settings.database_url` and creates a loader on it.
	///
	/// # Errors
	///
	/// Returns [`LoaderError::Config`] when no URL is configured and
	/// [`LoaderError::Database`] when the pool cannot connect.
	pub async fn connect_url(catalog: EntityCatalog, settings: LoaderSettings) -> LoaderResult<Self> {
		install_drivers();
		let url = settings
			.database_url
			.clone()
			.ok_or_else(|| LoaderError::Config("no database URL configured".to_string()))?;
		let dialect = Dialect::from_url(&url)?;
		let pool = AnyPoolOptions::new()
			.max_connections(Ord::max(settings.max_connections, 1))
			.connect(&url)
			.await?;
		Ok(Self {
			catalog,
			pool,
			dialect,
			settings,
		})
	}

	/// Returns the connection pool.
	pub fn pool(&self) -> &AnyPool {
		&self.pool
	}

	/// Returns the detected dialect.
	pub fn dialect(&self) -> Dialect {
		self.dialect
	}

	/// Returns the loader settings.
	pub fn settings(&self) -> &LoaderSettings {
		&self.settings
	}

	async fn suspend_constraints(&self, conn: &mut AnyConnection) -> LoaderResult<Suspension> {
		if !self.settings.suspend_constraints {
			return Ok(Suspension::Untouched);
		}
		match self.dialect {
			Dialect::Sqlite => {
				let row = sqlx::query("PRAGMA foreign_keys").fetch_one(&mut *conn).await?;
				let previously_on = row.try_get::<i64, _>(0)? != 0;
				if previously_on {
					sqlx::query("PRAGMA foreign_keys = OFF")
						.execute(&mut *conn)
						.await?;
				}
				Ok(Suspension::SqliteForeignKeys { previously_on })
			}
			Dialect::Mysql => {
				sqlx::query("SET FOREIGN_KEY_CHECKS = 0")
					.execute(&mut *conn)
					.await?;
				Ok(Suspension::MysqlForeignKeyChecks)
			}
			Dialect::Postgres => {
				let row = sqlx::query("SHOW session_replication_role")
					.fetch_one(&mut *conn)
					.await?;
				let previous = replication_role(&row.try_get::<String, _>(0)?);
				if previous == "replica" {
					return Ok(Suspension::Untouched);
				}
				sqlx::query("SET session_replication_role = replica")
					.execute(&mut *conn)
					.await
					.map_err(|e| {
						LoaderError::Config(format!(
							"cannot suspend foreign keys (session_replication_role needs superuser); \
							 declare them DEFERRABLE and disable suspend_constraints: {}",
							e
						))
					})?;
				Ok(Suspension::PostgresReplicationRole { previous })
			}
		}
	}

	async fn resume_constraints(
		&self,
		conn: &mut AnyConnection,
		suspension: Suspension,
	) -> LoaderResult<()> {
		match suspension {
			Suspension::Untouched => {}
			Suspension::SqliteForeignKeys { previously_on } => {
				if previously_on {
					sqlx::query("PRAGMA foreign_keys = ON")
						.execute(&mut *conn)
						.await?;
				}
			}
			Suspension::MysqlForeignKeyChecks => {
				sqlx::query("SET FOREIGN_KEY_CHECKS = 1")
					.execute(&mut *conn)
					.await?;
			}
			Suspension::PostgresReplicationRole { previous } => {
				sqlx::query(&format!("SET session_replication_role = {}", previous))
					.execute(&mut *conn)
					.await?;
			}
		}
		Ok(())
	}

	fn select_sql(&self, schema: &EntitySchema, condition: Option<Cond>) -> String {
		let mut statement = Query::select();
		for column in schema.columns() {
			match sqlite_cast(column.column_type).filter(|_| self.dialect == Dialect::Sqlite) {
				Some(target) => {
					statement.expr_as(
						Expr::cust(format!("CAST({} AS {})", quote_sqlite(&column.name), target)),
						ident(&column.name),
					);
				}
				None => {
					statement.column(ident(&column.name));
				}
			}
		}
		statement.from(ident(schema.table()));
		if let Some(condition) = condition {
			statement.cond_where(condition);
		}
		self.dialect.render(&statement)
	}

	fn insert_sql(&self, schema: &EntitySchema, attributes: &Attributes) -> LoaderResult<String> {
		let mut statement = Query::insert();
		statement
			.into_table(ident(schema.table()))
			.columns(attributes.keys().map(|column| ident(column)));
		statement
			.values(attributes.iter().map(|(column, value)| {
				to_expr(schema.column_named(column).map(|c| c.column_type), value)
			}))
			.map_err(|e| LoaderError::Query(e.to_string()))?;
		Ok(self.dialect.render(&statement))
	}

	fn update_sql(&self, schema: &EntitySchema, key: &RecordKey, attributes: &Attributes) -> String {
		let mut statement = Query::update();
		statement.table(ident(schema.table()));
		for (column, value) in attributes {
			statement.value(
				ident(column),
				to_expr(schema.column_named(column).map(|c| c.column_type), value),
			);
		}
		statement.cond_where(key_condition(schema, key));
		self.dialect.render(&statement)
	}

	fn delete_sql(&self, schema: &EntitySchema, keys: &[RecordKey]) -> String {
		let condition = keys
			.iter()
			.fold(Cond::any(), |cond, key| cond.add(key_condition(schema, key)));
		let statement = Query::delete()
			.from_table(ident(schema.table()))
			.cond_where(condition)
			.to_owned();
		self.dialect.render(&statement)
	}

	fn count_sql(&self, schema: &EntitySchema) -> String {
		let statement = Query::select()
			.expr_as(Expr::cust("COUNT(*)"), ident("row_count"))
			.from(ident(schema.table()))
			.to_owned();
		self.dialect.render(&statement)
	}

	async fn fetch_rows(
		&self,
		conn: &mut AnyConnection,
		schema: &EntitySchema,
		sql: String,
	) -> LoaderResult<Vec<Attributes>> {
		let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
		rows.iter()
			.map(|row| decode_row(self.dialect, schema, row))
			.collect()
	}

	async fn fetch_row(
		&self,
		conn: &mut AnyConnection,
		schema: &EntitySchema,
		key: &RecordKey,
	) -> LoaderResult<Option<Attributes>> {
		let sql = self.select_sql(schema, Some(key_condition(schema, key)));
		let rows = self.fetch_rows(conn, schema, sql).await?;
		Ok(rows.into_iter().next())
	}

	async fn insert_row(
		&self,
		conn: &mut AnyConnection,
		schema: &EntitySchema,
		attributes: &Attributes,
	) -> LoaderResult<()> {
		let sql = self.insert_sql(schema, attributes)?;
		sqlx::query(&sql).execute(&mut *conn).await?;
		Ok(())
	}

	async fn update_row(
		&self,
		conn: &mut AnyConnection,
		schema: &EntitySchema,
		key: &RecordKey,
		attributes: &Attributes,
	) -> LoaderResult<u64> {
		let sql = self.update_sql(schema, key, attributes);
		let result = sqlx::query(&sql).execute(&mut *conn).await?;
		Ok(result.rows_affected())
	}

	async fn apply(
		&self,
		conn: &mut AnyConnection,
		plan: &LoadPlan,
		ledger: &mut BatchLedger,
	) -> LoaderResult<()> {
		let mut tx = conn.begin().await?;

		for record in plan.records() {
			let schema = record.entity.as_ref();
			let entity = schema.name();

			if ledger.created_here(entity, &record.key) {
				if self.settings.load_mode == LoadMode::Overwrite {
					self.update_row(&mut tx, schema, &record.key, record.attributes())
						.await?;
				}
				continue;
			}

			match self.fetch_row(&mut tx, schema, &record.key).await? {
				None => {
					self.insert_row(&mut tx, schema, record.attributes()).await?;
					ledger.record_insert(entity, &record.key);
				}
				Some(_) if self.settings.load_mode == LoadMode::KeepExisting => {
					warn!(entity, key = %record.key, "keeping existing row");
				}
				Some(existing) => {
					ledger.record_update(entity, &record.key, existing);
					self.update_row(&mut tx, schema, &record.key, record.attributes())
						.await?;
				}
			}
		}

		tx.commit().await?;
		Ok(())
	}

	async fn remove(&self, conn: &mut AnyConnection, insertions: &[TrackedInsertion]) -> LoaderResult<()> {
		let batches = deletion_batches(&self.catalog, insertions)?;
		let mut tx = conn.begin().await?;

		for (schema, keys) in batches {
			let mut deleted = 0;
			for chunk in keys.chunks(self.settings.chunk_size()) {
				let sql = self.delete_sql(&schema, chunk);
				deleted += sqlx::query(&sql).execute(&mut *tx).await?.rows_affected();
			}
			debug!(entity = schema.name(), count = deleted, "deleted rows");
		}

		tx.commit().await?;
		Ok(())
	}

	async fn restore(&self, conn: &mut AnyConnection, updates: &[TrackedUpdate]) -> LoaderResult<()> {
		let mut tx = conn.begin().await?;

		for update in updates {
			let schema = self.catalog.require(&update.entity)?;
			if self.fetch_row(&mut tx, schema, &update.key).await?.is_none() {
				return Err(LoaderError::RestoreTargetMissing {
					entity: update.entity.clone(),
					key: update.key.to_string(),
				});
			}
			self.update_row(&mut tx, schema, &update.key, &update.original)
				.await?;
		}

		tx.commit().await?;
		debug!(count = updates.len(), "restored rows");
		Ok(())
	}
}

#[async_trait]
impl Loader for SqlLoader {
	type Handle = PoolConnection<Any>;

	fn catalog(&self) -> &EntityCatalog {
		&self.catalog
	}

	async fn connect(&self) -> LoaderResult<PoolConnection<Any>> {
		Ok(self.pool.acquire().await?)
	}

	async fn add_data(
		&self,
		handle: &mut PoolConnection<Any>,
		fixture: &Fixture,
	) -> LoaderResult<ChangeReport> {
		let plan = LoadPlan::build(&self.catalog, fixture)?;
		let mut ledger = BatchLedger::new(&plan);
		let conn: &mut AnyConnection = handle;

		let suspension = self.suspend_constraints(conn).await?;
		let applied = self.apply(conn, &plan, &mut ledger).await;
		let resumed = self.resume_constraints(conn, suspension).await;
		applied?;
		resumed?;

		let report = ledger.finish();
		debug!(
			fixture = fixture.name(),
			inserted = report.inserted_count(),
			updated = report.updated_count(),
			"loaded fixture"
		);
		Ok(report)
	}

	async fn delete_data(
		&self,
		handle: &mut PoolConnection<Any>,
		insertions: &[TrackedInsertion],
	) -> LoaderResult<()> {
		if insertions.is_empty() {
			return Ok(());
		}
		let conn: &mut AnyConnection = handle;
		let suspension = self.suspend_constraints(conn).await?;
		let removed = self.remove(conn, insertions).await;
		let resumed = self.resume_constraints(conn, suspension).await;
		removed?;
		resumed
	}

	async fn restore_data(
		&self,
		handle: &mut PoolConnection<Any>,
		updates: &[TrackedUpdate],
	) -> LoaderResult<()> {
		if updates.is_empty() {
			return Ok(());
		}
		let conn: &mut AnyConnection = handle;
		let suspension = self.suspend_constraints(conn).await?;
		let restored = self.restore(conn, updates).await;
		let resumed = self.resume_constraints(conn, suspension).await;
		restored?;
		resumed
	}

	async fn count(&self, handle: &mut PoolConnection<Any>, entity: &str) -> LoaderResult<u64> {
		let schema = self.catalog.require(entity)?;
		let sql = self.count_sql(schema);
		let conn: &mut AnyConnection = handle;
		let row = sqlx::query(&sql).fetch_one(&mut *conn).await?;
		let count: i64 = row.try_get("row_count")?;
		Ok(Ord::max(count, 0) as u64)
	}

	async fn all(
		&self,
		handle: &mut PoolConnection<Any>,
		entity: &str,
	) -> LoaderResult<Vec<Attributes>> {
		let schema = self.catalog.require(entity)?;
		let sql = self.select_sql(schema, None);
		self.fetch_rows(handle, schema, sql).await
	}

	async fn get(
		&self,
		handle: &mut PoolConnection<Any>,
		entity: &str,
		key: &RecordKey,
	) -> LoaderResult<Option<Attributes>> {
		let schema = self.catalog.require(entity)?;
		self.fetch_row(handle, schema, key).await
	}

	async fn filter_by(
		&self,
		handle: &mut PoolConnection<Any>,
		entity: &str,
		filter: &Attributes,
	) -> LoaderResult<Vec<Attributes>> {
		let schema = self.catalog.require(entity)?;
		if let Some(unknown) = filter.keys().find(|column| !schema.has_column(column)) {
			return Err(LoaderError::Query(format!(
				"{} has no column `{}`",
				schema.name(),
				unknown
			)));
		}
		let condition = (!filter.is_empty()).then(|| match_all(schema, filter));
		let sql = self.select_sql(schema, condition);
		self.fetch_rows(handle, schema, sql).await
	}
}
