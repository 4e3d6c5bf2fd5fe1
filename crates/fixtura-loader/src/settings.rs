//! Loader configuration.
//!
//! Settings deserialize from any serde source with defaults for every field,
//! and can be read from `FIXTURA_*` environment variables.

use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, LoaderResult};

/// Environment variable holding the database URL.
pub const ENV_DATABASE_URL: &str = "FIXTURA_DATABASE_URL";
/// Environment variable holding the deletion chunk size.
pub const ENV_DELETE_CHUNK_SIZE: &str = "FIXTURA_DELETE_CHUNK_SIZE";
/// Environment variable holding the load mode.
pub const ENV_LOAD_MODE: &str = "FIXTURA_LOAD_MODE";
/// Environment variable toggling constraint suspension.
pub const ENV_SUSPEND_CONSTRAINTS: &str = "FIXTURA_SUSPEND_CONSTRAINTS";
/// Environment variable holding the pool size.
pub const ENV_MAX_CONNECTIONS: &str = "FIXTURA_MAX_CONNECTIONS";

/// What to do with a record whose key already exists in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadMode {
	/// Snapshot the existing row, then overwrite it.
	#[default]
	Overwrite,
	/// Leave the existing row alone.
	KeepExisting,
}

impl FromStr for LoadMode {
	type Err = LoaderError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"overwrite" => Ok(Self::Overwrite),
			"keep-existing" | "keep_existing" => Ok(Self::KeepExisting),
			other => Err(LoaderError::Config(format!("unknown load mode `{}`", other))),
		}
	}
}

impl fmt::Display for LoadMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Overwrite => f.write_str("overwrite"),
			Self::KeepExisting => f.write_str("keep-existing"),
		}
	}
}

/// Loader settings.
///
/// # Example
///
/// ```
/// use fixtura_loader::{LoadMode, LoaderSettings};
///
/// let settings = LoaderSettings::new()
///     .with_database_url("sqlite://fixtures.db?mode=rwc")
///     .with_delete_chunk_size(50)
///     .with_load_mode(LoadMode::KeepExisting);
///
/// assert_eq!(settings.delete_chunk_size, 50);
/// assert!(settings.suspend_constraints);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
	/// Connection URL of the relational store.
	pub database_url: Option<String>,

	/// Maximum number of keys per delete statement.
	pub delete_chunk_size: usize,

	/// Behaviour for records whose key already exists.
	pub load_mode: LoadMode,

	/// Suspend referential-integrity checks while writing.
	pub suspend_constraints: bool,

	/// Maximum pool size when the loader opens its own pool.
	pub max_connections: u32,
}

impl Default for LoaderSettings {
	fn default() -> Self {
		Self {
			database_url: None,
			delete_chunk_size: 100,
			load_mode: LoadMode::Overwrite,
			suspend_constraints: true,
			max_connections: 5,
		}
	}
}

impl LoaderSettings {
	/// Creates default settings.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the database URL.
	pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
		self.database_url = Some(url.into());
		self
	}

	/// Sets the deletion chunk size. Zero is treated as one.
	pub fn with_delete_chunk_size(mut self, size: usize) -> Self {
		self.delete_chunk_size = size;
		self
	}

	/// Sets the load mode.
	pub fn with_load_mode(mut self, mode: LoadMode) -> Self {
		self.load_mode = mode;
		self
	}

	/// Enables or disables constraint suspension.
	pub fn with_suspend_constraints(mut self, suspend: bool) -> Self {
		self.suspend_constraints = suspend;
		self
	}

	/// Sets the pool size.
	pub fn with_max_connections(mut self, max: u32) -> Self {
		self.max_connections = max;
		self
	}

	/// Returns the effective chunk size.
	pub fn chunk_size(&self) -> usize {
		self.delete_chunk_size.max(1)
	}

	/// Reads settings from `FIXTURA_*` environment variables.
	///
	/// Unset variables keep their defaults.
	///
	/// # Errors
	///
	/// Returns [`LoaderError::Config`] for a value that does not parse.
	pub fn from_env() -> LoaderResult<Self> {
		let mut settings = Self::default();
		if let Some(url) = read_env(ENV_DATABASE_URL) {
			settings.database_url = Some(url);
		}
		if let Some(size) = read_env(ENV_DELETE_CHUNK_SIZE) {
			settings.delete_chunk_size = parse_env(ENV_DELETE_CHUNK_SIZE, &size)?;
		}
		if let Some(mode) = read_env(ENV_LOAD_MODE) {
			settings.load_mode = mode.parse()?;
		}
		if let Some(flag) = read_env(ENV_SUSPEND_CONSTRAINTS) {
			settings.suspend_constraints = parse_flag(&flag)?;
		}
		if let Some(max) = read_env(ENV_MAX_CONNECTIONS) {
			settings.max_connections = parse_env(ENV_MAX_CONNECTIONS, &max)?;
		}
		Ok(settings)
	}
}

fn read_env(name: &str) -> Option<String> {
	env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> LoaderResult<T> {
	value
		.trim()
		.parse()
		.map_err(|_| LoaderError::Config(format!("{} has invalid value `{}`", name, value)))
}

fn parse_flag(value: &str) -> LoaderResult<bool> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(LoaderError::Config(format!(
			"{} has invalid value `{}`",
			ENV_SUSPEND_CONSTRAINTS, value
		))),
	}
}
