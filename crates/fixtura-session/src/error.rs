//! Error types for fixture sessions.

use std::fmt;

use fixtura_loader::LoaderError;
use thiserror::Error;

/// Boxed error returned by a test body run inside a session.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure to reverse a session's changes.
///
/// Closing attempts both the deletion of created rows and the restoration
/// of overwritten rows; each step that failed is kept.
#[derive(Debug, Default)]
pub struct TeardownError {
	/// Failure while deleting the rows the session created.
	pub delete: Option<LoaderError>,
	/// Failure while restoring the rows the session overwrote.
	pub restore: Option<LoaderError>,
}

impl TeardownError {
	/// Returns true if neither step failed.
	pub fn is_empty(&self) -> bool {
		self.delete.is_none() && self.restore.is_none()
	}

	pub(crate) fn into_result(self) -> Result<(), Self> {
		if self.is_empty() { Ok(()) } else { Err(self) }
	}
}

impl fmt::Display for TeardownError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("fixture teardown failed")?;
		if let Some(error) = &self.delete {
			write!(f, "; delete: {}", error)?;
		}
		if let Some(error) = &self.restore {
			write!(f, "; restore: {}", error)?;
		}
		Ok(())
	}
}

impl std::error::Error for TeardownError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.delete
			.as_ref()
			.or(self.restore.as_ref())
			.map(|error| error as &(dyn std::error::Error + 'static))
	}
}

fn test_suffix(test: &Option<BoxError>) -> String {
	match test {
		Some(error) => format!(" (test body also failed: {})", error),
		None => String::new(),
	}
}

/// Errors that can occur while opening, using or closing a session.
#[derive(Debug, Error)]
pub enum SessionError {
	/// The loader failed, including while loading the fixture on open.
	#[error(transparent)]
	Loader(#[from] LoaderError),

	/// The test body returned an error; teardown succeeded.
	#[error("test body failed: {0}")]
	Test(BoxError),

	/// Teardown failed, possibly after the test body failed too.
	#[error("{}{}", .teardown, test_suffix(.test))]
	Teardown {
		/// The teardown failure.
		teardown: TeardownError,
		/// The test body's own error, if it returned one.
		test: Option<BoxError>,
	},
}

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_teardown_reports_both_failures() {
		let error = TeardownError {
			delete: Some(LoaderError::Document("delete refused".to_string())),
			restore: Some(LoaderError::RestoreTargetMissing {
				entity: "Article".to_string(),
				key: "\"article1\"".to_string(),
			}),
		};

		let message = error.to_string();

		assert!(message.contains("delete: Document store error: delete refused"));
		assert!(message.contains("restore: cannot restore Article row"));
	}

	#[rstest]
	fn test_teardown_keeps_test_error() {
		let error = SessionError::Teardown {
			teardown: TeardownError {
				delete: Some(LoaderError::Document("gone".to_string())),
				restore: None,
			},
			test: Some("assertion failed".into()),
		};

		assert_eq!(
			error.to_string(),
			"fixture teardown failed; delete: Document store error: gone (test body also failed: assertion failed)"
		);
	}

	#[rstest]
	fn test_empty_teardown_is_ok() {
		assert!(TeardownError::default().into_result().is_ok());
	}
}
