//! Convenience re-exports for tests that open sessions.

pub use crate::error::{BoxError, SessionError, SessionResult};
pub use crate::query::EntityQuery;
pub use crate::session::{FixtureSession, SessionOptions};
pub use fixtura_loader::{EntityCatalog, Loader, LoaderError, NoopLoader};
