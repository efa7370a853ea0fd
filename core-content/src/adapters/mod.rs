//! Database adapters backing the repositories.

mod sqlite_native;

pub use sqlite_native::SqliteAdapter;
pub(crate) use sqlite_native::classify_sqlx_error;
