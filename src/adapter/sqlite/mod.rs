//! SQLite persistence using Diesel ORM.

pub mod connection;
mod model;
mod repository;
mod schema;

pub use connection::{create_pool, run_migrations, DbPool};
pub use repository::SqliteRepository;

use crate::error::Result;

/// Open (creating if needed) and migrate the database at `url`.
///
/// # Errors
/// Returns an error if the pool cannot be built or migrations fail.
pub fn open(url: &str) -> Result<SqliteRepository> {
    let pool = create_pool(url)?;
    run_migrations(&pool)?;
    Ok(SqliteRepository::new(pool))
}
