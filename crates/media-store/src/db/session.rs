//! Database connection pool. One pool is shared by the event log, the
//! projector(s), and the saga engine — each owns disjoint tables, so no
//! cross-subsystem transaction is ever required (spec.md section 5).

use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use media_core::{CoreError, Result};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Build the pool from an already-validated `DATABASE_URL`. Startup
/// failure here (spec.md section 6) is surfaced to the caller rather
/// than panicking, so `media-app`'s `main` can log and exit cleanly.
pub fn init_pool(database_url: &str, max_size: u32) -> Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(CoreError::from)
}

#[cfg(test)]
/// A pool that never actually connects, for unit tests that only need to
/// exercise validation logic running before any connection is acquired.
pub fn unconnected_pool_for_tests() -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new("postgres://unused/unused");
    Pool::builder()
        .max_size(1)
        .min_idle(Some(0))
        .build_unchecked(manager)
}
