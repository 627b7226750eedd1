/// Postgres plumbing
///
/// - `pool`: connection pool with a startup health check
/// - `migrations`: embedded schema migrations
///
/// The applicant and outbox tables themselves are accessed through
/// [`crate::store`] and [`crate::outbox`].
pub mod migrations;
pub mod pool;
