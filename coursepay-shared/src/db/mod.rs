/// Database layer
///
/// - `pool`: PostgreSQL connection pool with startup health check
/// - `migrations`: embedded migration runner
///
/// Row types and their queries live in [`crate::models`]; the services reach
/// them through [`crate::store::PgStore`].

pub mod migrations;
pub mod pool;
