/// PostgreSQL plumbing: connection pool and embedded migrations
///
/// Models and their queries live in [`crate::models`]; the transactional
/// logic that combines them lives in [`crate::store::postgres`].

pub mod migrations;
pub mod pool;
