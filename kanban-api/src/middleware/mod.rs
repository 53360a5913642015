/// Middleware and request extractors
///
/// - `auth`: bearer authentication extractor and client metadata
/// - `security`: security response headers

pub mod auth;
pub mod security;
