/// Middleware modules for the API server
///
/// - `auth`: applicant session and dashboard password checks
/// - `security`: hardening response headers

pub mod auth;
pub mod security;
