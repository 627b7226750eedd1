//! # ShellHacks Shared Library
//!
//! Domain types and business rules shared by the ShellHacks API server and
//! the side-effect dispatcher.
//!
//! ## Module Organization
//!
//! - `models`: Applicant record, profile and status state machine
//! - `auth`: Password hashing, session tokens and one-time token helpers
//! - `db`: Postgres pool and embedded migrations
//! - `store`: Applicant persistence behind the `ApplicantStore` trait
//! - `outbox`: Durable queue of notifications and spreadsheet rows
//! - `integrations`: Traits for mail, spreadsheet and file storage services
//! - `validation`: Field rules for registration and application
//! - `lifecycle`: The applicant lifecycle manager

pub mod auth;
pub mod db;
pub mod integrations;
pub mod lifecycle;
pub mod models;
pub mod outbox;
pub mod store;
pub mod validation;

/// Current version of the ShellHacks shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
