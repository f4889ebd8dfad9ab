//! Google Cloud transport: BigQuery `jobs.query` for scripts and ledger
//! statements, and the Data Transfer API for scheduled queries.
//!
//! Authentication uses a service-account key exchanged for an OAuth access
//! token, or a caller-supplied token.

mod auth;
mod client;
mod jobs;
mod transfer;

pub mod credentials;
pub mod error;

pub use auth::Authenticator;
pub use client::GoogleClient;
pub use credentials::ServiceAccountKey;
pub use error::{Error, Result};
pub use jobs::BigQueryBackend;
pub use transfer::DataTransferBackend;
