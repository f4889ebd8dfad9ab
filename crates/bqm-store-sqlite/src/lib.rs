//! SQLite emulation of the warehouse and the scheduled-query service.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Used for local development and for
//! exercising the engine end to end without cloud credentials.

mod dialect;
mod encode;
mod schedule;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteWarehouse, StoredJob};
