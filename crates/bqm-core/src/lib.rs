//! Core types and trait definitions for the bqm migration engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. It holds
//! the migration file model, the pure text transforms applied to scripts
//! (placeholder substitution, checksumming, directive parsing) and the two
//! backend traits every warehouse implementation provides.

pub mod backend;
pub mod checksum;
pub mod error;
pub mod ledger;
pub mod migration;
pub mod placeholder;
pub mod target;

pub use error::{Error, Result};
