//! Bookkeeping tables owned by the emulator itself.
//!
//! The ledger table is not created here: the engine creates it through
//! [`QueryBackend::execute`](bqm_core::backend::QueryBackend::execute) like
//! any other script.

/// Name of the table standing in for the Data Transfer service.
pub const SCHEDULED_JOBS: &str = "__bqm_scheduled_jobs";

pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per recurring job; display_name is the upsert key.
CREATE TABLE IF NOT EXISTS __bqm_scheduled_jobs (
    display_name        TEXT PRIMARY KEY,
    job_name            TEXT NOT NULL UNIQUE,
    schedule            TEXT NOT NULL,
    description         TEXT NOT NULL,
    query               TEXT NOT NULL,
    destination_dataset TEXT NOT NULL,
    location            TEXT NOT NULL,
    created_at          TEXT NOT NULL,   -- RFC 3339 UTC
    updated_at          TEXT NOT NULL
);

PRAGMA user_version = 1;
";
