//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod backoff;
pub mod challenge;
pub mod error;
pub mod ledger;
pub mod scheduler;
pub mod summary;
pub mod types;
