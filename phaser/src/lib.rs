//! Resumable two-phase account automation.
//!
//! Accounts are logged in first, then each authenticated account interacts
//! with every resource it has not yet completed. Progress lives in a durable
//! ledger so any run can be interrupted and resumed. The crate is split into:
//!
//! - **[`core`]**: Pure, deterministic logic (ledger transitions, scheduling,
//!   challenge classification, backoff arithmetic). No I/O.
//! - **[`io`]**: Side effects (data directory, config, catalogs, ledger
//!   storage, activity trail, browser profiles, operator console, sleeping).
//!
//! Protocol modules ([`retry`], [`resolver`], [`login`], [`interaction`]) drive a
//! [`driver::Page`], and [`orchestrator`] sequences them into a run. With the
//! `browser` feature, `browser` supplies a Chromium-backed page; embedders can
//! bring their own. [`maintenance`] and [`report`] back the CLI.

#[cfg(feature = "browser")]
pub mod browser;
pub mod core;
pub mod driver;
pub mod exit_codes;
pub mod interaction;
pub mod io;
pub mod logging;
pub mod login;
pub mod maintenance;
pub mod orchestrator;
pub mod pacing;
pub mod report;
pub mod resolver;
pub mod retry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
