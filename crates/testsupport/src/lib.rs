//! Test support utilities for the storage engine workspace.
//!
//! This crate provides:
//! - Isolated engine instances in temporary directories, with clean reopen
//!   and simulated crash
//! - Deterministic key and payload fixtures
//! - Property-based test strategies for payloads and log entries
//! - Assertion helpers for engine errors and row visibility
//! - A once-only tracing subscriber for debugging test runs
//!
//! # Example Usage
//!
//! ```no_run
//! use mvcc::IsolationLevel;
//! use testsupport::prelude::*;
//!
//! let mut ctx = TestContext::new().unwrap();
//! let xid = ctx.engine().begin(IsolationLevel::ReadCommitted).unwrap();
//! let uid = ctx.engine().insert(xid, &payload(1)).unwrap();
//! ctx.engine().commit(xid).unwrap();
//!
//! ctx.crash().unwrap();
//! assert_visible(ctx.engine(), uid, &payload(1));
//! ```

pub mod assertions;
pub mod context;
pub mod fixtures;
pub mod proptest_generators;

/// Convenient re-exports for common testing patterns.
pub mod prelude {
    pub use crate::assertions::*;
    pub use crate::context::*;
    pub use crate::fixtures::*;
}
