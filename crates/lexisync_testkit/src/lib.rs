//! # LexiSync Testkit
//!
//! Test utilities for LexiSync.
//!
//! This crate provides:
//! - A complete in-memory server stack driven by a manual clock
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lexisync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_stack() {
//!     let stack = TestStack::new();
//!     stack.user("7", zh_en());
//!     let cards = stack.pull_all(EntityKind::Cards, "7", 10).await;
//!     // ... assertions
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
