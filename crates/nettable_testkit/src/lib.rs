//! # nettable Testkit
//!
//! Test utilities for nettable.
//!
//! This crate provides:
//! - Live server/client fixtures on loopback sockets
//! - Helpers that wait for replication and change notifications
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nettable_testkit::prelude::*;
//!
//! #[test]
//! fn replicates() {
//!     let pair = LivePair::nt3();
//!     let events = pair.server.subscribe(None);
//!     pair.client_table("t1").put_number("x", 1.0);
//!     expect_changes(&events, 1, DEFAULT_WAIT);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
