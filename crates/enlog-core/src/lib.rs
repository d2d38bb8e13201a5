//! Core domain types for the Energy Logger 4000 toolchain.
//!
//! Holds the fixed binary record layouts, the minute-granularity timeline
//! helpers, the rank-based statistics engine, and the session summary model.
//! File I/O and stream decoding live in `enlog-data`; presentation lives in
//! the `enlog` binary crate.

pub mod error;
pub mod records;
pub mod session;
pub mod stats;
pub mod timeline;

pub use error::{EnlogError, Result};
