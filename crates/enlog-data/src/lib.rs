//! Data ingestion layer for the Energy Logger 4000 toolchain.
//!
//! Responsible for decoding `.bin` files from the logger's SD card into
//! typed records, threading the time reference across a multi-file capture,
//! reading and rewriting the setup file, and orchestrating whole-directory
//! decodes.

pub mod decoder;
pub mod directory;
pub mod setup;

pub use enlog_core as core;
