//! devtools-helper library
//!
//! Core logic behind the `devtools-helper` CLI: Cursor local-history
//! recovery, CTL annotation parsing and doc sync, the workspace architecture
//! diagram, benchmark regression checks, `unwrap()` audits and an ONNX model
//! output comparison harness.
//!
//! This tool is not affiliated with or endorsed by Anysphere, Inc. (Cursor).
//! It reads locally stored history files on your machine for recovery.

pub mod arch;
pub mod archive;
pub mod audit;
pub mod config;
pub mod ctl;
pub mod cursor;
pub mod models;
pub mod perf;
