//! CLI commands

pub mod arch;
pub mod bench;
pub mod ctl;
pub mod history;
pub mod models;
pub mod unwrap;
pub mod utils;
