//! Cursor IDE local history recovery

pub mod history;
pub mod restore;

// Re-exports for library consumers
pub use history::{history_folder_name, HistoryEntry, HistoryIndex, TimelineQuery};
pub use restore::{restore, RestoreOptions, RestorePlan};
