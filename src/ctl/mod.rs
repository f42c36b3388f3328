//! CTL: structured component annotations in source comments

pub mod convert;
pub mod enhanced;
pub mod model;
pub mod parser;
pub mod schema;
pub mod store;
pub mod strip;
pub mod sync;

// Re-exports for library consumers
pub use model::{Component, Dependency, Format, Kind, Maturity};
pub use parser::{extract_components, Parsers};
pub use schema::CtlError;
pub use store::{Store, StoreError};
pub use sync::{CtlSync, SyncOutcome};
