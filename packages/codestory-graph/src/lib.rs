//! Graph Store Adapter: typed reads/writes over the labeled-property graph,
//! with retries, metrics, and idempotent schema management.

pub mod error;
pub mod metrics;
pub mod query;
pub mod schema;
pub mod store;

pub use error::{GraphError, Result};
pub use query::{GraphOperation, Record};
pub use store::{merge_by_path, merge_by_qualified_name, GraphStore, InMemoryGraphStore};
