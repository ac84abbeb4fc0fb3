//! Task Queue Adapter: submit/observe/cancel named tasks with progress
//! metadata, and a pub/sub channel for job events.

pub mod error;
pub mod queue;
pub mod task;

pub use error::{QueueError, Result};
pub use queue::{InMemoryTaskQueue, TaskQueue};
pub use task::{TaskHandle, TaskState, TaskStatus};
