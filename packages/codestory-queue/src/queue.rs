//! [`TaskQueue`]: submit/observe/revoke named tasks, plus a pub/sub channel
//! for progress events.
//!
//! The real system executes tasks in external worker processes; this
//! workspace runs everything in-process, so the orchestrator plays both
//! submitter and worker role, calling back into `report_progress` /
//! `complete` / `fail` as it drives a step to completion. The adapter
//! itself only owns state visibility and pub/sub, matching the spec's
//! "must be safe to observe a handle from any thread" requirement.

use crate::error::{QueueError, Result};
use crate::task::{TaskHandle, TaskState, TaskStatus};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 256;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn submit(&self, name: &str, queue: &str) -> TaskHandle;
    async fn inspect(&self, handle: &TaskHandle) -> Option<TaskStatus>;
    async fn revoke(&self, handle: &TaskHandle, terminate: bool) -> Result<()>;
    async fn report_progress(&self, handle: &TaskHandle, progress: f32, message: String) -> Result<()>;
    async fn complete(&self, handle: &TaskHandle, meta: Value) -> Result<()>;
    async fn fail(&self, handle: &TaskHandle, reason: String) -> Result<()>;
    async fn publish(&self, channel: &str, payload: Value);
    fn subscribe(&self, channel: &str) -> broadcast::Receiver<Value>;
}

struct TaskRecord {
    status: TaskStatus,
    queue: String,
}

pub struct InMemoryTaskQueue {
    tasks: DashMap<TaskHandle, TaskRecord>,
    channels: DashMap<String, broadcast::Sender<Value>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            channels: DashMap::new(),
        }
    }

    fn channel(&self, name: &str) -> broadcast::Sender<Value> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    fn update<F: FnOnce(&mut TaskStatus)>(&self, handle: &TaskHandle, f: F) -> Result<()> {
        let mut entry = self
            .tasks
            .get_mut(handle)
            .ok_or_else(|| QueueError::UnknownHandle(handle.to_string()))?;
        f(&mut entry.status);
        Ok(())
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn submit(&self, name: &str, queue: &str) -> TaskHandle {
        let handle = TaskHandle::new();
        debug!(%handle, name, queue, "submitted task");
        self.tasks.insert(
            handle,
            TaskRecord {
                status: TaskStatus::new(name),
                queue: queue.to_string(),
            },
        );
        handle
    }

    async fn inspect(&self, handle: &TaskHandle) -> Option<TaskStatus> {
        self.tasks.get(handle).map(|r| r.status.clone())
    }

    async fn revoke(&self, handle: &TaskHandle, _terminate: bool) -> Result<()> {
        self.update(handle, |s| {
            if !s.state.is_terminal() {
                s.state = TaskState::Revoked;
            }
        })
    }

    async fn report_progress(&self, handle: &TaskHandle, progress: f32, message: String) -> Result<()> {
        self.update(handle, |s| {
            s.state = TaskState::Running;
            s.progress = progress.clamp(0.0, 100.0);
            s.message = message;
        })
    }

    async fn complete(&self, handle: &TaskHandle, meta: Value) -> Result<()> {
        self.update(handle, |s| {
            s.state = TaskState::Success;
            s.progress = 100.0;
            if let Value::Object(map) = meta {
                s.meta = map;
            }
        })
    }

    async fn fail(&self, handle: &TaskHandle, reason: String) -> Result<()> {
        self.update(handle, |s| {
            s.state = TaskState::Failure;
            s.message = reason;
        })
    }

    async fn publish(&self, channel: &str, payload: Value) {
        // A channel with no subscribers yet is not an error: the broker
        // model treats pub/sub as fire-and-forget.
        let _ = self.channel(channel).send(payload);
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<Value> {
        self.channel(channel).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn submit_then_inspect_reflects_pending() {
        let q = InMemoryTaskQueue::new();
        let handle = q.submit("ingest.filesystem", "default").await;
        let status = q.inspect(&handle).await.unwrap();
        assert_eq!(status.state, TaskState::Pending);
    }

    #[tokio::test]
    async fn progress_then_complete_transitions_state() {
        let q = InMemoryTaskQueue::new();
        let handle = q.submit("ingest.filesystem", "default").await;
        q.report_progress(&handle, 40.0, "walking".into()).await.unwrap();
        assert_eq!(q.inspect(&handle).await.unwrap().state, TaskState::Running);
        q.complete(&handle, json!({"nodes": 12})).await.unwrap();
        let status = q.inspect(&handle).await.unwrap();
        assert_eq!(status.state, TaskState::Success);
        assert_eq!(status.progress, 100.0);
        assert_eq!(status.meta["nodes"], json!(12));
    }

    #[tokio::test]
    async fn fail_records_reason() {
        let q = InMemoryTaskQueue::new();
        let handle = q.submit("ingest.ast", "default").await;
        q.fail(&handle, "container exited 1".into()).await.unwrap();
        let status = q.inspect(&handle).await.unwrap();
        assert_eq!(status.state, TaskState::Failure);
        assert_eq!(status.message, "container exited 1");
    }

    #[tokio::test]
    async fn revoke_is_terminal_and_idempotent() {
        let q = InMemoryTaskQueue::new();
        let handle = q.submit("ingest.summarizer", "default").await;
        q.revoke(&handle, true).await.unwrap();
        q.complete(&handle, json!({})).await.unwrap();
        // revoke already made it terminal; a later progress report must not
        // resurrect it into Running.
        q.revoke(&handle, true).await.unwrap();
        assert_eq!(q.inspect(&handle).await.unwrap().state, TaskState::Success);
    }

    #[tokio::test]
    async fn inspect_unknown_handle_is_none() {
        let q = InMemoryTaskQueue::new();
        assert!(q.inspect(&TaskHandle::new()).await.is_none());
    }

    #[tokio::test]
    async fn publish_reaches_active_subscriber() {
        let q = InMemoryTaskQueue::new();
        let mut rx = q.subscribe("job-1");
        q.publish("job-1", json!({"progress": 10})).await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received["progress"], json!(10));
    }
}
