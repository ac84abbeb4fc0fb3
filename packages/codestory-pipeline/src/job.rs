//! Job and step state (spec section 3.2): the volatile state the
//! orchestrator owns for the lifetime of one job.

use chrono::{DateTime, Utc};
use codestory_queue::TaskHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Stopped,
    Cancelled,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Completed | Status::Failed | Status::Stopped | Status::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepState {
    pub status: Status,
    pub progress: f32,
    pub message: String,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub task_handle: Option<TaskHandle>,
}

impl StepState {
    pub fn pending() -> Self {
        Self {
            status: Status::Pending,
            progress: 0.0,
            message: String::new(),
            error: None,
            started_at: None,
            ended_at: None,
            task_handle: None,
        }
    }
}

impl Default for StepState {
    fn default() -> Self {
        Self::pending()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub repo_path: String,
    pub steps_requested: Vec<String>,
    /// Cross-job dependencies: other job ids that must be terminal before
    /// this job may be dispatched.
    pub cross_job_deps: Vec<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub status: Status,
    pub progress_percent: f32,
    pub per_step: HashMap<String, StepState>,
    pub error: Option<String>,
    pub failed_step: Option<String>,
    /// True for jobs started via `ingestion_update`; threaded into each
    /// step's [`StepContext::incremental`] so steps that support a
    /// short-circuit path can take it.
    pub incremental: bool,
}

impl Job {
    pub fn new(repo_path: impl Into<String>, steps_requested: Vec<String>, cross_job_deps: Vec<Uuid>, incremental: bool) -> Self {
        let per_step = steps_requested
            .iter()
            .map(|s| (s.clone(), StepState::pending()))
            .collect();
        Self {
            id: Uuid::new_v4(),
            repo_path: repo_path.into(),
            steps_requested,
            cross_job_deps,
            started_at: None,
            status: Status::Pending,
            progress_percent: 0.0,
            per_step,
            error: None,
            failed_step: None,
            incremental,
        }
    }
}

/// Wraps a [`Job`] and enforces its state-machine transitions (spec section
/// 4.9's diagram).
pub struct JobStateMachine {
    pub job: Job,
}

impl JobStateMachine {
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    pub fn start(&mut self) {
        if self.job.status == Status::Pending {
            self.job.status = Status::Running;
            self.job.started_at = Some(Utc::now());
        }
    }

    pub fn step_started(&mut self, step: &str) {
        if let Some(state) = self.job.per_step.get_mut(step) {
            state.status = Status::Running;
            state.started_at = Some(Utc::now());
        }
        self.recompute_progress();
    }

    pub fn step_progress(&mut self, step: &str, progress: f32, message: impl Into<String>) {
        if let Some(state) = self.job.per_step.get_mut(step) {
            state.status = Status::Running;
            state.progress = progress.clamp(0.0, 100.0);
            state.message = message.into();
        }
        self.recompute_progress();
    }

    pub fn step_completed(&mut self, step: &str) {
        if let Some(state) = self.job.per_step.get_mut(step) {
            state.status = Status::Completed;
            state.progress = 100.0;
            state.ended_at = Some(Utc::now());
        }
        self.recompute_progress();
        if self.job.per_step.values().all(|s| s.status == Status::Completed) {
            self.job.status = Status::Completed;
            self.job.progress_percent = 100.0;
        }
    }

    /// Marks the job `FAILED`. Steps already `Running` are left as-is: the
    /// orchestrator lets a wave already in flight finish before it stops
    /// dispatching further waves (spec 4.9's documented divergence from a
    /// hard abort-on-first-failure).
    pub fn step_failed(&mut self, step: &str, message: impl Into<String>) {
        let message = message.into();
        if let Some(state) = self.job.per_step.get_mut(step) {
            state.status = Status::Failed;
            state.error = Some(message.clone());
            state.ended_at = Some(Utc::now());
        }
        if !self.job.status.is_terminal() {
            self.job.status = Status::Failed;
            self.job.failed_step = Some(step.to_string());
            self.job.error = Some(format!("step '{step}' failed: {message}"));
        }
        self.recompute_progress();
    }

    pub fn cancel(&mut self) {
        for state in self.job.per_step.values_mut() {
            if !state.status.is_terminal() {
                state.status = Status::Cancelled;
                state.ended_at = Some(Utc::now());
            }
        }
        self.job.status = Status::Cancelled;
    }

    /// Weighted sum over steps that have left `PENDING`; steps still
    /// pending do not count toward the denominator (spec 4.9).
    pub fn recompute_progress(&mut self) {
        let active: Vec<&StepState> = self
            .job
            .per_step
            .values()
            .filter(|s| s.status != Status::Pending)
            .collect();
        if active.is_empty() {
            self.job.progress_percent = 0.0;
            return;
        }
        let sum: f32 = active
            .iter()
            .map(|s| if s.status == Status::Completed { 100.0 } else { s.progress })
            .sum();
        self.job.progress_percent = sum / active.len() as f32;
    }
}
