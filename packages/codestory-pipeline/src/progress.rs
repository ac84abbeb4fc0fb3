//! Progress & Event Bus (C10): a per-job channel publishing state-change
//! and heartbeat events, plus the ETA/elapsed-time math ported from the
//! original progress tracker.

use crate::job::Job;
use codestory_queue::TaskQueue;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Publishes `{job_id, status, progress, message, steps, ts}` on the job's
/// channel. The bus itself holds no history; subscribers must already be
/// listening (or re-fetch the job record) to catch up.
pub async fn publish_job_event(queue: &dyn TaskQueue, job: &Job) {
    let steps: serde_json::Map<String, serde_json::Value> = job
        .per_step
        .iter()
        .map(|(name, state)| {
            (
                name.clone(),
                serde_json::json!({
                    "status": state.status,
                    "progress": state.progress,
                    "message": state.message,
                    "error": state.error,
                }),
            )
        })
        .collect();
    let payload = serde_json::json!({
        "job_id": job.id,
        "status": job.status,
        "progress": job.progress_percent,
        "message": job.error.clone().unwrap_or_default(),
        "steps": steps,
        "ts": chrono::Utc::now(),
    });
    queue.publish(&format!("job:{}", job.id), payload).await;
}

/// Tracks elapsed time and derives an ETA from the current progress
/// percentage, and throttles how often a caller should actually emit an
/// update (default every 5s).
pub struct ProgressTracker {
    start: Instant,
    last_update: Mutex<Instant>,
    update_interval: Duration,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_UPDATE_INTERVAL)
    }

    pub fn with_interval(update_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_update: Mutex::new(now),
            update_interval,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns true and resets the internal clock if at least
    /// `update_interval` has passed since the last reported update.
    pub fn should_update(&self) -> bool {
        let mut last = self.last_update.lock().unwrap();
        if last.elapsed() >= self.update_interval {
            *last = Instant::now();
            true
        } else {
            false
        }
    }

    /// `None` if `progress <= 0`; otherwise `elapsed / (progress/100) - elapsed`,
    /// clamped to zero.
    pub fn estimated_remaining(&self, progress_percent: f32) -> Option<Duration> {
        if progress_percent <= 0.0 {
            return None;
        }
        let elapsed = self.elapsed().as_secs_f64();
        let total_estimate = elapsed / (progress_percent as f64 / 100.0);
        let remaining = (total_estimate - elapsed).max(0.0);
        Some(Duration::from_secs_f64(remaining))
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Human-readable duration: seconds below a minute, minutes below an hour,
/// hours+minutes thereafter.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.0}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        let hours = (secs / 3600.0).floor();
        let minutes = (secs - hours * 3600.0) / 60.0;
        format!("{:.1}h {:.0}m", hours, minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn should_update_throttles_to_the_configured_interval() {
        let tracker = ProgressTracker::with_interval(Duration::from_millis(20));
        assert!(!tracker.should_update());
        sleep(Duration::from_millis(25));
        assert!(tracker.should_update());
    }

    #[test]
    fn estimated_remaining_is_none_at_zero_progress() {
        let tracker = ProgressTracker::new();
        assert!(tracker.estimated_remaining(0.0).is_none());
    }

    #[test]
    fn estimated_remaining_shrinks_as_progress_grows() {
        let tracker = ProgressTracker::with_interval(Duration::from_secs(5));
        sleep(Duration::from_millis(50));
        let at_25 = tracker.estimated_remaining(25.0).unwrap();
        let at_75 = tracker.estimated_remaining(75.0).unwrap();
        assert!(at_75 < at_25);
    }

    #[test]
    fn format_duration_switches_units_by_magnitude() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5m");
        assert_eq!(format_duration(Duration::from_secs(3660)), "1.0h 1m");
    }
}
