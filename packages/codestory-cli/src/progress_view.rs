//! Renders job progress the way the teacher's CLIs render long operations:
//! an `indicatif` spinner while the call is in flight, a summary table once
//! it lands.
//!
//! The orchestrator in this workspace drives a job to completion
//! synchronously inside `start_job`/`start_update_job` rather than handing
//! back a handle to a still-running worker, so there is no live
//! percentage to poll from here; the spinner reflects "this repo is being
//! ingested," not a numeric ETA.

use std::time::Duration;

use codestory_pipeline::{Job, Status};
use indicatif::{ProgressBar, ProgressStyle};

pub fn new_spinner(message: impl Into<String>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}").unwrap());
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Prints the final per-step and job summary once the job has reached a
/// terminal state.
pub fn print_summary(job: &Job) {
    println!();
    let mut steps: Vec<&String> = job.per_step.keys().collect();
    steps.sort();
    for name in steps {
        let state = &job.per_step[name];
        println!("  {name:<12} {:?}  {:.0}%  {}", state.status, state.progress, state.message);
    }
    match job.status {
        Status::Completed => println!("job {} completed", job.id),
        Status::Failed => {
            println!(
                "job {} failed{}",
                job.id,
                job.failed_step.as_deref().map(|s| format!(" at step '{s}'")).unwrap_or_default()
            );
            if let Some(err) = &job.error {
                println!("  {err}");
            }
        }
        other => println!("job {} ended with status {other:?}", job.id),
    }
}
