pub mod doctor;
pub mod resume;
pub mod run;

use clap::Args;
use std::path::PathBuf;

/// Flags shared by `run` and `resume`: both start a job and drive it to
/// completion, differing only in whether the orchestrator runs steps in
/// incremental mode.
#[derive(Args, Debug)]
pub struct JobArgs {
    /// Path to the repository to ingest.
    pub repo_path: String,

    /// Steps to run; their transitive dependencies are pulled in
    /// automatically. Defaults to the full pipeline.
    #[arg(long, value_delimiter = ',')]
    pub steps: Vec<String>,

    /// Pipeline configuration YAML (see the sample in this crate's
    /// workspace docs). Falls back to a built-in default.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Chat model name passed to the summarizer and docgrapher steps.
    #[arg(long)]
    pub model: Option<String>,
}

impl JobArgs {
    pub fn steps_or_default(&self) -> Vec<String> {
        if self.steps.is_empty() {
            vec!["filesystem".into(), "ast".into(), "summarizer".into(), "docgrapher".into()]
        } else {
            self.steps.clone()
        }
    }
}

/// Shared by `run` and `resume`: build the orchestrator, start the job in
/// the requested mode, print the final summary, and translate a failed job
/// into a nonzero exit code.
pub async fn execute_job(args: JobArgs, incremental: bool) -> anyhow::Result<()> {
    let config = crate::context::load_config(&args.config)?;
    let built = crate::context::build(config, args.model.clone());
    let steps = args.steps_or_default();

    let verb = if incremental { "updating" } else { "ingesting" };
    let bar = crate::progress_view::new_spinner(format!("{verb} {}", args.repo_path));

    let job_id = if incremental {
        built.orchestrator.start_update_job(args.repo_path.clone(), steps, vec![]).await?
    } else {
        built.orchestrator.start_job(args.repo_path.clone(), steps, vec![]).await?
    };
    bar.finish_and_clear();

    let job = built
        .orchestrator
        .job(job_id)
        .ok_or_else(|| anyhow::anyhow!("job {job_id} vanished from the orchestrator"))?;
    crate::progress_view::print_summary(&job);

    if job.status != codestory_pipeline::Status::Completed {
        std::process::exit(1);
    }
    Ok(())
}
