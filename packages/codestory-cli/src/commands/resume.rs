//! `codestory resume`: an `ingestion_update` over a previously-ingested
//! repository. Filesystem and AST steps are free to short-circuit unchanged
//! inputs; the summarizer and docgrapher steps regenerate affected
//! subtrees, per the step contract's incremental mode.

use clap::Args;

use super::{execute_job, JobArgs};

#[derive(Args, Debug)]
pub struct ResumeArgs {
    #[command(flatten)]
    pub job: JobArgs,
}

pub async fn handle(args: ResumeArgs) -> anyhow::Result<()> {
    execute_job(args.job, true).await
}
