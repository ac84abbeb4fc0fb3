//! `codestory run`: a full `ingestion_run` over a repository.

use clap::Args;

use super::{execute_job, JobArgs};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub job: JobArgs,
}

pub async fn handle(args: RunArgs) -> anyhow::Result<()> {
    execute_job(args.job, false).await
}
