//! `codestory doctor`: a local health probe over the adapters this crate
//! wires up, grounded on the original connector's `check_connection` +
//! `verify_schema` introspection (spec's graph store adapter extension).

use clap::Args;
use codestory_llm::ChatModel;

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Create any missing schema elements before verifying (otherwise
    /// doctor only reports, never mutates).
    #[arg(long)]
    pub init_schema: bool,

    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
}

pub async fn handle(args: DoctorArgs) -> anyhow::Result<()> {
    let config = crate::context::load_config(&args.config)?;
    let built = crate::context::build(config, None);

    println!("graph store:");
    let reachable = built.graph.ping().await;
    println!("  ping ......... {}", if reachable { "ok" } else { "FAIL" });

    if args.init_schema {
        built.graph.initialize_schema(false).await?;
        println!("  schema initialized");
    }

    let elements = built.graph.verify_schema().await?;
    let missing = elements.iter().filter(|(_, present)| !present).count();
    for (name, present) in &elements {
        println!("  schema: {name:<28} {}", if *present { "present" } else { "MISSING" });
    }

    println!("chat model:");
    let mock = codestory_llm::MockChatModel::new();
    println!("  health ....... {}", if mock.check_health().await { "ok" } else { "FAIL" });

    println!();
    if !reachable || missing > 0 {
        anyhow::bail!("doctor found {} problem(s)", (!reachable as usize) + missing);
    }
    println!("all checks passed");
    Ok(())
}
