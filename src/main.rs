//! Storage Proposal CLI
//!
//! Runs a guided proposal for a device graph described in a YAML or JSON
//! file and prints the devices it would create.
//!
//! ```text
//! storage-proposal --devicegraph graph.yaml --config proposal.yaml --target min --format json
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storage_proposal::proposal::RequireEspValidator;
use storage_proposal::{
    Devicegraph, Error, GuidedProposal, Proposal, ProposalConfig, ProposalMetrics, Result, SizingTarget,
    TargetLadder,
};

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
    Text,
}

/// Storage Proposal - guided partitioning of free disk space
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Device graph to propose on (YAML or JSON)
    #[arg(long, env = "PROPOSAL_DEVICEGRAPH")]
    devicegraph: Option<PathBuf>,

    /// Proposal configuration (.yaml, .yml or .json)
    #[arg(long, env = "PROPOSAL_CONFIG")]
    config: Option<PathBuf>,

    /// Only try this sizing target (desired, min)
    #[arg(long, env = "PROPOSAL_TARGET")]
    target: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Require an EFI system partition on the GPT disks used
    #[arg(long, env = "PROPOSAL_REQUIRE_ESP")]
    require_esp: bool,

    /// Print proposal metrics in the Prometheus text format
    #[arg(long)]
    metrics: bool,

    /// Print the JSON schema of the configuration file and exit
    #[arg(long)]
    print_schema: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    if args.print_schema {
        println!("{}", ProposalConfig::json_schema()?);
        return Ok(());
    }

    info!("Starting storage proposal");
    info!("  Version: {}", storage_proposal::VERSION);

    let graph_path = args
        .devicegraph
        .as_ref()
        .ok_or_else(|| Error::Configuration("--devicegraph is required".into()))?;
    let config_path = args
        .config
        .as_ref()
        .ok_or_else(|| Error::Configuration("--config is required".into()))?;

    let graph = Devicegraph::from_yaml(&tokio::fs::read_to_string(graph_path).await?)?;
    let mut config = ProposalConfig::load(config_path).await?;
    if let Some(target) = &args.target {
        let target: SizingTarget = target.parse()?;
        config.ladder = TargetLadder::single(target);
    }
    info!("  Disks: {}", config.settings.candidate_disks.join(", "));
    info!("  Volumes: {}", config.settings.volumes.len());

    let metrics = Arc::new(ProposalMetrics::new()?);
    let mut proposal = GuidedProposal::from_config(&config)?.with_metrics(metrics.clone());
    if args.require_esp {
        proposal = proposal.with_boot_validator(Arc::new(RequireEspValidator));
    }

    // The search is CPU bound
    let result = tokio::task::spawn_blocking(move || proposal.propose(&graph))
        .await
        .map_err(|e| Error::Proposal(format!("proposal task failed: {}", e)))?;

    let outcome = match result {
        Ok(proposal) => print_proposal(&proposal, args.format),
        Err(e) => {
            error!(error = %e, "proposal failed");
            Err(e)
        }
    };

    if args.metrics {
        print!("{}", metrics.gather_text()?);
    }
    outcome
}

// =============================================================================
// Output
// =============================================================================

fn print_proposal(proposal: &Proposal, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(proposal)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(proposal)?),
        OutputFormat::Text => {
            println!(
                "Proposal for target {} ({} regions used, {} left unused)",
                proposal.target,
                proposal.distribution.regions_used(),
                proposal.distribution.wasted()
            );
            for device in &proposal.created {
                println!(
                    "  {:<16} {:<28} {:>12}  {}",
                    device.kind.to_string(),
                    device.name,
                    device.size.to_string(),
                    device.mount_point.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // stdout carries the proposal itself
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
