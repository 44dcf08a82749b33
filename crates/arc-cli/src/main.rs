#![deny(unsafe_code)]

use anyhow::{Context, Result};
use arc_config::{PartialLimits, ResearchInput};
use arc_core::{ExecutionMode, Strategy};
use arc_supervisor::{ResearchOutput, Supervisor};
use arc_workers::crm::CrmFixture;
use arc_workers::registry::{build_registry, ApiKeys, WorkerDependencies};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit code for runtime errors (clap exits with 2 on usage errors itself).
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "arc", version, about = "Agentic Research Core CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create and run a research Job synchronously, printing the final Job
    /// (results included on success, `error_message` on failure).
    RunSync {
        /// Street address.
        #[arg(long)]
        address: String,
        /// City, if known.
        #[arg(long)]
        city: Option<String>,
        /// State (full name or 2-letter code), if known.
        #[arg(long)]
        state: Option<String>,
        /// ZIP code, if known.
        #[arg(long)]
        zip: Option<String>,
        /// Assessor's Parcel Number, if known.
        #[arg(long)]
        apn: Option<String>,
        /// Investment framing.
        #[arg(long, value_enum, default_value_t = StrategyArg::Wholesale)]
        strategy: StrategyArg,
        /// Scheduling mode.
        #[arg(long, value_enum, default_value_t = ModeArg::Pipeline)]
        mode: ModeArg,
        /// Extra worker groups (orchestrated mode only). Repeatable:
        /// `--extra-agent subdivision_research --extra-agent extensive`.
        #[arg(long = "extra-agent")]
        extra_agents: Vec<String>,
        /// Require a fresh CRM/skip-trace/Zillow enrichment before running.
        #[arg(long)]
        require_enriched_data: bool,
        /// Override `limits.max_steps`.
        #[arg(long)]
        max_steps: Option<u32>,
        /// Override `limits.max_web_calls`.
        #[arg(long)]
        max_web_calls: Option<u32>,
    },

    /// Recompute enrichment status for a known property id, without
    /// running a Job.
    EnrichmentStatus {
        /// ResearchProperty id, as printed by a prior `run-sync`.
        #[arg(long)]
        property_id: u64,
        /// Freshness TTL override, in hours.
        #[arg(long)]
        max_age_hours: Option<u32>,
    },

    /// Print the JSON Schema for the `ResearchOutput` envelope.
    Schema,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Wholesale,
    Flip,
    Rental,
}

impl From<StrategyArg> for Strategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Wholesale => Self::Wholesale,
            StrategyArg::Flip => Self::Flip,
            StrategyArg::Rental => Self::Rental,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Pipeline,
    Orchestrated,
}

impl From<ModeArg> for ExecutionMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Pipeline => Self::Pipeline,
            ModeArg::Orchestrated => Self::Orchestrated,
        }
    }
}

/// Build a supervisor wired against fixture adapters (no live network
/// calls): a `StaticGeocoder`, an empty `StaticSearchProvider`, a `NullGis`,
/// a `NullNarrativeLlm`, and an empty in-memory CRM dataset. This is the
/// demonstrator's stand-in for a real deployment's configured adapters.
fn build_supervisor() -> Supervisor {
    let store = Arc::new(arc_store::Store::new());
    let crm = Arc::new(CrmFixture::new());
    let registry = build_registry(WorkerDependencies {
        geocoder: Arc::new(arc_adapters::StaticGeocoder::new()),
        search: Arc::new(arc_adapters::StaticSearchProvider::new(Vec::new())),
        gis: Arc::new(arc_adapters::NullGis),
        llm: Arc::new(arc_adapters::NullNarrativeLlm),
        crm: crm.clone(),
        api_keys: ApiKeys::default(),
    });
    Supervisor::new(store, registry, crm)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug { EnvFilter::new("arc=debug") } else { EnvFilter::new("arc=info") };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::RunSync {
            address,
            city,
            state,
            zip,
            apn,
            strategy,
            mode,
            extra_agents,
            require_enriched_data,
            max_steps,
            max_web_calls,
        } => cmd_run_sync(address, city, state, zip, apn, strategy, mode, extra_agents, require_enriched_data, max_steps, max_web_calls).await,
        Commands::EnrichmentStatus { property_id, max_age_hours } => cmd_enrichment_status(property_id, max_age_hours),
        Commands::Schema => cmd_schema(),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run_sync(
    address: String,
    city: Option<String>,
    state: Option<String>,
    zip: Option<String>,
    apn: Option<String>,
    strategy: StrategyArg,
    mode: ModeArg,
    extra_agents: Vec<String>,
    require_enriched_data: bool,
    max_steps: Option<u32>,
    max_web_calls: Option<u32>,
) -> Result<()> {
    let mut assumptions = BTreeMap::new();
    if require_enriched_data {
        assumptions.insert("require_enriched_data".to_string(), serde_json::json!(true));
    }
    if !extra_agents.is_empty() {
        assumptions.insert("extra_agents".to_string(), serde_json::json!(extra_agents));
    }

    let limits = (max_steps.is_some() || max_web_calls.is_some())
        .then(|| PartialLimits { max_steps, max_web_calls, ..Default::default() });

    let input = ResearchInput { address, city, state, zip, apn, strategy: strategy.into(), mode: mode.into(), assumptions, limits };

    let supervisor = build_supervisor();
    let job = supervisor.run_sync(&input).await.context("run_sync failed")?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}

fn cmd_enrichment_status(property_id: u64, max_age_hours: Option<u32>) -> Result<()> {
    let supervisor = build_supervisor();
    match supervisor.get_enrichment_status(property_id, max_age_hours) {
        Some(status) => println!("{}", serde_json::to_string_pretty(&status)?),
        None => println!("null"),
    }
    Ok(())
}

fn cmd_schema() -> Result<()> {
    let schema = schemars::schema_for!(ResearchOutput);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
