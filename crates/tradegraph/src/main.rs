use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tradegraph::models::ApiKeys;
use tradegraph::{build_graph, load_config, save_result, ConfigOverrides};

#[derive(Parser, Debug)]
#[command(name = "tradegraph", about = "Multi-agent trading decision graph")]
struct Cli {
    /// Ticker symbol to analyze
    #[arg(short, long, required_unless_present = "check_env")]
    ticker: Option<String>,

    /// Trade date (YYYY-MM-DD)
    #[arg(short, long, required_unless_present = "check_env")]
    date: Option<String>,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use cached data instead of live sources
    #[arg(long)]
    offline: bool,

    /// Investment debate rounds
    #[arg(long)]
    debate_rounds: Option<u32>,

    /// Risk debate rounds
    #[arg(long)]
    risk_rounds: Option<u32>,

    /// Realized return of this decision; records reflections for the next run
    #[arg(long)]
    realized_return: Option<Decimal>,

    /// Include the full run trace in the output
    #[arg(long)]
    trace: bool,

    /// Also write the result under the configured results directory
    #[arg(long)]
    save: bool,

    /// Report which credentials are present and exit
    #[arg(long)]
    check_env: bool,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        max_debate_rounds: cli.debate_rounds,
        max_risk_discuss_rounds: cli.risk_rounds,
        online_tools: cli.offline.then_some(false),
    };
    let config = load_config(cli.config.as_deref(), &overrides)?;
    let keys = ApiKeys::from_env();

    if cli.check_env {
        for status in keys.report(config.llm.provider, config.run.online_tools) {
            let state = if status.present { "set" } else { "missing" };
            let need = if status.required { "required" } else { "optional" };
            println!("{:<20} {:<8} {:<9} {}", status.name, state, need, status.description);
        }
        return Ok(());
    }

    // clap enforces both unless --check-env
    let (Some(ticker), Some(date)) = (cli.ticker.as_deref(), cli.date.as_deref()) else {
        anyhow::bail!("--ticker and --date are required");
    };

    let graph = build_graph(config, &keys).context("Failed to build trading graph")?;

    let cancel = graph.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling run");
            cancel.cancel();
        }
    });

    let (trace, decision) = graph
        .propagate(ticker, date)
        .await
        .map_err(|e| anyhow::anyhow!("Run failed: {e}"))?;

    if cli.save {
        let path = save_result(graph.config(), &trace, &decision)?;
        info!(path = %path.display(), "Result saved");
    }

    if let Some(realized) = cli.realized_return {
        let recorded = graph
            .reflect_and_remember(realized)
            .map_err(|e| anyhow::anyhow!("Reflection failed: {e}"))?;
        info!(recorded, "Reflections stored");
    }

    // Output decision as JSON to stdout
    let body = if cli.trace {
        serde_json::json!({ "decision": decision, "trace": trace })
    } else {
        serde_json::to_value(&decision)?
    };
    let output = if cli.pretty {
        serde_json::to_string_pretty(&body)?
    } else {
        serde_json::to_string(&body)?
    };
    println!("{output}");

    Ok(())
}
