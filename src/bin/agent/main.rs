mod dom;
mod evals;
mod hands;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pagehand::{Agent, AgentConfig, LlmProvider};

#[derive(Parser, Debug)]
#[command(name = "agent")]
#[command(about = "Run browser automation scenarios driven by a language model")]
#[command(version)]
struct Cli {
    /// Scenario to run. Runs every scenario when omitted.
    #[arg(short, long)]
    eval: Option<String>,

    /// List the available scenarios and exit
    #[arg(long)]
    list: bool,

    /// Launch Chrome headless when no running instance can be attached
    #[arg(long)]
    headless: bool,

    /// Model used for every call
    #[arg(short, long)]
    model: Option<String>,

    /// Directory for the persisted action and observation ledger
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Outline the DOM chunk the model is looking at
    #[arg(long)]
    debug_dom: bool,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,
}

struct Outcome {
    name: &'static str,
    success: bool,
    duration_secs: f64,
    error: Option<String>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.list {
        for name in evals::EVALS {
            println!("{name}");
        }
        return Ok(());
    }

    let selected: Vec<&'static str> = match &cli.eval {
        Some(name) => match evals::find(name) {
            Some(found) => vec![found],
            None => anyhow::bail!(
                "Unknown eval '{name}'. Available evals: {:?}",
                evals::EVALS
            ),
        },
        None => evals::EVALS.to_vec(),
    };

    info!(category = "agent", "Launching Chrome...");
    let headless = cli.headless;
    let driver = tokio::task::spawn_blocking(move || hands::ChromeDriver::connect_or_launch(headless))
        .await
        .map_err(|e| anyhow::anyhow!("Browser launch panicked: {e}"))??;

    let mut config = AgentConfig::default().with_debug_dom(cli.debug_dom);
    if let Some(model) = cli.model {
        config = config.with_default_model(model);
    }
    if let Some(dir) = cli.cache_dir {
        config = config.with_ledger_dir(dir);
    }
    let agent = Agent::new(Arc::new(driver), LlmProvider::from_env(), config)?;

    info!(category = "agent", "Starting evaluations...");
    let total_start = Instant::now();
    let mut outcomes = Vec::with_capacity(selected.len());
    for name in selected {
        info!(category = "agent", "Running {name} eval...");
        let start = Instant::now();
        let result = evals::run(name, &agent).await;
        let duration_secs = start.elapsed().as_secs_f64();
        let outcome = match result {
            Ok(success) => Outcome {
                name,
                success,
                duration_secs,
                error: None,
            },
            Err(e) => {
                error!(category = "agent", "{name} eval failed with error: {e:#}");
                Outcome {
                    name,
                    success: false,
                    duration_secs,
                    error: Some(format!("{e:#}")),
                }
            }
        };
        info!(
            category = "agent",
            "{name} eval completed in {duration_secs:.2}s. Status: {}",
            if outcome.success { "Passed" } else { "Failed" }
        );
        outcomes.push(outcome);
    }

    print_summary(&outcomes, total_start.elapsed().as_secs_f64());
    if outcomes.iter().all(|o| o.success) {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn print_summary(outcomes: &[Outcome], total_secs: f64) {
    println!("{}", "=".repeat(50));
    println!("Evaluation Summary");
    println!("{}", "=".repeat(50));
    for outcome in outcomes {
        let status = if outcome.success { "PASS" } else { "FAIL" };
        println!("{:<16} {status}  {:>8.2}s", outcome.name, outcome.duration_secs);
        if let Some(error) = &outcome.error {
            println!("    error: {error}");
        }
    }
    let passed = outcomes.iter().filter(|o| o.success).count();
    println!("{}", "-".repeat(50));
    println!(
        "{passed}/{} passed in {total_secs:.2}s",
        outcomes.len()
    );
}
