//! ssq-backtest binary
//!
//! Loads configuration and a draw history, runs the walk-forward evaluation
//! and prints its summary. Optionally writes the JSON report, sweeps primary
//! window policies and forecasts the next issue.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use ssq_backtest::report::render_comparison;
use ssq_backtest::WalkForward;
use ssq_core::config::AppConfig;
use ssq_core::types::DrawHistory;
use ssq_ml::model::{MlpTrainer, ModelTrainer, UniformTrainer};

/// Walk-forward backtest for the 6-of-33 plus 1-of-16 draw
#[derive(Parser, Debug)]
#[command(name = "ssq-backtest", about = "Walk-forward draw backtest")]
struct Args {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Draw history CSV (optionally gzip-compressed).
    #[arg(short, long)]
    data: PathBuf,

    /// Write the full JSON report here.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit JSON log lines instead of pretty output.
    #[arg(long)]
    json: bool,

    /// Use the uniform baseline instead of the trained classifiers.
    #[arg(long)]
    baseline: bool,

    /// Evaluate every policy in `walk_forward.compare_windows`.
    #[arg(long)]
    compare_windows: bool,

    /// Also forecast the issue after the last draw.
    #[arg(long)]
    forecast: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(args.config)?;

    ssq_core::logging::init_tracing(args.json)?;

    let history = DrawHistory::load_csv(&args.data)?;
    tracing::info!(
        draws = history.len(),
        lookback = config.walk_forward.lookback,
        test_count = config.walk_forward.test_count,
        policy = ?config.selector.policy,
        baseline = args.baseline,
        "starting ssq-backtest"
    );

    let mlp = MlpTrainer::new(config.model.clone());
    let trainer: &dyn ModelTrainer = if args.baseline {
        &UniformTrainer
    } else {
        &mlp
    };
    let top_k = config.metrics.secondary_top_k;
    let compare = config.walk_forward.compare_windows.clone();
    let wf = WalkForward::new(&history, config, trainer)?;

    let report = wf.run()?;
    println!("{}", report.render());
    if let Some(path) = &args.output {
        report.write_json(path)?;
        println!("Report written to {}", path.display());
    }

    if args.compare_windows {
        if compare.is_empty() {
            tracing::warn!("walk_forward.compare_windows is empty, nothing to compare");
        }
        let rows = wf
            .compare_windows(&compare)
            .context("window comparison failed")?;
        println!("{}", render_comparison(&rows));
    }

    if args.forecast {
        let forecast = wf.forecast_next()?;
        println!("{}", forecast.render(top_k));
    }

    Ok(())
}
