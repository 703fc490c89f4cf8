//! CLI entry point: runs a backtest over a historical tick file and
//! prints the resulting equity/fill summary.

use anyhow::Context;
use clap::Parser;

use gridcore::backtest::run_backtest;
use gridcore::config::load_backtest_config;
use gridcore::exchange::BacktestAdapter;

/// Replays a tick file through the grid core and prints an equity/fill summary.
#[derive(Debug, Parser)]
#[command(name = "backtest", about = "Deterministic grid-engine backtest runner")]
struct Args {
    /// Path to a TOML configuration file (market params + grid config).
    #[arg(long)]
    config: String,

    /// Path to a newline-delimited JSON tick file, one `[timestamp_ms,
    /// qty, price]` triple per line.
    #[arg(long)]
    ticks: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = load_backtest_config(&args.config).context("loading backtest configuration")?;
    let ticks = BacktestAdapter::load_ticks(&args.ticks).context("loading tick file")?;

    tracing::info!(symbol = %cfg.market.symbol, ticks = ticks.len(), "starting backtest");

    let result = run_backtest(&ticks, &cfg).context("running backtest")?;

    let final_stats = result.stats.last();
    println!("fills: {}", result.fills.len());
    if let Some(snap) = final_stats {
        println!("final balance: {:.2}", snap.balance);
        println!("final equity:  {:.2}", snap.equity);
        println!("closest bankruptcy distance: {:.4}", snap.closest_bkr);
    } else {
        println!("no stats snapshots recorded (tick stream too short?)");
    }

    let total_fees: f64 = result.fills.iter().map(|f| f.fee).sum();
    let total_pnl: f64 = result.fills.iter().map(|f| f.pnl).sum();
    println!("total fees: {total_fees:.4}");
    println!("total realized pnl: {total_pnl:.4}");

    Ok(())
}
