mod analytics;
mod config;
mod engine;
mod error;
mod fetcher;
mod loader;
mod models;
mod normalizer;
mod output;
mod pipeline;
mod utils;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;
use crate::fetcher::{covered_until, update_daily_source, YahooChartSource};
use crate::pipeline::{Pipeline, PipelineStats};

#[derive(Parser)]
#[command(name = "btracker", about = "Bitcoin 200-week moving average tracker", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Compute the moving average and write the processed, yearly, histogram and price analytics CSVs
    Run {
        /// Output directory (default: output.dir from config)
        #[arg(short, long, env = "BTRACKER_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Validate the price history and print a summary without writing files
    Stats,

    /// Fetch recent daily prices and merge them into the daily source file
    Update {
        /// Fetch this many days back instead of resuming from the last stored day
        #[arg(short, long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "btracker=info,warn",
        1 => "btracker=debug,info",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(env_filter)
        .init();

    let mut config = AppConfig::load()?;

    match cli.command {
        Command::Run { output_dir } => {
            let _t = utils::Timer::start("Pipeline run");
            if let Some(dir) = output_dir {
                config.output.dir = dir;
            }
            let stats = Pipeline::new(config).run()?;
            for file in &stats.files {
                info!("  → {}", file.display());
            }
        }

        Command::Stats => {
            let _t = utils::Timer::start("Stats");
            let window = config.analytics.window_days;
            let output = Pipeline::new(config).compute()?;
            let stats = PipelineStats::from_output(&output, Vec::new());
            if let Some(last) = stats.last_date {
                if let Err(e) = output.moving_averages.require(last) {
                    warn!("{}", e);
                }
            }
            print_stats(&stats, window);
        }

        Command::Update { days } => {
            let _t = utils::Timer::start("Daily update");
            let fetcher_cfg = &config.fetcher;
            let source = YahooChartSource::new(fetcher_cfg)?;
            let covered = covered_until(&config.sources, &fetcher_cfg.daily_source_path)?;
            let stats = update_daily_source(
                &source,
                &fetcher_cfg.daily_source_path,
                covered,
                Utc::now().date_naive(),
                days.unwrap_or(fetcher_cfg.lookback_days),
                days.is_some(),
            )
            .await?;
            info!(
                "Done: {} fetched, {} new days, {} refreshed, {} stored",
                stats.fetched, stats.added, stats.replaced, stats.total
            );
        }
    }

    Ok(())
}

fn print_stats(stats: &PipelineStats, window: usize) {
    let date = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or("—".into());
    let usd = |v: Option<rust_decimal::Decimal>| v.map(utils::fmt_usd).unwrap_or("—".into());

    println!("─────────────────────────────────");
    println!("  btracker — Price History");
    println!("─────────────────────────────────");
    println!("  Days        : {}", utils::fmt_number(stats.days));
    println!("  Filled days : {}", utils::fmt_number(stats.filled_days));
    println!("  From        : {}", date(stats.first_date));
    println!("  To          : {}", date(stats.last_date));
    println!("  Years       : {}", stats.years);
    println!("  {}-day MA days : {}", window, utils::fmt_number(stats.computable_days));
    println!("  Latest price: {}", usd(stats.latest_price));
    println!("  Latest MA   : {}", usd(stats.latest_moving_average));
    if let Some(change) = stats.latest_day_change {
        println!("  1-day change: {} ({}%)", utils::fmt_usd(change.amount), change.pct);
    }
    println!("─────────────────────────────────");
}
