mod config;
mod errors;
mod loader;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;
use crate::loader::load_commodities;
use crate::pipeline::Pipeline;
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "agri-market-sync", about = "Mandi commodity price sync", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch every missing day of the rolling window, then prune older rows
    Sync {
        /// Window size in days (default: sync.window_days)
        #[arg(short, long)]
        days: Option<u32>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete rows older than the rolling window without fetching
    Prune {
        /// Window size in days (default: sync.window_days)
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Show database statistics
    Stats,

    /// List the tracked commodities
    Commodities,

    /// Show stored prices for a commodity in a district (LIKE patterns)
    Prices {
        commodity: String,
        district: String,
    },

    /// Apply schema migrations without syncing
    Migrate,
}

fn open_repo(config: &AppConfig) -> Result<Repository> {
    let repo = Repository::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(repo)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "agri_market_sync=info,warn",
        1 => "agri_market_sync=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Sync { days, json } => {
            let _t = utils::Timer::start("Sync");
            let days = days.unwrap_or(config.sync.window_days);
            let report = Pipeline::new(config).run(days).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            if !report.empty_dates().is_empty() {
                warn!(
                    "{} dates without data, retried next run: {:?}",
                    report.empty_dates().len(),
                    report.empty_dates()
                );
            }
            info!(
                "Done: {} dates, {} rows, {} failed fetches",
                report.dates_processed(),
                report.rows_added(),
                report.failed_fetches()
            );
        }

        Command::Prune { days } => {
            let days = days.unwrap_or(config.sync.window_days);
            let deleted = Pipeline::new(config).prune(days)?;
            println!("Deleted {} rows.", utils::fmt_number(deleted as i64));
        }

        Command::Stats => {
            let repo = open_repo(&config)?;
            let rows = repo.price_count()?;
            let commodities = repo.commodity_count()?;
            let (min, max) = repo.date_range().unwrap_or((None, None));
            let last_run = repo.last_scrape_run().ok().flatten();
            println!("─────────────────────────────────");
            println!("  Agri market prices — Database Stats");
            println!("─────────────────────────────────");
            println!("  Rows        : {}", utils::fmt_number(rows));
            println!("  Commodities : {}", utils::fmt_number(commodities));
            println!("  From        : {}", utils::fmt_date(min));
            println!("  To          : {}", utils::fmt_date(max));
            if let Some(latest) = max {
                println!("  Latest day  : {} rows", utils::fmt_number(repo.count_on(latest)?));
            }
            if let Some((id, status)) = last_run {
                println!("  Last run    : #{} ({})", id, status);
            }
            println!("─────────────────────────────────");
        }

        Command::Commodities => {
            let list = load_commodities(&config.sync.commodities_path)?;
            println!("{} commodities:", list.len());
            for c in &list {
                println!("  {:>5}  {}", c.code, c.head_code);
            }
        }

        Command::Prices { commodity, district } => {
            let repo = open_repo(&config)?;
            let rows = repo.market_prices(&commodity, &district)?;
            if rows.is_empty() {
                println!("No price data found.");
            } else {
                println!(
                    "{:<28} {:<12} {:>10} {:>10} {:>10}",
                    "Market", "Date", "Min", "Max", "Modal"
                );
                for r in &rows {
                    println!(
                        "{:<28} {:<12} {:>10} {:>10} {:>10}",
                        r.market,
                        r.price_date.to_string(),
                        r.min_price,
                        r.max_price,
                        r.modal_price
                    );
                }
                let modal: Vec<f64> = rows.iter().filter_map(|r| r.modal_price_value()).collect();
                if !modal.is_empty() {
                    let avg = modal.iter().sum::<f64>() / modal.len() as f64;
                    println!("Average modal price: {:.2} Rs./Quintal", avg);
                }
                let low = rows.iter().filter_map(|r| r.min_price_value()).reduce(f64::min);
                let high = rows.iter().filter_map(|r| r.max_price_value()).reduce(f64::max);
                if let (Some(low), Some(high)) = (low, high) {
                    println!("Range: {:.2} – {:.2} Rs./Quintal", low, high);
                }
            }
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
