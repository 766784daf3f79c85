//! visit-mileage - work visit mileage from an iCalendar feed
//!
//! Runs one report query and prints it as JSON on stdout. Logs go to stderr.
//!
//! Module structure:
//! - `domain/` - Core types (PlaceName, Itinerary, reports)
//! - `io/` - External interfaces (ics parsing, feed, OSRM, Nominatim)
//! - `services/` - Pipeline (extractor, resolver, distance engine, aggregator)
//! - `infra/` - Infrastructure (Config, places table, Metrics)

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use visit_mileage::infra::{Config, Metrics};
use visit_mileage::services::ReportService;

/// Round-trip mileage for work visits in a calendar feed
#[derive(Parser, Debug)]
#[command(name = "visit-mileage", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    query: Query,
}

#[derive(Subcommand, Debug)]
enum Query {
    /// Days of one ISO week, per year (default: current week)
    Week { week: Option<u32> },
    /// Weekly totals of one calendar month, per year
    Month { month: u32 },
    /// Monthly and yearly totals
    Year,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-event detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        feed_url = ?config.feed_url(),
        feed_path = ?config.feed_path(),
        home = %config.home_name(),
        routing_mode = ?config.routing_mode(),
        min_year = %config.min_year(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());
    let service = ReportService::from_config(&config, metrics.clone())?;

    let json = match args.query {
        Query::Week { week } => {
            let week = week.unwrap_or_else(ReportService::current_week);
            serde_json::to_string_pretty(&service.get_week_report(week).await)
        }
        Query::Month { month } => serde_json::to_string_pretty(&service.get_month_report(month).await),
        Query::Year => serde_json::to_string_pretty(&service.get_year_report().await),
    }
    .context("Failed to serialize report")?;

    println!("{}", json);

    if config.log_metrics_summary() {
        metrics.report().log();
    }

    Ok(())
}
