//! Household projection CLI
//!
//! Projects a scenario file month by month and writes the rows to CSV

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;

use household_projection::calendar::YearMonth;
use household_projection::model::{load_scenario, Horizon};
use household_projection::projection::{write_csv, ProjectionConfig, ProjectionSummary};
use household_projection::{Money, ScenarioRunner};

#[derive(Parser)]
#[command(
    name = "household-projection",
    version,
    about = "Project a household finance scenario month by month"
)]
struct Cli {
    /// Scenario definition (JSON)
    #[arg(short, long)]
    scenario: PathBuf,

    /// Engine configuration (JSON); defaults apply to missing fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Balance before the first projected month
    #[arg(long, default_value = "0")]
    opening_balance: Money,

    /// First month (YYYY-MM); overrides the scenario's horizon
    #[arg(long)]
    start: Option<YearMonth>,

    /// Number of months; overrides the scenario's horizon
    #[arg(long)]
    months: Option<u32>,

    /// CSV output path
    #[arg(short, long, default_value = "projection_output.csv")]
    output: PathBuf,
}

fn load_config(path: Option<&PathBuf>) -> Result<ProjectionConfig> {
    let Some(path) = path else {
        return Ok(ProjectionConfig::default());
    };
    let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("parsing config {}", path.display()))
}

fn cents(amount: Money) -> String {
    format!("{:.2}", amount.to_decimal())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let scenario = load_scenario(&cli.scenario)
        .with_context(|| format!("loading scenario {}", cli.scenario.display()))?;
    let config = load_config(cli.config.as_ref())?;
    let horizon = Horizon::new(
        cli.start.unwrap_or(scenario.horizon.start),
        cli.months.unwrap_or(scenario.horizon.months),
    );

    println!("Scenario: {} ({})", scenario.name, scenario.id);
    println!("  Components: {}", scenario.components.len());
    println!("  Life events: {}", scenario.events.len());
    println!("  Horizon: {} months from {}", horizon.months, horizon.start);
    println!("  Opening balance: {}", cli.opening_balance);
    println!();

    let runner = ScenarioRunner::new(config);
    let started = Instant::now();
    let rows = runner
        .compute(&scenario, &horizon, cli.opening_balance)
        .with_context(|| format!("projecting scenario '{}'", scenario.id))?;
    let elapsed = started.elapsed();

    println!(
        "{:>5} {:>8} {:>14} {:>14} {:>14} {:>16} {:>16}",
        "Month", "Period", "Income", "Expenses", "Net", "Balance", "Net worth"
    );
    println!("{}", "-".repeat(95));
    for row in rows.iter().take(24) {
        println!(
            "{:>5} {:>8} {:>14} {:>14} {:>14} {:>16} {:>16}",
            row.month_number,
            row.month.to_string(),
            cents(row.total_income),
            cents(row.total_expenses),
            cents(row.net_cash_flow),
            cents(row.running_balance),
            cents(row.net_worth),
        );
    }
    if rows.len() > 24 {
        println!("... ({} more months)", rows.len() - 24);
    }

    let file = File::create(&cli.output)
        .with_context(|| format!("creating {}", cli.output.display()))?;
    write_csv(&rows, BufWriter::new(file))?;
    println!("\nFull results written to: {}", cli.output.display());

    let summary = ProjectionSummary::from_rows(&rows)?;
    println!("\nSummary:");
    println!("  Total Months: {}", summary.total_months);
    println!("  Total Income: {}", summary.total_income);
    println!("  Total Expenses: {}", summary.total_expenses);
    println!("  Net Cash Flow: {}", summary.total_net_cash_flow);
    println!("  Final Balance: {}", summary.final_balance);
    println!("  Final Net Worth: {}", summary.final_net_worth);
    if let Some(month) = summary.lowest_balance_month {
        println!("  Lowest Balance: {} in {}", summary.lowest_balance, month);
    }
    println!("  Computed in {:.2?}", elapsed);

    Ok(())
}
