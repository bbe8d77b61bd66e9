use chrono::NaiveDate;
use clap::Parser;

/// Command-line interface for the daily earnings report job.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Aggregate one day of balance logs into the earnings report",
    long_about = None
)]
pub struct Cli {
    /// Day to report on, as YYYY-MM-DD (defaults to yesterday, UTC).
    #[arg(value_name = "DATE", value_parser = parse_report_date)]
    pub date: Option<NaiveDate>,
}

fn parse_report_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| format!("expected a date like 2024-03-07: {err}"))
}
