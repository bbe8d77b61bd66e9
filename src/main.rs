mod app;
mod cli;
mod config;
mod dates;
mod report;
mod storage;

use crate::{
    app::{App, RunOutcome},
    cli::Cli,
    config::{AppConfig, CONFIG_PATH_ENV},
};
use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::{env, path::PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    init_tracing(&config.logging.level);

    let report_date = cli
        .date
        .unwrap_or_else(|| dates::default_report_date(Utc::now().date_naive()));

    match App::new(config).run(report_date).await? {
        RunOutcome::Completed(report) => {
            tracing::debug!(id = ?report.id, date_key = report.date, "report committed");
        }
        RunOutcome::Failed => {
            tracing::warn!(date = %report_date, "no report written; exiting normally");
        }
    }
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
