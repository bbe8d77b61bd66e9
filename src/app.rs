use crate::{
    config::AppConfig,
    report::{self, Category, DailyEarningReport},
    storage::{EndBoundary, Storage},
};
use anyhow::Result;
use chrono::NaiveDate;
use std::time::Instant;

/// How a run ended when it did not propagate an error.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(DailyEarningReport),
    /// The error was logged and the transaction rolled back.
    Failed,
}

/// High-level application orchestrator.
pub struct App {
    config: AppConfig,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Produces the report for one day. Failures are logged and, unless
    /// `report.strict_exit` is set, reported as [`RunOutcome::Failed`].
    pub async fn run(&self, report_date: NaiveDate) -> Result<RunOutcome> {
        let started = Instant::now();
        let result = self.generate(report_date).await;
        let elapsed = started.elapsed();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(report) => {
                let (view, view_earn) = report.totals_for(Category::View);
                let (upload, upload_earn) = report.totals_for(Category::Upload);
                let (export, export_earn) = report.totals_for(Category::Export);
                tracing::info!(
                    date_key = report.date,
                    total_req = report.total_req,
                    total_earn = report.total_earn,
                    view,
                    view_earn,
                    upload,
                    upload_earn,
                    export,
                    export_earn,
                    "earning report saved"
                );
                tracing::info!(elapsed_ms, "took {elapsed:?}");
                Ok(RunOutcome::Completed(report))
            }
            Err(err) => {
                tracing::error!(date = %report_date, error = ?err, "earning report failed");
                tracing::info!(elapsed_ms, "took {elapsed:?}");
                if self.config.report.strict_exit {
                    Err(err)
                } else {
                    Ok(RunOutcome::Failed)
                }
            }
        }
    }

    async fn generate(&self, report_date: NaiveDate) -> Result<DailyEarningReport> {
        let storage = Storage::connect(&self.config.database).await?;
        storage.ensure_schema().await?;
        let end_boundary = EndBoundary::from_flag(self.config.report.include_end_boundary);
        report::execute(&storage, report_date, end_boundary).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::DatabaseConfig,
        dates::timestamp_range,
        storage::test_support::{
            NewLedgerEntry, create_ledger, insert_ledger_entry, report_rows, uri_for,
        },
    };
    use tempfile::NamedTempFile;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    fn config_for(uri: String, strict_exit: bool) -> AppConfig {
        let mut config = AppConfig {
            database: DatabaseConfig {
                uri,
                ..DatabaseConfig::default()
            },
            ..AppConfig::default()
        };
        config.report.strict_exit = strict_exit;
        config
    }

    fn unreachable_uri() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let uri = format!(
            "sqlite://{}",
            dir.path().join("missing").join("nested").join("report.db").display()
        );
        (dir, uri)
    }

    #[tokio::test]
    async fn run_completes_against_seeded_ledger() {
        let db_file = NamedTempFile::new().unwrap();
        let config = config_for(uri_for(&db_file), false);

        let storage = Storage::connect(&config.database).await.unwrap();
        create_ledger(&storage).await;
        let (start, _) = timestamp_range(Some(day()));
        insert_ledger_entry(
            &storage,
            &NewLedgerEntry {
                user_id: 11,
                transaction_timestamp: start + 60_000_000,
                balance: Some(-12),
                transaction_type: Some("VIEW".to_string()),
                source_id: Some("video-3".to_string()),
            },
        )
        .await;

        let report = match App::new(config).run(day()).await.unwrap() {
            RunOutcome::Completed(report) => report,
            other => panic!("expected a completed run, got {other:?}"),
        };
        assert_eq!(report.totals_for(Category::View), (1, 12));
        assert_eq!(report.total_earn, 12);
    }

    #[tokio::test]
    async fn failure_is_swallowed_by_default() {
        let (_dir, uri) = unreachable_uri();
        let outcome = App::new(config_for(uri, false)).run(day()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed));
    }

    #[tokio::test]
    async fn failure_propagates_in_strict_mode() {
        let (_dir, uri) = unreachable_uri();
        let err = App::new(config_for(uri, true)).run(day()).await.unwrap_err();
        assert!(err.to_string().contains("failed to connect"));
    }

    #[tokio::test]
    async fn missing_database_file_fails_without_creating_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typo.db");
        let config = config_for(format!("sqlite://{}", path.display()), false);

        let outcome = App::new(config).run(day()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn database_without_ledger_fails_and_writes_no_report() {
        let db_file = NamedTempFile::new().unwrap();
        let config = config_for(uri_for(&db_file), false);

        let outcome = App::new(config.clone()).run(day()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed));

        // Once the ledger exists the report table appears, still without a row for the failed run.
        let storage = Storage::connect(&config.database).await.unwrap();
        create_ledger(&storage).await;
        storage.ensure_schema().await.unwrap();
        assert_eq!(report_rows(&storage).await, 0);
    }
}
