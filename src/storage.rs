use crate::{
    config::DatabaseConfig,
    report::{Category, DailyEarningReport},
};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use sqlx::{
    Row, Sqlite, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
};
use std::{str::FromStr, sync::Arc, time::Duration};

const REPORT_COLUMNS: &str = r#"
    id, date, total_req, total_earn,
    total_view, total_view_earn,
    total_upload, total_upload_earn,
    total_export, total_export_earn,
    created_date, updated_date
"#;

/// Which side of the day's `end` bound is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndBoundary {
    /// `transaction_timestamp <= end`; an entry at the next midnight lands in both days.
    Inclusive,
    /// `transaction_timestamp < end`.
    Exclusive,
}

impl EndBoundary {
    pub fn from_flag(include_end: bool) -> Self {
        if include_end {
            Self::Inclusive
        } else {
            Self::Exclusive
        }
    }

    fn operator(self) -> &'static str {
        match self {
            Self::Inclusive => "<=",
            Self::Exclusive => "<",
        }
    }
}

/// Request count and sign-flipped balance sum for one category over a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryAggregate {
    pub category: Category,
    pub total_req: i64,
    pub total_earn: i64,
}

#[derive(Clone)]
pub struct Storage {
    pool: Arc<SqlitePool>,
}

impl Storage {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        // The ledger lives in this database; a missing file means a wrong uri.
        let options = SqliteConnectOptions::from_str(&config.uri)
            .with_context(|| "invalid database uri")?
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .max_lifetime(recycle_interval(config.pool_recycle_secs))
            .connect_with(options)
            .await
            .with_context(|| "failed to connect to report database")?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Verifies the ledger is present and creates the report table if needed.
    pub async fn ensure_schema(&self) -> Result<()> {
        if !self.table_exists("balance_logs").await? {
            bail!("ledger table balance_logs not found; check the database uri");
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS report_earning (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date INTEGER NOT NULL,
                total_req INTEGER NOT NULL DEFAULT 0,
                total_earn INTEGER NOT NULL DEFAULT 0,
                total_view INTEGER NOT NULL DEFAULT 0,
                total_view_earn INTEGER NOT NULL DEFAULT 0,
                total_upload INTEGER NOT NULL DEFAULT 0,
                total_upload_earn INTEGER NOT NULL DEFAULT 0,
                total_export INTEGER NOT NULL DEFAULT 0,
                total_export_earn INTEGER NOT NULL DEFAULT 0,
                created_date TEXT,
                updated_date TEXT
            );
            "#,
        )
        .execute(&*self.pool)
        .await
        .with_context(|| "failed to ensure report_earning schema")?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_report_earning_date
            ON report_earning(date);
            "#,
        )
        .execute(&*self.pool)
        .await
        .with_context(|| "failed to ensure report_earning date index")?;

        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .with_context(|| "failed to open report transaction")
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let row: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&*self.pool)
        .await
        .with_context(|| format!("failed to check table {name}"))?;
        Ok(row.is_some())
    }

    /// Groups tracked ledger rows in `[start, end]` (or `[start, end)`) by category.
    pub async fn query_aggregates(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        start: i64,
        end: i64,
        categories: &[Category],
        end_boundary: EndBoundary,
    ) -> Result<Vec<CategoryAggregate>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; categories.len()].join(", ");
        let query = format!(
            r#"
            SELECT
                transaction_type,
                COUNT(id) AS total_req,
                CAST(-COALESCE(SUM(balance), 0) AS INTEGER) AS total_earn
            FROM balance_logs
            WHERE transaction_type IN ({placeholders})
              AND transaction_timestamp >= ?
              AND transaction_timestamp {op} ?
            GROUP BY transaction_type
            ORDER BY transaction_type ASC
            "#,
            op = end_boundary.operator(),
        );

        let mut statement = sqlx::query(&query);
        for category in categories {
            statement = statement.bind(category.code());
        }
        let rows = statement
            .bind(start)
            .bind(end)
            .fetch_all(&mut **tx)
            .await
            .with_context(|| "failed to aggregate balance logs")?;

        let mut aggregates = Vec::with_capacity(rows.len());
        for row in rows {
            let code: String = row.try_get("transaction_type")?;
            let Some(category) = Category::from_code(&code) else {
                tracing::warn!(code = %code, "skipping aggregate for untracked category");
                continue;
            };
            aggregates.push(CategoryAggregate {
                category,
                total_req: row.try_get::<i64, _>("total_req")?,
                total_earn: row.try_get::<i64, _>("total_earn")?,
            });
        }
        Ok(aggregates)
    }

    pub async fn find_report_by_date(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        date: i64,
    ) -> Result<Option<DailyEarningReport>> {
        let query = format!("SELECT {REPORT_COLUMNS} FROM report_earning WHERE date = ?");
        let row = sqlx::query(&query)
            .bind(date)
            .fetch_optional(&mut **tx)
            .await
            .with_context(|| format!("failed to load earning report for {date}"))?;

        row.as_ref().map(report_from_row).transpose()
    }

    /// Inserts the day's row, or overwrites every counter of an existing one.
    /// `created_date` survives an overwrite; `updated_date` is only set by one.
    pub async fn save_report(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        report: &DailyEarningReport,
        now: DateTime<Utc>,
    ) -> Result<DailyEarningReport> {
        let query = format!(
            r#"
            INSERT INTO report_earning (
                date, total_req, total_earn,
                total_view, total_view_earn,
                total_upload, total_upload_earn,
                total_export, total_export_earn,
                created_date, updated_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL)
            ON CONFLICT(date) DO UPDATE SET
                total_req = excluded.total_req,
                total_earn = excluded.total_earn,
                total_view = excluded.total_view,
                total_view_earn = excluded.total_view_earn,
                total_upload = excluded.total_upload,
                total_upload_earn = excluded.total_upload_earn,
                total_export = excluded.total_export,
                total_export_earn = excluded.total_export_earn,
                created_date = COALESCE(report_earning.created_date, excluded.created_date),
                updated_date = ?10
            RETURNING {REPORT_COLUMNS}
            "#
        );

        let row = sqlx::query(&query)
            .bind(report.date)
            .bind(report.total_req)
            .bind(report.total_earn)
            .bind(report.total_view)
            .bind(report.total_view_earn)
            .bind(report.total_upload)
            .bind(report.total_upload_earn)
            .bind(report.total_export)
            .bind(report.total_export_earn)
            .bind(now.to_rfc3339())
            .fetch_one(&mut **tx)
            .await
            .with_context(|| format!("failed to upsert earning report for {}", report.date))?;

        report_from_row(&row)
    }
}

fn report_from_row(row: &SqliteRow) -> Result<DailyEarningReport> {
    Ok(DailyEarningReport {
        id: Some(row.try_get::<i64, _>("id")?),
        date: row.try_get::<i64, _>("date")?,
        total_req: row.try_get::<i64, _>("total_req")?,
        total_earn: row.try_get::<i64, _>("total_earn")?,
        total_view: row.try_get::<i64, _>("total_view")?,
        total_view_earn: row.try_get::<i64, _>("total_view_earn")?,
        total_upload: row.try_get::<i64, _>("total_upload")?,
        total_upload_earn: row.try_get::<i64, _>("total_upload_earn")?,
        total_export: row.try_get::<i64, _>("total_export")?,
        total_export_earn: row.try_get::<i64, _>("total_export_earn")?,
        created_date: parse_timestamp(row, "created_date")?,
        updated_date: parse_timestamp(row, "updated_date")?,
    })
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = row.try_get::<Option<String>, _>(column)? else {
        return Ok(None);
    };
    let parsed = DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid {column} in report_earning: {raw}"))?;
    Ok(Some(parsed))
}

/// Pool `max_lifetime`; zero disables recycling.
fn recycle_interval(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Ledger fixtures. The job itself only reads `balance_logs`.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::NamedTempFile;

    #[derive(Debug, Clone)]
    pub(crate) struct NewLedgerEntry {
        pub user_id: i64,
        pub transaction_timestamp: i64,
        pub balance: Option<i64>,
        pub transaction_type: Option<String>,
        pub source_id: Option<String>,
    }

    pub(crate) fn uri_for(db_file: &NamedTempFile) -> String {
        format!("sqlite://{}", db_file.path().display())
    }

    /// Stands in for the producing system's ledger table.
    pub(crate) async fn create_ledger(storage: &Storage) {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS balance_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                transaction_timestamp INTEGER NOT NULL,
                balance INTEGER DEFAULT 0,
                transaction_type TEXT DEFAULT 'VIEW',
                source_id TEXT
            );
            "#,
        )
        .execute(&*storage.pool)
        .await
        .unwrap();
    }

    /// Ledger plus report schema on an existing temp file.
    pub(crate) async fn ledger_storage(db_file: &NamedTempFile) -> Storage {
        let config = DatabaseConfig {
            uri: uri_for(db_file),
            ..DatabaseConfig::default()
        };
        let storage = Storage::connect(&config).await.unwrap();
        create_ledger(&storage).await;
        storage.ensure_schema().await.unwrap();
        storage
    }

    pub(crate) async fn insert_ledger_entry(storage: &Storage, entry: &NewLedgerEntry) -> i64 {
        sqlx::query(
            r#"
            INSERT INTO balance_logs (
                user_id, transaction_timestamp, balance, transaction_type, source_id
            ) VALUES (?, ?, COALESCE(?, 0), COALESCE(?, 'VIEW'), ?)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.transaction_timestamp)
        .bind(entry.balance)
        .bind(entry.transaction_type.as_deref())
        .bind(entry.source_id.as_deref())
        .execute(&*storage.pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    pub(crate) async fn seed(storage: &Storage, timestamp: i64, code: &str, balance: i64) {
        insert_ledger_entry(
            storage,
            &NewLedgerEntry {
                user_id: 7,
                transaction_timestamp: timestamp,
                balance: Some(balance),
                transaction_type: Some(code.to_string()),
                source_id: None,
            },
        )
        .await;
    }

    pub(crate) async fn report_rows(storage: &Storage) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM report_earning")
            .fetch_one(&*storage.pool)
            .await
            .unwrap()
    }
}
