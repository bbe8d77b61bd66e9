use crate::{
    dates::{date_to_int, timestamp_range},
    storage::{CategoryAggregate, EndBoundary, Storage},
};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};

/// Transaction types that feed the daily earnings report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    View,
    Upload,
    Export,
}

impl Category {
    pub const TRACKED: [Category; 3] = [Category::View, Category::Upload, Category::Export];

    /// Code stored in `balance_logs.transaction_type`.
    pub fn code(self) -> &'static str {
        match self {
            Category::View => "VIEW",
            Category::Upload => "UPLOAD_PHOTO",
            Category::Export => "EXPORT_DRIVE",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::TRACKED
            .into_iter()
            .find(|category| category.code() == code)
    }
}

/// One row of `report_earning`. Earnings are positive for platform revenue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyEarningReport {
    pub id: Option<i64>,
    pub date: i64,
    pub total_req: i64,
    pub total_earn: i64,
    pub total_view: i64,
    pub total_view_earn: i64,
    pub total_upload: i64,
    pub total_upload_earn: i64,
    pub total_export: i64,
    pub total_export_earn: i64,
    pub created_date: Option<DateTime<Utc>>,
    pub updated_date: Option<DateTime<Utc>>,
}

impl DailyEarningReport {
    /// Unsaved row with every counter at zero.
    pub fn empty(date: i64) -> Self {
        Self {
            id: None,
            date,
            total_req: 0,
            total_earn: 0,
            total_view: 0,
            total_view_earn: 0,
            total_upload: 0,
            total_upload_earn: 0,
            total_export: 0,
            total_export_earn: 0,
            created_date: None,
            updated_date: None,
        }
    }

    pub fn apply(&mut self, aggregates: &[CategoryAggregate]) {
        for aggregate in aggregates {
            let (requests, earnings) = match aggregate.category {
                Category::View => (&mut self.total_view, &mut self.total_view_earn),
                Category::Upload => (&mut self.total_upload, &mut self.total_upload_earn),
                Category::Export => (&mut self.total_export, &mut self.total_export_earn),
            };
            *requests = aggregate.total_req;
            *earnings = aggregate.total_earn;
            self.total_req += aggregate.total_req;
            self.total_earn += aggregate.total_earn;
        }
    }

    /// `(requests, earnings)` for one category.
    pub fn totals_for(&self, category: Category) -> (i64, i64) {
        match category {
            Category::View => (self.total_view, self.total_view_earn),
            Category::Upload => (self.total_upload, self.total_upload_earn),
            Category::Export => (self.total_export, self.total_export_earn),
        }
    }
}

/// Recomputes the full-day totals for `report_date` and upserts them in one transaction.
/// Any failure rolls the transaction back before the error is returned.
pub async fn execute(
    storage: &Storage,
    report_date: NaiveDate,
    end_boundary: EndBoundary,
) -> Result<DailyEarningReport> {
    let (start, end) = timestamp_range(Some(report_date));
    let date_key = date_to_int(report_date);
    tracing::info!(
        date = %report_date,
        date_key,
        start,
        end,
        ?end_boundary,
        "gathering earning report"
    );

    let mut tx = storage.begin().await?;
    let outcome: Result<DailyEarningReport> = async {
        let aggregates = storage
            .query_aggregates(&mut tx, start, end, &Category::TRACKED, end_boundary)
            .await?;

        match storage.find_report_by_date(&mut tx, date_key).await? {
            Some(previous) => tracing::info!(
                date_key,
                previous_total_req = previous.total_req,
                previous_total_earn = previous.total_earn,
                "overwriting existing earning report"
            ),
            None => tracing::info!(date_key, "creating earning report"),
        }

        let mut report = DailyEarningReport::empty(date_key);
        report.apply(&aggregates);
        storage.save_report(&mut tx, &report, Utc::now()).await
    }
    .await;

    match outcome {
        Ok(saved) => {
            tx.commit()
                .await
                .with_context(|| format!("failed to commit earning report for {date_key}"))?;
            Ok(saved)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "failed to roll back earning report");
            }
            Err(err)
        }
    }
}
