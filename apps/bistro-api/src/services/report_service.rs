//! # Report Service
//!
//! Reports cover whole trading days in restaurant local time. A period of
//! `from = 2026-03-01, to = 2026-03-01` is one day, midnight to midnight
//! at UTC+05:30.

use chrono::{DateTime, Days, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use bistro_core::report::{
    expense_summary, hourly_histogram, profit_and_loss, sales_summary, top_items, vat_report,
    ExpenseSummary, HourBucket, ProfitAndLoss, SalesSummary, TopItem, TopItemsBy, VatReport,
    SRI_LANKA_OFFSET_MINUTES,
};
use bistro_db::business_date;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Longest period a single report may span.
pub const MAX_REPORT_DAYS: u64 = 366;

pub const DEFAULT_TOP_ITEMS: usize = 10;

/// Inclusive business-date range; both ends default to today.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PeriodQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopItemsQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub by: TopItemsBy,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(skip)]
    pub start: DateTime<Utc>,
    /// Exclusive.
    #[serde(skip)]
    pub end: DateTime<Utc>,
}

impl PeriodQuery {
    pub fn resolve(&self, now: DateTime<Utc>) -> ApiResult<Period> {
        let today = business_date(now);
        let from = self.from.unwrap_or(today);
        let to = self.to.unwrap_or(from.max(today));

        if from > to {
            return Err(ApiError::validation("from must not be after to"));
        }
        if (to - from).num_days() as u64 >= MAX_REPORT_DAYS {
            return Err(ApiError::validation(format!(
                "period must not exceed {MAX_REPORT_DAYS} days"
            )));
        }

        let end_date = to
            .checked_add_days(Days::new(1))
            .ok_or_else(|| ApiError::validation("to is out of range"))?;
        Ok(Period {
            from,
            to,
            start: local_midnight(from)?,
            end: local_midnight(end_date)?,
        })
    }
}

fn local_midnight(date: NaiveDate) -> ApiResult<DateTime<Utc>> {
    let tz = FixedOffset::east_opt(SRI_LANKA_OFFSET_MINUTES * 60)
        .ok_or_else(|| ApiError::internal("invalid business time zone"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ApiError::internal("invalid midnight"))?;
    tz.from_local_datetime(&midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| ApiError::internal("ambiguous local midnight"))
}

#[derive(Debug, Clone, Serialize)]
pub struct Report<T> {
    pub period: Period,
    #[serde(flatten)]
    pub data: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopItemsReport {
    pub by: TopItemsBy,
    pub items: Vec<TopItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HourlyReport {
    pub hours: Vec<HourBucket>,
}

pub struct ReportService<'a> {
    state: &'a AppState,
}

impl<'a> ReportService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        ReportService { state }
    }

    pub async fn sales_summary(&self, query: PeriodQuery) -> ApiResult<Report<SalesSummary>> {
        let period = query.resolve(Utc::now())?;
        debug!(from = %period.from, to = %period.to, "Sales summary");

        let sales = self.state.db.sales().in_range(period.start, period.end).await?;
        let payments = self
            .state
            .db
            .payments()
            .transactions_in_range(period.start, period.end)
            .await?;

        Ok(Report {
            period,
            data: sales_summary(&sales, &payments),
        })
    }

    pub async fn top_items(&self, query: TopItemsQuery) -> ApiResult<Report<TopItemsReport>> {
        let period = PeriodQuery {
            from: query.from,
            to: query.to,
        }
        .resolve(Utc::now())?;
        let limit = query.limit.unwrap_or(DEFAULT_TOP_ITEMS).clamp(1, 100);

        let items = self
            .state
            .db
            .sales()
            .completed_items_in_range(period.start, period.end)
            .await?;

        Ok(Report {
            period,
            data: TopItemsReport {
                by: query.by,
                items: top_items(&items, query.by, limit),
            },
        })
    }

    pub async fn hourly(&self, query: PeriodQuery) -> ApiResult<Report<HourlyReport>> {
        let period = query.resolve(Utc::now())?;
        let sales = self.state.db.sales().in_range(period.start, period.end).await?;

        Ok(Report {
            period,
            data: HourlyReport {
                hours: hourly_histogram(&sales, SRI_LANKA_OFFSET_MINUTES),
            },
        })
    }

    pub async fn expenses(&self, query: PeriodQuery) -> ApiResult<Report<ExpenseSummary>> {
        let period = query.resolve(Utc::now())?;
        let expenses = self.state.db.expenses().in_range(period.from, period.to).await?;

        Ok(Report {
            period,
            data: expense_summary(&expenses),
        })
    }

    pub async fn profit_and_loss(&self, query: PeriodQuery) -> ApiResult<Report<ProfitAndLoss>> {
        let period = query.resolve(Utc::now())?;
        let db = &self.state.db;

        let sales = db.sales().in_range(period.start, period.end).await?;
        let items = db
            .sales()
            .completed_items_in_range(period.start, period.end)
            .await?;
        let expenses = db.expenses().in_range(period.from, period.to).await?;

        Ok(Report {
            period,
            data: profit_and_loss(&sales, &items, &expenses),
        })
    }

    pub async fn vat(&self, query: PeriodQuery) -> ApiResult<Report<VatReport>> {
        let period = query.resolve(Utc::now())?;
        let sales = self.state.db.sales().in_range(period.start, period.end).await?;

        Ok(Report {
            period,
            data: vat_report(&sales),
        })
    }
}
