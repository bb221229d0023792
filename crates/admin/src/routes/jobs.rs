//! Background job status for the current shop.

use std::time::Duration;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Router,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Datelike, Utc};
use serde::Deserialize;
use storekeep_core::{JobId, JobKind, JobStatus};
use tracing::instrument;

use super::{NoticeQuery, PageContext, format_datetime};
use crate::db::{JobRepository, RepositoryError};
use crate::error::AppError;
use crate::filters;
use crate::middleware::ShopSession;
use crate::models::{Job, JobCount};
use crate::queue::ReportJob;
use crate::queue::jobs::month_bounds;
use crate::state::AppState;

const JOBS_PAGE_LIMIT: i64 = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(index))
        .route("/jobs/{id}/retry", post(retry))
        .route("/jobs/reports", post(queue_report))
}

/// Job row for the status table.
#[derive(Debug, Clone)]
pub struct JobView {
    pub id: i32,
    pub kind: String,
    pub status: String,
    pub status_class: &'static str,
    pub attempts: String,
    pub last_error: Option<String>,
    pub run_at: String,
    pub created_at: String,
    pub retryable: bool,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        let status_class = match job.status {
            JobStatus::Queued => "badge-info",
            JobStatus::Running => "badge-attention",
            JobStatus::Completed => "badge-success",
            JobStatus::Failed => "badge-warning",
            JobStatus::Dead => "badge-critical",
        };
        Self {
            id: job.id.as_i32(),
            kind: job.kind.to_string(),
            status: job.status.to_string(),
            status_class,
            attempts: format!("{}/{}", job.attempts, job.max_attempts),
            last_error: job.last_error.clone(),
            run_at: format_datetime(job.run_at),
            created_at: format_datetime(job.created_at),
            retryable: matches!(job.status, JobStatus::Failed | JobStatus::Dead),
        }
    }
}

/// Counts per status for one job kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindSummary {
    pub kind: String,
    /// One entry per `JobStatus::ALL`, in order.
    pub counts: Vec<i64>,
}

fn summarize(counts: &[JobCount]) -> Vec<KindSummary> {
    JobKind::ALL
        .iter()
        .map(|kind| KindSummary {
            kind: kind.to_string(),
            counts: JobStatus::ALL
                .iter()
                .map(|status| {
                    counts
                        .iter()
                        .filter(|c| c.kind == *kind && c.status == *status)
                        .map(|c| c.count)
                        .sum()
                })
                .collect(),
        })
        .collect()
}

/// Option of the report month picker.
#[derive(Debug, Clone)]
pub struct MonthOption {
    pub value: u32,
    pub name: &'static str,
    pub selected: bool,
}

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

fn month_options(current: u32) -> Vec<MonthOption> {
    (1..)
        .zip(MONTH_NAMES)
        .map(|(value, name)| MonthOption {
            value,
            name,
            selected: value == current,
        })
        .collect()
}

/// Jobs page template.
#[derive(Template, WebTemplate)]
#[template(path = "jobs/index.html")]
pub struct JobsTemplate {
    pub page: PageContext,
    pub statuses: Vec<String>,
    pub summary: Vec<KindSummary>,
    pub jobs: Vec<JobView>,
    pub current_year: i32,
    pub months: Vec<MonthOption>,
}

/// GET /jobs - Queue status for the shop.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn index(
    session: ShopSession,
    State(state): State<AppState>,
    Query(notice): Query<NoticeQuery>,
) -> Result<JobsTemplate, AppError> {
    let repo = JobRepository::new(state.pool());
    let jobs = repo.list_for_shop(session.shop.id, JOBS_PAGE_LIMIT).await?;
    let counts = repo.counts(Some(session.shop.id)).await?;
    let now = Utc::now();

    Ok(JobsTemplate {
        page: PageContext::new(&state, &session, "/jobs").with_notice(&notice),
        statuses: JobStatus::ALL.iter().map(ToString::to_string).collect(),
        summary: summarize(&counts),
        jobs: jobs.iter().map(JobView::from).collect(),
        current_year: now.year(),
        months: month_options(now.month()),
    })
}

/// POST /jobs/{id}/retry - Requeue a failed or dead job.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn retry(
    session: ShopSession,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, AppError> {
    match JobRepository::new(state.pool())
        .retry(JobId::new(id), Some(session.shop.id))
        .await
    {
        Ok(()) => {
            tracing::info!(job_id = id, "Job requeued");
            Ok(session.redirect("/jobs?success=job_retried").into_response())
        }
        Err(RepositoryError::NotFound) => Err(AppError::NotFound(format!("retryable job {id}"))),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportInput {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

impl ReportInput {
    fn to_job(&self) -> Result<ReportJob, AppError> {
        let mut job = ReportJob::for_month(Utc::now());
        if let Some(year) = self.year {
            job.year = year;
        }
        if let Some(month) = self.month {
            job.month = month;
        }
        if month_bounds(job.year, job.month).is_none() {
            return Err(AppError::BadRequest(format!(
                "Invalid report month {}-{}",
                job.year, job.month
            )));
        }
        Ok(job)
    }
}

/// POST /jobs/reports - Queue a billing report.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn queue_report(
    session: ShopSession,
    State(state): State<AppState>,
    Form(input): Form<ReportInput>,
) -> Result<Response, AppError> {
    let job = input.to_job()?;
    let queued = state
        .queue()
        .enqueue(Some(session.shop.id), &job, Duration::ZERO)
        .await?;
    tracing::info!(job_id = %queued.id, year = job.year, month = job.month, "Report queued");
    Ok(session.redirect("/jobs?success=report_queued").into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_fills_every_status() {
        let counts = vec![
            JobCount {
                kind: JobKind::Report,
                status: JobStatus::Dead,
                count: 2,
            },
            JobCount {
                kind: JobKind::Email,
                status: JobStatus::Completed,
                count: 7,
            },
        ];
        let summary = summarize(&counts);
        assert_eq!(summary.len(), JobKind::ALL.len());
        for row in &summary {
            assert_eq!(row.counts.len(), JobStatus::ALL.len());
        }
        let total: i64 = summary.iter().flat_map(|r| r.counts.iter()).sum();
        assert_eq!(total, 9);
    }

    #[test]
    fn test_month_options() {
        let months = month_options(3);
        assert_eq!(months.len(), 12);
        let selected: Vec<u32> = months.iter().filter(|m| m.selected).map(|m| m.value).collect();
        assert_eq!(selected, vec![3]);
        assert_eq!(months.last().unwrap().name, "December");
    }

    #[test]
    fn test_report_input_validation() {
        let job = ReportInput {
            year: Some(2026),
            month: Some(2),
        }
        .to_job()
        .unwrap();
        assert_eq!((job.year, job.month), (2026, 2));
        assert!(job.send_email);

        let bad = ReportInput {
            year: Some(2026),
            month: Some(13),
        };
        assert!(bad.to_job().is_err());
    }
}
