//! Dashboard route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Router,
    extract::{Query, State},
    routing::get,
};
use storekeep_core::JobStatus;
use tracing::instrument;

use super::billing::{SubscriptionView, UsageView};
use super::files::FileView;
use super::{NoticeQuery, PageContext};
use crate::db::{FileRepository, JobRepository};
use crate::error::AppError;
use crate::filters;
use crate::middleware::ShopSession;
use crate::models::JobCount;
use crate::services::BillingService;
use crate::state::AppState;

const RECENT_FILES: i64 = 5;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

/// Job totals shown as dashboard tiles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobTotals {
    pub pending: i64,
    pub completed: i64,
    pub failed: i64,
}

impl JobTotals {
    fn from_counts(counts: &[JobCount]) -> Self {
        counts.iter().fold(Self::default(), |mut totals, c| {
            match c.status {
                JobStatus::Queued | JobStatus::Running => totals.pending += c.count,
                JobStatus::Completed => totals.completed += c.count,
                JobStatus::Failed | JobStatus::Dead => totals.failed += c.count,
            }
            totals
        })
    }
}

/// Dashboard page template.
#[derive(Template, WebTemplate)]
#[template(path = "dashboard/index.html")]
pub struct DashboardTemplate {
    pub page: PageContext,
    pub subscription: Option<SubscriptionView>,
    pub usage: Option<UsageView>,
    pub jobs: JobTotals,
    pub recent_files: Vec<FileView>,
    pub assistant_enabled: bool,
}

/// GET / - Dashboard overview.
#[instrument(skip(session, state), fields(shop = %session.shop.domain))]
async fn index(
    session: ShopSession,
    State(state): State<AppState>,
    Query(notice): Query<NoticeQuery>,
) -> Result<DashboardTemplate, AppError> {
    let billing = BillingService::new(state.pool(), &session.client, state.config());
    let subscription = billing.current_subscription(&session.shop).await?;
    let usage = billing.usage_summary(&session.shop).await?;

    let counts = JobRepository::new(state.pool())
        .counts(Some(session.shop.id))
        .await?;
    let files = FileRepository::new(state.pool())
        .list_for_shop(session.shop.id, RECENT_FILES)
        .await?;

    Ok(DashboardTemplate {
        page: PageContext::new(&state, &session, "/").with_notice(&notice),
        subscription: subscription.as_ref().map(SubscriptionView::from),
        usage: usage.as_ref().map(UsageView::from),
        jobs: JobTotals::from_counts(&counts),
        recent_files: files.iter().map(FileView::from).collect(),
        assistant_enabled: state.claude().is_some(),
    })
}

#[cfg(test)]
mod tests {
    use storekeep_core::JobKind;

    use super::*;

    #[test]
    fn test_job_totals() {
        let counts = vec![
            JobCount {
                kind: JobKind::Email,
                status: JobStatus::Queued,
                count: 2,
            },
            JobCount {
                kind: JobKind::Report,
                status: JobStatus::Running,
                count: 1,
            },
            JobCount {
                kind: JobKind::Image,
                status: JobStatus::Dead,
                count: 3,
            },
            JobCount {
                kind: JobKind::Email,
                status: JobStatus::Completed,
                count: 10,
            },
        ];
        assert_eq!(
            JobTotals::from_counts(&counts),
            JobTotals {
                pending: 3,
                completed: 10,
                failed: 3,
            }
        );
    }
}
