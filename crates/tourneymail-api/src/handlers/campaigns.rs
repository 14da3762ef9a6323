//! Campaign history and on-demand send handlers

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tourneymail_core::ManualCampaign;
use tourneymail_storage::CampaignRecord;
use uuid::Uuid;

use super::{api_error, campaign_error, ApiError};
use crate::state::AppState;

/// Header naming the operator behind an on-demand send
pub const OPERATOR_HEADER: &str = "x-operator";

/// Query parameters for the campaign history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Campaign history response
#[derive(Debug, Serialize)]
pub struct CampaignListResponse {
    pub data: Vec<CampaignRecordResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Campaign record response
#[derive(Debug, Serialize)]
pub struct CampaignRecordResponse {
    pub id: Uuid,
    pub subject: String,
    pub campaign_kind: String,
    pub mode: Option<String>,
    pub category: Option<String>,
    pub tournament_id: Option<Uuid>,
    pub recipients_count: i32,
    pub sent_count: i32,
    pub failed_count: i32,
    pub status: String,
    pub test_mode: bool,
    pub sent_by: String,
    pub scheduled_campaign_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<CampaignRecord> for CampaignRecordResponse {
    fn from(r: CampaignRecord) -> Self {
        Self {
            id: r.id,
            subject: r.subject,
            campaign_kind: r.campaign_kind,
            mode: r.mode,
            category: r.category,
            tournament_id: r.tournament_id,
            recipients_count: r.recipients_count,
            sent_count: r.sent_count,
            failed_count: r.failed_count,
            status: r.status,
            test_mode: r.test_mode,
            sent_by: r.sent_by,
            scheduled_campaign_id: r.scheduled_campaign_id,
            created_at: r.created_at,
            completed_at: r.completed_at,
        }
    }
}

/// List delivered and test campaigns, most recent first
///
/// GET /api/v1/campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<CampaignListResponse>, ApiError> {
    let (records, total) = state
        .manager
        .history(query.limit, query.offset)
        .await
        .map_err(campaign_error)?;

    Ok(Json(CampaignListResponse {
        data: records.into_iter().map(CampaignRecordResponse::from).collect(),
        total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// Send a campaign immediately
///
/// POST /api/v1/campaigns/send
pub async fn send_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<ManualCampaign>,
) -> Result<(StatusCode, Json<CampaignRecordResponse>), ApiError> {
    let operator = headers
        .get(OPERATOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                format!("{} header is required", OPERATOR_HEADER),
            )
        })?;

    let record = state
        .manager
        .send_now(input, operator)
        .await
        .map_err(campaign_error)?;

    Ok((StatusCode::CREATED, Json(CampaignRecordResponse::from(record))))
}
