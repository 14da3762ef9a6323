//! Scheduled campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tourneymail_core::TickReport;
use tourneymail_storage::{NewScheduledCampaign, ScheduledCampaign, ScheduledCampaignStatus};
use tracing::{error, info};
use uuid::Uuid;

use super::{api_error, campaign_error, ApiError};
use crate::state::AppState;

/// Query parameters for listing scheduled campaigns
#[derive(Debug, Deserialize)]
pub struct ListScheduledQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Scheduled campaign list response
#[derive(Debug, Serialize)]
pub struct ScheduledListResponse {
    pub data: Vec<ScheduledCampaignResponse>,
    pub limit: i64,
    pub offset: i64,
}

/// Scheduled campaign response
#[derive(Debug, Serialize)]
pub struct ScheduledCampaignResponse {
    pub id: Uuid,
    pub campaign_kind: String,
    pub subject: String,
    pub scheduled_at: NaiveDateTime,
    pub status: String,
    pub mode: Option<String>,
    pub category: Option<String>,
    pub tournament_id: Option<Uuid>,
    pub recipient_count: usize,
    pub test_mode: bool,
    pub created_by: String,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ScheduledCampaign> for ScheduledCampaignResponse {
    fn from(item: ScheduledCampaign) -> Self {
        Self {
            id: item.id,
            recipient_count: item.recipient_ids.len(),
            campaign_kind: item.campaign_kind,
            subject: item.subject,
            scheduled_at: item.scheduled_at,
            status: item.status,
            mode: item.mode,
            category: item.category,
            tournament_id: item.tournament_id,
            test_mode: item.test_mode,
            created_by: item.created_by,
            last_error: item.last_error,
            sent_at: item.sent_at,
            created_at: item.created_at,
        }
    }
}

/// List scheduled campaigns
///
/// GET /api/v1/scheduled
pub async fn list_scheduled(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListScheduledQuery>,
) -> Result<Json<ScheduledListResponse>, ApiError> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(raw.parse::<ScheduledCampaignStatus>().map_err(|e| {
            api_error(StatusCode::BAD_REQUEST, "validation_error", e)
        })?),
    };

    let items = state
        .manager
        .list(status, query.limit, query.offset)
        .await
        .map_err(campaign_error)?;

    Ok(Json(ScheduledListResponse {
        data: items.into_iter().map(ScheduledCampaignResponse::from).collect(),
        limit: query.limit,
        offset: query.offset,
    }))
}

/// Queue a campaign
///
/// POST /api/v1/scheduled
pub async fn create_scheduled(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewScheduledCampaign>,
) -> Result<(StatusCode, Json<ScheduledCampaignResponse>), ApiError> {
    let item = state.manager.schedule(input).await.map_err(campaign_error)?;

    info!("Queued scheduled campaign {}", item.id);

    Ok((StatusCode::CREATED, Json(ScheduledCampaignResponse::from(item))))
}

/// Get a scheduled campaign by ID
///
/// GET /api/v1/scheduled/:id
pub async fn get_scheduled(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScheduledCampaignResponse>, ApiError> {
    let item = state.manager.get(id).await.map_err(campaign_error)?;
    Ok(Json(ScheduledCampaignResponse::from(item)))
}

/// Cancel a pending scheduled campaign
///
/// POST /api/v1/scheduled/:id/cancel
pub async fn cancel_scheduled(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScheduledCampaignResponse>, ApiError> {
    let item = state.manager.cancel(id).await.map_err(campaign_error)?;
    Ok(Json(ScheduledCampaignResponse::from(item)))
}

/// Run one scheduler tick now
///
/// POST /api/v1/scheduled/run
pub async fn run_scheduler(State(state): State<Arc<AppState>>) -> Result<Json<TickReport>, ApiError> {
    let report = state.scheduler.tick().await.map_err(|e| {
        error!("Manual tick failed: {}", e);
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Failed to process scheduled campaigns",
        )
    })?;

    Ok(Json(report))
}
