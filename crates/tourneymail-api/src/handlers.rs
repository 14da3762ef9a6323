//! API request handlers

pub mod campaigns;
pub mod health;
pub mod scheduled;

use axum::{http::StatusCode, Json};
use serde::Serialize;
use tourneymail_core::{CampaignError, DeliveryError};
use tracing::error;

pub use health::*;

/// Error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Handler error: status code plus JSON body
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

pub(crate) fn campaign_error(e: CampaignError) -> ApiError {
    match e {
        CampaignError::NotFound => api_error(StatusCode::NOT_FOUND, "not_found", e.to_string()),
        CampaignError::NotPending(_) => api_error(StatusCode::CONFLICT, "not_pending", e.to_string()),
        CampaignError::InProgress => api_error(StatusCode::CONFLICT, "in_progress", e.to_string()),
        CampaignError::Invalid(_) => {
            api_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        }
        CampaignError::Delivery(DeliveryError::PreconditionNotMet(_)) => api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "precondition_failed",
            e.to_string(),
        ),
        CampaignError::Delivery(DeliveryError::TransportUnavailable(_)) => api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "transport_unavailable",
            e.to_string(),
        ),
        CampaignError::Delivery(_) => {
            error!("Campaign delivery failed: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "delivery_error",
                e.to_string(),
            )
        }
        CampaignError::Storage(inner) => {
            error!("Storage error: {}", inner);
            let status = StatusCode::from_u16(inner.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            api_error(status, &inner.code().to_lowercase(), inner.to_string())
        }
    }
}
