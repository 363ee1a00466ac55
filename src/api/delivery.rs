use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::domain::delivery::{DeliveryBackend, DeliveryStatus};
use crate::error::AppError;
use crate::service::delivery::DeliveryRequest;
use crate::utils::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct DeliverRequest {
    pub delivery_project_id: String,
    /// Route through the external delivery system instead of the mover.
    #[serde(default)]
    pub dds: bool,
    pub token_path: Option<String>,
    pub md5sums_file: Option<String>,
    #[serde(default)]
    pub skip_mover: bool,
}

#[derive(Debug, Serialize)]
pub struct DeliverResponse {
    pub delivery_order_id: i64,
    pub delivery_order_link: String,
}

#[derive(Debug, Serialize)]
pub struct DeliveryStatusResponse {
    pub id: i64,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_delivery_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_error: Option<String>,
}

/// `POST /deliver/stage_id/{staging_id}` — start delivering a staged order.
pub async fn deliver_by_staging_id(
    State(state): State<Arc<AppState>>,
    Path(staging_id): Path<i64>,
    Json(req): Json<DeliverRequest>,
) -> Result<impl IntoResponse, AppError> {
    let backend = if req.dds {
        DeliveryBackend::Dds
    } else {
        DeliveryBackend::Mover
    };
    let order = state
        .delivery_service
        .deliver_by_staging_id(
            staging_id,
            DeliveryRequest {
                delivery_project: req.delivery_project_id,
                backend,
                token_path: req.token_path,
                md5sums_file: req.md5sums_file,
                skip_mover: req.skip_mover,
            },
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DeliverResponse {
            delivery_order_id: order.id,
            delivery_order_link: delivery_order_link(&state, order.id),
        }),
    ))
}

/// `GET /deliver/status/{id}` — reconciled status of a delivery order.
pub async fn delivery_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (order, poll_error) = state.delivery_service.delivery_status(id).await?;
    Ok(Json(DeliveryStatusResponse {
        id: order.id,
        status: order.status,
        external_delivery_id: order.external_delivery_id,
        poll_error,
    }))
}

pub(crate) fn delivery_order_link(state: &AppState, id: i64) -> String {
    format!("{}/api/1.0/deliver/status/{id}", state.config.base_url)
}
