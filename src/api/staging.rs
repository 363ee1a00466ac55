use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::domain::staging::{StagingOrder, StagingStatus};
use crate::error::AppError;
use crate::utils::state::AppState;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StageRequest {
    #[serde(default)]
    pub force_delivery: bool,
}

#[derive(Debug, Serialize)]
pub struct StageResponse {
    pub staging_order_ids: HashMap<String, i64>,
    pub staging_order_links: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct StagingStatusResponse {
    pub status: StagingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i64>,
}

/// `POST /stage/runfolder/{name}` — stage every project of a runfolder.
pub async fn stage_runfolder(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Option<Json<StageRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let force = body.map(|Json(req)| req.force_delivery).unwrap_or(false);

    let runfolder = state.runfolder_repo.runfolder_by_name(&name).await?;
    if runfolder.projects.is_empty() {
        return Err(AppError::BadRequest(format!(
            "runfolder {name} has no projects to stage"
        )));
    }
    let sources: Vec<(String, String)> = runfolder
        .projects
        .into_iter()
        .map(|project| (project.name, project.path))
        .collect();

    let orders = state.staging_service.stage_many(&sources, force).await?;
    Ok((StatusCode::ACCEPTED, Json(stage_response(&state, &orders))))
}

/// `POST /stage/project/{name}` — stage a standalone project directory.
pub async fn stage_project(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Option<Json<StageRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let force = body.map(|Json(req)| req.force_delivery).unwrap_or(false);

    let project = state.project_repo.project_by_name(&name).await?;
    let sources = vec![(project.name, project.path)];

    let orders = state.staging_service.stage_many(&sources, force).await?;
    Ok((StatusCode::ACCEPTED, Json(stage_response(&state, &orders))))
}

/// `GET /stage/{id}` — current status of a staging order.
pub async fn staging_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let order = state.staging_repo.staging_order_by_id(id).await?;
    Ok(Json(StagingStatusResponse {
        status: order.status,
        size: order.size,
        pid: order.pid,
    }))
}

fn stage_response(state: &AppState, orders: &[(String, StagingOrder)]) -> StageResponse {
    let mut ids = HashMap::new();
    let mut links = HashMap::new();
    for (project, order) in orders {
        ids.insert(project.clone(), order.id);
        links.insert(project.clone(), staging_order_link(state, order.id));
    }
    StageResponse {
        staging_order_ids: ids,
        staging_order_links: links,
    }
}

pub(crate) fn staging_order_link(state: &AppState, id: i64) -> String {
    format!("{}/api/1.0/stage/{id}", state.config.base_url)
}
