use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use serde_json::json;

use crate::error::AppError;
use crate::utils::state::AppState;

pub async fn list_runfolders(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let runfolders = state.runfolder_repo.get_runfolders().await?;
    Ok(Json(json!({ "runfolders": runfolders })))
}

pub async fn list_projects_for_runfolder(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let runfolder = state.runfolder_repo.runfolder_by_name(&name).await?;
    Ok(Json(json!({ "projects": runfolder.projects })))
}

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let projects = state.project_repo.get_projects().await?;
    Ok(Json(json!({ "projects": projects })))
}
