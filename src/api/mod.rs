pub mod delivery;
pub mod runfolder;
pub mod staging;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use axum::{Json, response::IntoResponse};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::utils::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/1.0", api_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/version", get(version))
        .route("/runfolders", get(runfolder::list_runfolders))
        .route(
            "/runfolders/{name}/projects",
            get(runfolder::list_projects_for_runfolder),
        )
        .route("/projects", get(runfolder::list_projects))
        .route("/stage/runfolder/{name}", post(staging::stage_runfolder))
        .route("/stage/project/{name}", post(staging::stage_project))
        .route("/stage/{id}", get(staging::staging_status))
        .route("/deliver/stage_id/{staging_id}", post(delivery::deliver_by_staging_id))
        .route("/deliver/status/{id}", get(delivery::delivery_status))
}

async fn version() -> impl IntoResponse {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}
