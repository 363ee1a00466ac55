use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::domain::delivery::{DeliveryRepository, SqliteDeliveryRepository};
use crate::domain::runfolder::{FileSystemRunfolderRepository, GeneralProjectRepository};
use crate::domain::staging::{SqliteStagingRepository, StagingRepository};
use crate::error::AppError;
use crate::service::dds::HttpDdsClient;
use crate::service::delivery::DeliveryService;
use crate::service::external_program::TokioProcessRunner;
use crate::service::staging::StagingService;

/// Everything the request handlers need, composed once at startup. The
/// repositories and the runner sit behind trait objects so tests can swap
/// in fakes.
pub struct AppState {
    pub config: Arc<Config>,
    pub staging_repo: Arc<dyn StagingRepository>,
    pub runfolder_repo: Arc<FileSystemRunfolderRepository>,
    pub project_repo: Arc<GeneralProjectRepository>,
    pub staging_service: Arc<StagingService>,
    pub delivery_service: Arc<DeliveryService>,
}

impl AppState {
    pub fn new(config: Config, pool: Arc<SqlitePool>) -> Result<Self, AppError> {
        let staging_repo: Arc<dyn StagingRepository> =
            Arc::new(SqliteStagingRepository::new(pool.clone()));
        let delivery_repo: Arc<dyn DeliveryRepository> =
            Arc::new(SqliteDeliveryRepository::new(pool));
        let runner = Arc::new(TokioProcessRunner);
        let dds = Arc::new(HttpDdsClient::new(
            config.dds_base_url.clone(),
            Duration::from_secs(config.dds_timeout_secs),
        )?);

        let staging_service = Arc::new(StagingService::new(
            runner.clone(),
            staging_repo.clone(),
            config.staging_command.clone(),
            config.staging_dir.clone(),
        ));
        let delivery_service = Arc::new(DeliveryService::new(
            runner,
            dds,
            staging_repo.clone(),
            delivery_repo.clone(),
            config.mover_command.clone(),
        ));

        Ok(AppState {
            runfolder_repo: Arc::new(FileSystemRunfolderRepository::new(&config.monitored_dir)),
            project_repo: Arc::new(GeneralProjectRepository::new(&config.projects_dir)),
            config: Arc::new(config),
            staging_repo,
            staging_service,
            delivery_service,
        })
    }
}
