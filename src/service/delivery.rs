use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::domain::delivery::{DeliveryBackend, DeliveryOrder, DeliveryRepository, DeliveryStatus};
use crate::domain::staging::{StagingRepository, StagingStatus};
use crate::error::AppError;
use crate::service::dds::{DdsClient, RemoteDeliveryStatus};
use crate::service::external_program::{Execution, ExternalProgramService};

type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub delivery_project: String,
    pub backend: DeliveryBackend,
    /// File holding the auth token for the delivery system (DDS backend only).
    pub token_path: Option<String>,
    /// Optional checksum file handed to the mover.
    pub md5sums_file: Option<String>,
    /// Bypass flow: mark the order skipped without touching any backend.
    pub skip_mover: bool,
}

/// Starts deliveries for previously staged data and reconciles their status.
pub struct DeliveryService {
    runner: Arc<dyn ExternalProgramService>,
    dds: Arc<dyn DdsClient>,
    staging_repo: Arc<dyn StagingRepository>,
    delivery_repo: Arc<dyn DeliveryRepository>,
    mover_command: Vec<String>,
}

impl DeliveryService {
    pub fn new(
        runner: Arc<dyn ExternalProgramService>,
        dds: Arc<dyn DdsClient>,
        staging_repo: Arc<dyn StagingRepository>,
        delivery_repo: Arc<dyn DeliveryRepository>,
        mover_command: Vec<String>,
    ) -> Self {
        Self {
            runner,
            dds,
            staging_repo,
            delivery_repo,
            mover_command,
        }
    }

    /// Start a delivery for a successfully staged order. Returns as soon as
    /// the delivery order exists and the backend has been dispatched; the
    /// caller polls the status endpoint for the outcome.
    pub async fn deliver_by_staging_id(
        &self,
        staging_id: i64,
        req: DeliveryRequest,
    ) -> Result<DeliveryOrder> {
        let staging_order = self.staging_repo.staging_order_by_id(staging_id).await?;
        if staging_order.status != StagingStatus::StagingSuccessful {
            return Err(AppError::NotReady(staging_id));
        }

        // Validation must finish before the order exists, so a rejected
        // request leaves nothing behind.
        let token = match req.backend {
            DeliveryBackend::Dds if !req.skip_mover => {
                Some(self.read_token(req.token_path.as_deref()).await?)
            }
            _ => None,
        };

        let order = self
            .delivery_repo
            .create_delivery_order(staging_id, &req.delivery_project, req.backend)
            .await?;
        info!(
            order_id = order.id,
            staging_id,
            backend = ?req.backend,
            "created delivery order"
        );

        if req.skip_mover {
            let order = self
                .delivery_repo
                .transition(order.id, DeliveryStatus::DeliverySkipped)
                .await?;
            // The staged copy is of no further use once the order is skipped.
            if let Err(e) = tokio::fs::remove_dir_all(&staging_order.staging_target).await {
                debug!(
                    target = %staging_order.staging_target,
                    error = %e,
                    "could not remove staged directory after skip"
                );
            }
            return Ok(order);
        }

        match req.backend {
            DeliveryBackend::Mover => {
                self.dispatch_mover(&order, &staging_order.staging_target, &req)
                    .await?
            }
            DeliveryBackend::Dds => {
                self.submit_to_dds(
                    &order,
                    &staging_order.staging_target,
                    &req.delivery_project,
                    &token.unwrap_or_default(),
                )
                .await?
            }
        }

        self.delivery_repo.delivery_order_by_id(order.id).await
    }

    /// On-demand status lookup. For the mover backend, and for any order
    /// already in a locally terminal state, the persisted record is
    /// authoritative. For an in-flight DDS order the persisted status is
    /// only a cache: a fresh poll rewrites it. A failed poll leaves the
    /// record untouched and is reported alongside the last known state.
    pub async fn delivery_status(&self, id: i64) -> Result<(DeliveryOrder, Option<String>)> {
        let order = self.delivery_repo.delivery_order_by_id(id).await?;
        if order.backend != DeliveryBackend::Dds || order.status.is_terminal() {
            return Ok((order, None));
        }
        let Some(external_id) = order.external_delivery_id.clone() else {
            // Submitted nothing yet; there is nothing to poll.
            return Ok((order, None));
        };

        match self.dds.poll_status(&external_id).await {
            Ok(remote) => {
                let next = local_status(remote);
                if next == order.status {
                    return Ok((order, None));
                }
                let updated = self.delivery_repo.transition(order.id, next).await?;
                info!(order_id = order.id, ?remote, "reconciled delivery status");
                Ok((updated, None))
            }
            Err(AppError::Poll(message)) => {
                warn!(order_id = order.id, %message, "delivery status poll failed");
                Ok((order, Some(message)))
            }
            Err(other) => Err(other),
        }
    }

    async fn dispatch_mover(
        &self,
        order: &DeliveryOrder,
        staged_path: &str,
        req: &DeliveryRequest,
    ) -> Result<()> {
        let mut cmd = self.mover_command.clone();
        cmd.push(staged_path.to_string());
        cmd.push(req.delivery_project.clone());
        if let Some(md5sums_file) = &req.md5sums_file {
            cmd.push(md5sums_file.clone());
        }

        let execution = match self.runner.start(&cmd).await {
            Ok(execution) => execution,
            Err(e) => {
                if let Err(transition_err) = self
                    .delivery_repo
                    .transition(order.id, DeliveryStatus::DeliveryFailed)
                    .await
                {
                    error!(
                        order_id = order.id,
                        error = %transition_err,
                        "could not mark delivery order failed after launch error"
                    );
                }
                return Err(e);
            }
        };

        self.delivery_repo
            .transition(order.id, DeliveryStatus::DeliveryInProgress)
            .await?;
        self.watch_completion(order.id, execution);
        Ok(())
    }

    async fn submit_to_dds(
        &self,
        order: &DeliveryOrder,
        staged_path: &str,
        delivery_project: &str,
        token: &str,
    ) -> Result<()> {
        match self.dds.submit(delivery_project, staged_path, token).await {
            Ok(external_id) => {
                self.delivery_repo
                    .record_submission(order.id, &external_id)
                    .await?;
                Ok(())
            }
            Err(e) => {
                // The caller already holds the order id; the failure is
                // recorded and shows up on the next status query.
                warn!(order_id = order.id, error = %e, "delivery system submission failed");
                self.delivery_repo
                    .transition(order.id, DeliveryStatus::DeliveryFailed)
                    .await?;
                Ok(())
            }
        }
    }

    fn watch_completion(&self, order_id: i64, execution: Execution) {
        let repo = self.delivery_repo.clone();
        tokio::spawn(async move {
            let result = match execution.done.await {
                Ok(result) => result,
                Err(_) => {
                    warn!(order_id, "delivery process watcher dropped without a result");
                    return;
                }
            };

            let status = if result.exit_code == 0 {
                DeliveryStatus::DeliverySuccessful
            } else {
                warn!(
                    order_id,
                    exit_code = result.exit_code,
                    stderr = %result.stderr,
                    "mover process failed"
                );
                DeliveryStatus::DeliveryFailed
            };

            match repo.transition(order_id, status).await {
                Ok(_) => info!(order_id, ?status, "delivery order reached terminal status"),
                Err(e) => error!(order_id, error = %e, "could not record delivery completion"),
            }
        });
    }

    async fn read_token(&self, token_path: Option<&str>) -> Result<String> {
        let path = token_path.ok_or_else(|| {
            AppError::BadRequest("token_path is required for dds deliveries".to_string())
        })?;
        let token = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::BadRequest(format!("could not read token at {path}: {e}")))?;
        Ok(token.trim().to_string())
    }
}

fn local_status(remote: RemoteDeliveryStatus) -> DeliveryStatus {
    match remote {
        RemoteDeliveryStatus::Pending | RemoteDeliveryStatus::InProgress => {
            DeliveryStatus::DeliveryInProgress
        }
        RemoteDeliveryStatus::Completed => DeliveryStatus::DeliverySuccessful,
        RemoteDeliveryStatus::Failed => DeliveryStatus::DeliveryFailed,
    }
}
