use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::staging::{StagingOrder, StagingRepository, StagingStatus};
use crate::error::AppError;
use crate::service::external_program::{Execution, ExternalProgramService};

type Result<T> = std::result::Result<T, AppError>;

/// Decides whether staging is permitted, creates the orders and drives the
/// external stager through its lifecycle. Staging is expensive and unsafe to
/// run twice against the same target, so the default is deny-on-conflict
/// with an explicit force override.
pub struct StagingService {
    runner: Arc<dyn ExternalProgramService>,
    staging_repo: Arc<dyn StagingRepository>,
    staging_command: Vec<String>,
    staging_dir: PathBuf,
}

impl StagingService {
    pub fn new(
        runner: Arc<dyn ExternalProgramService>,
        staging_repo: Arc<dyn StagingRepository>,
        staging_command: Vec<String>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            staging_repo,
            staging_command,
            staging_dir: staging_dir.into(),
        }
    }

    /// Stage a single source. Returns as soon as the order exists and the
    /// stager has been launched; the caller polls for the terminal status.
    pub async fn stage_source(&self, source: &str, force: bool) -> Result<StagingOrder> {
        let order = self
            .staging_repo
            .create_staging_order(source, &self.staging_dir, force)
            .await?;
        info!(order_id = order.id, source, force, "created staging order");

        let mut cmd = self.staging_command.clone();
        cmd.push(order.source.clone());
        cmd.push(order.staging_target.clone());

        let execution = match self.runner.start(&cmd).await {
            Ok(execution) => execution,
            Err(e) => {
                // An order must never stay pending with no process behind it.
                if let Err(transition_err) = self
                    .staging_repo
                    .set_terminal(order.id, StagingStatus::StagingFailed, None)
                    .await
                {
                    error!(
                        order_id = order.id,
                        error = %transition_err,
                        "could not mark staging order failed after launch error"
                    );
                }
                return Err(e);
            }
        };

        self.staging_repo
            .set_in_progress(order.id, execution.pid)
            .await?;
        self.watch_completion(order.id, execution);

        self.staging_repo.staging_order_by_id(order.id).await
    }

    /// Stage a batch of `(project, source)` pairs, e.g. every project of a
    /// runfolder. Conflicts are checked for the whole batch up front, so a
    /// request that already conflicts is denied before this call creates any
    /// orders. The batch is not a single transaction though: each create
    /// re-checks atomically, and a conflict raced in after the pre-check
    /// can still stop the batch partway through.
    pub async fn stage_many(
        &self,
        sources: &[(String, String)],
        force: bool,
    ) -> Result<Vec<(String, StagingOrder)>> {
        if !force {
            for (_, source) in sources {
                let active = self
                    .staging_repo
                    .staging_orders_by_source(source)
                    .await?
                    .iter()
                    .any(|order| order.status.is_active());
                if active {
                    return Err(AppError::Conflict(source.clone()));
                }
            }
        }

        let mut orders = Vec::with_capacity(sources.len());
        for (project, source) in sources {
            let order = self.stage_source(source, force).await?;
            orders.push((project.clone(), order));
        }
        Ok(orders)
    }

    /// Subscribe to the process exit and perform the terminal transition.
    /// The store's guarded update is the only writer of terminal status.
    fn watch_completion(&self, order_id: i64, execution: Execution) {
        let repo = self.staging_repo.clone();
        tokio::spawn(async move {
            let result = match execution.done.await {
                Ok(result) => result,
                Err(_) => {
                    warn!(order_id, "staging process watcher dropped without a result");
                    return;
                }
            };

            let (status, size) = if result.exit_code == 0 {
                (
                    StagingStatus::StagingSuccessful,
                    parse_total_file_size(&result.stdout),
                )
            } else {
                warn!(
                    order_id,
                    exit_code = result.exit_code,
                    stderr = %result.stderr,
                    "staging process failed"
                );
                (StagingStatus::StagingFailed, None)
            };

            match repo.set_terminal(order_id, status, size).await {
                Ok(()) => info!(order_id, ?status, ?size, "staging order reached terminal status"),
                Err(e) => error!(order_id, error = %e, "could not record staging completion"),
            }
        });
    }
}

/// Extract the payload size from rsync `--stats` output,
/// e.g. `Total file size: 1,024 bytes`.
fn parse_total_file_size(stdout: &str) -> Option<i64> {
    stdout.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("Total file size:")?;
        let digits: String = rest.chars().filter(char::is_ascii_digit).collect();
        digits.parse().ok()
    })
}
