use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::staging::{StagingOrder, StagingStatus};
use crate::error::AppError;

type Result<T> = std::result::Result<T, AppError>;

/// Durable store for staging orders. The store is the only component allowed
/// to mutate persisted order state; all transitions go through it.
#[async_trait::async_trait]
pub trait StagingRepository: Send + Sync {
    /// Create a new order in `pending` for `source`, with its target rooted
    /// under `staging_dir`.
    ///
    /// Unless `force` is set, creation fails with [`AppError::Conflict`] when
    /// an active (pending or in-progress) order for the same source already
    /// exists. The check and the insert happen in one transaction, so two
    /// concurrent requests for the same source cannot both succeed.
    async fn create_staging_order(
        &self,
        source: &str,
        staging_dir: &Path,
        force: bool,
    ) -> Result<StagingOrder>;

    /// Full history for a source, oldest first.
    async fn staging_orders_by_source(&self, source: &str) -> Result<Vec<StagingOrder>>;

    async fn staging_order_by_id(&self, id: i64) -> Result<StagingOrder>;

    /// Record that the external stager has been launched.
    async fn set_in_progress(&self, id: i64, pid: u32) -> Result<()>;

    /// Move an order to a terminal status. Exactly one such transition ever
    /// succeeds for a given order; later attempts fail with
    /// [`AppError::IllegalTransition`] and leave the record untouched.
    async fn set_terminal(&self, id: i64, status: StagingStatus, size: Option<i64>) -> Result<()>;
}

#[derive(Debug)]
pub struct SqliteStagingRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteStagingRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl StagingRepository for SqliteStagingRepository {
    async fn create_staging_order(
        &self,
        source: &str,
        staging_dir: &Path,
        force: bool,
    ) -> Result<StagingOrder> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        // The target depends on the assigned id, so the row is inserted with a
        // placeholder and the target is finalised inside the same transaction.
        let insert = if force {
            sqlx::query(
                "INSERT INTO staging_orders (source, status, staging_target, created_at) \
                 VALUES ($1, $2, '', $3)",
            )
            .bind(source)
            .bind(StagingStatus::Pending)
            .bind(now)
            .execute(&mut *tx)
            .await?
        } else {
            sqlx::query(
                "INSERT INTO staging_orders (source, status, staging_target, created_at) \
                 SELECT $1, $2, '', $3 \
                 WHERE NOT EXISTS (\
                     SELECT 1 FROM staging_orders \
                     WHERE source = $1 AND status IN ('pending', 'staging_in_progress'))",
            )
            .bind(source)
            .bind(StagingStatus::Pending)
            .bind(now)
            .execute(&mut *tx)
            .await?
        };

        if insert.rows_affected() == 0 {
            return Err(AppError::Conflict(source.to_string()));
        }

        let id = insert.last_insert_rowid();
        let basename = Path::new(source)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.to_string());
        let target = staging_dir.join(format!("{id}_{basename}"));

        sqlx::query("UPDATE staging_orders SET staging_target = $1 WHERE id = $2")
            .bind(target.to_string_lossy().as_ref())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.staging_order_by_id(id).await
    }

    async fn staging_orders_by_source(&self, source: &str) -> Result<Vec<StagingOrder>> {
        let orders = sqlx::query_as::<_, StagingOrder>(
            "SELECT * FROM staging_orders WHERE source = $1 ORDER BY id",
        )
        .bind(source)
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(orders)
    }

    async fn staging_order_by_id(&self, id: i64) -> Result<StagingOrder> {
        sqlx::query_as::<_, StagingOrder>("SELECT * FROM staging_orders WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("staging order {id}")))
    }

    async fn set_in_progress(&self, id: i64, pid: u32) -> Result<()> {
        let current = self.staging_order_by_id(id).await?.status;
        if !current.can_transition_to(StagingStatus::StagingInProgress) {
            return Err(AppError::IllegalTransition(id));
        }
        // Optimistic guard on the status read above; a concurrent writer
        // that got in between makes this affect zero rows.
        let result = sqlx::query(
            "UPDATE staging_orders SET status = $1, pid = $2 \
             WHERE id = $3 AND status = $4",
        )
        .bind(StagingStatus::StagingInProgress)
        .bind(pid as i64)
        .bind(id)
        .bind(current)
        .execute(self.pool.as_ref())
        .await?;
        match result.rows_affected() {
            0 => Err(AppError::IllegalTransition(id)),
            _ => Ok(()),
        }
    }

    async fn set_terminal(&self, id: i64, status: StagingStatus, size: Option<i64>) -> Result<()> {
        if !status.is_terminal() {
            return Err(AppError::IllegalTransition(id));
        }
        let current = self.staging_order_by_id(id).await?.status;
        if !current.can_transition_to(status) {
            return Err(AppError::IllegalTransition(id));
        }
        // The status guard serialises the completion callback against any
        // concurrent writer: whoever gets here second affects zero rows.
        let result = sqlx::query(
            "UPDATE staging_orders SET status = $1, size = $2, terminal_at = $3 \
             WHERE id = $4 AND status = $5",
        )
        .bind(status)
        .bind(size)
        .bind(Utc::now())
        .bind(id)
        .bind(current)
        .execute(self.pool.as_ref())
        .await?;
        match result.rows_affected() {
            0 => Err(AppError::IllegalTransition(id)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    pub(crate) async fn test_pool() -> Arc<SqlitePool> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        Arc::new(pool)
    }

    #[tokio::test]
    async fn create_assigns_id_and_target() {
        let repo = SqliteStagingRepository::new(test_pool().await);

        let first = repo
            .create_staging_order("/data/run1", Path::new("/staging"), false)
            .await
            .unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(first.status, StagingStatus::Pending);
        assert_eq!(first.staging_target, "/staging/1_run1");
        assert_eq!(first.pid, None);
        assert_eq!(first.size, None);

        let second = repo
            .create_staging_order("/data/run2", Path::new("/staging"), false)
            .await
            .unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(second.staging_target, "/staging/2_run2");
    }

    #[tokio::test]
    async fn active_order_blocks_creation_unless_forced() {
        let repo = SqliteStagingRepository::new(test_pool().await);

        let first = repo
            .create_staging_order("/data/run1", Path::new("/staging"), false)
            .await
            .unwrap();

        let conflict = repo
            .create_staging_order("/data/run1", Path::new("/staging"), false)
            .await;
        assert!(matches!(conflict, Err(AppError::Conflict(_))));

        let forced = repo
            .create_staging_order("/data/run1", Path::new("/staging"), true)
            .await
            .unwrap();
        assert_ne!(forced.id, first.id);
        // Same source, but the target is keyed by id and never collides.
        assert_eq!(forced.staging_target, format!("/staging/{}_run1", forced.id));
    }

    #[tokio::test]
    async fn terminal_order_does_not_block_restaging() {
        let repo = SqliteStagingRepository::new(test_pool().await);

        let first = repo
            .create_staging_order("/data/run1", Path::new("/staging"), false)
            .await
            .unwrap();
        repo.set_terminal(first.id, StagingStatus::StagingFailed, None)
            .await
            .unwrap();

        repo.create_staging_order("/data/run1", Path::new("/staging"), false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn orders_by_source_keeps_history() {
        let repo = SqliteStagingRepository::new(test_pool().await);

        let first = repo
            .create_staging_order("/data/run1", Path::new("/staging"), false)
            .await
            .unwrap();
        repo.create_staging_order("/data/run1", Path::new("/staging"), true)
            .await
            .unwrap();
        repo.create_staging_order("/data/other", Path::new("/staging"), false)
            .await
            .unwrap();

        let history = repo.staging_orders_by_source("/data/run1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let repo = SqliteStagingRepository::new(test_pool().await);
        let missing = repo.staging_order_by_id(4711).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn terminal_status_is_written_exactly_once() {
        let repo = SqliteStagingRepository::new(test_pool().await);

        let order = repo
            .create_staging_order("/data/run1", Path::new("/staging"), false)
            .await
            .unwrap();
        repo.set_in_progress(order.id, 1234).await.unwrap();
        repo.set_terminal(order.id, StagingStatus::StagingSuccessful, Some(1024))
            .await
            .unwrap();

        // A late failure callback must not overwrite the recorded success.
        let late = repo
            .set_terminal(order.id, StagingStatus::StagingFailed, None)
            .await;
        assert!(matches!(late, Err(AppError::IllegalTransition(_))));

        let stored = repo.staging_order_by_id(order.id).await.unwrap();
        assert_eq!(stored.status, StagingStatus::StagingSuccessful);
        assert_eq!(stored.size, Some(1024));
        assert!(stored.terminal_at.is_some());
    }

    #[tokio::test]
    async fn set_in_progress_records_pid() {
        let repo = SqliteStagingRepository::new(test_pool().await);

        let order = repo
            .create_staging_order("/data/run1", Path::new("/staging"), false)
            .await
            .unwrap();
        repo.set_in_progress(order.id, 4711).await.unwrap();

        let stored = repo.staging_order_by_id(order.id).await.unwrap();
        assert_eq!(stored.status, StagingStatus::StagingInProgress);
        assert_eq!(stored.pid, Some(4711));

        // A second launch confirmation for the same order is refused.
        let again = repo.set_in_progress(order.id, 4712).await;
        assert!(matches!(again, Err(AppError::IllegalTransition(_))));
    }
}
