use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::delivery::{DeliveryBackend, DeliveryOrder, DeliveryStatus};
use crate::error::AppError;

type Result<T> = std::result::Result<T, AppError>;

#[async_trait::async_trait]
pub trait DeliveryRepository: Send + Sync {
    /// Create a new order in `pending` for a staging order.
    ///
    /// At most one active (pending or in-progress) delivery per staging
    /// order is allowed: creation fails with [`AppError::Conflict`] while
    /// one exists. The check and the insert happen in a single statement,
    /// so two concurrent requests for the same staging order cannot both
    /// succeed. Retries after a terminal order are fine.
    async fn create_delivery_order(
        &self,
        staging_order_id: i64,
        delivery_project: &str,
        backend: DeliveryBackend,
    ) -> Result<DeliveryOrder>;

    async fn delivery_order_by_id(&self, id: i64) -> Result<DeliveryOrder>;

    /// Transition an order to `next`, refusing anything the state machine
    /// does not allow. The update is guarded on the current status, so a
    /// completion callback racing a poll can never tear the record.
    async fn transition(&self, id: i64, next: DeliveryStatus) -> Result<DeliveryOrder>;

    /// Record a successful submission to the delivery system: stores the
    /// external id and moves the order from `pending` to in-progress.
    async fn record_submission(&self, id: i64, external_id: &str) -> Result<DeliveryOrder>;
}

#[derive(Debug)]
pub struct SqliteDeliveryRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteDeliveryRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DeliveryRepository for SqliteDeliveryRepository {
    async fn create_delivery_order(
        &self,
        staging_order_id: i64,
        delivery_project: &str,
        backend: DeliveryBackend,
    ) -> Result<DeliveryOrder> {
        let insert = sqlx::query(
            "INSERT INTO delivery_orders \
             (staging_order_id, delivery_project, backend, status, created_at) \
             SELECT $1, $2, $3, $4, $5 \
             WHERE NOT EXISTS (\
                 SELECT 1 FROM delivery_orders \
                 WHERE staging_order_id = $1 \
                   AND status IN ('pending', 'delivery_in_progress'))",
        )
        .bind(staging_order_id)
        .bind(delivery_project)
        .bind(backend)
        .bind(DeliveryStatus::Pending)
        .bind(Utc::now())
        .execute(self.pool.as_ref())
        .await?;
        if insert.rows_affected() == 0 {
            return Err(AppError::Conflict(format!("staging order {staging_order_id}")));
        }
        self.delivery_order_by_id(insert.last_insert_rowid()).await
    }

    async fn delivery_order_by_id(&self, id: i64) -> Result<DeliveryOrder> {
        sqlx::query_as::<_, DeliveryOrder>("SELECT * FROM delivery_orders WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("delivery order {id}")))
    }

    async fn transition(&self, id: i64, next: DeliveryStatus) -> Result<DeliveryOrder> {
        let current = self.delivery_order_by_id(id).await?.status;
        if !next.allowed_predecessors().contains(&current) {
            return Err(AppError::IllegalTransition(id));
        }
        let terminal_at = next.is_terminal().then(Utc::now);
        // Optimistic guard on the status read above; a concurrent writer
        // that got in between makes this affect zero rows.
        let result = sqlx::query(
            "UPDATE delivery_orders SET status = $1, terminal_at = $2 \
             WHERE id = $3 AND status = $4",
        )
        .bind(next)
        .bind(terminal_at)
        .bind(id)
        .bind(current)
        .execute(self.pool.as_ref())
        .await?;
        match result.rows_affected() {
            0 => Err(AppError::IllegalTransition(id)),
            _ => self.delivery_order_by_id(id).await,
        }
    }

    async fn record_submission(&self, id: i64, external_id: &str) -> Result<DeliveryOrder> {
        let result = sqlx::query(
            "UPDATE delivery_orders SET status = $1, external_delivery_id = $2 \
             WHERE id = $3 AND status = 'pending'",
        )
        .bind(DeliveryStatus::DeliveryInProgress)
        .bind(external_id)
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;
        match result.rows_affected() {
            0 => Err(AppError::IllegalTransition(id)),
            _ => self.delivery_order_by_id(id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::staging::repository::tests::test_pool;
    use crate::domain::staging::{SqliteStagingRepository, StagingRepository};
    use std::path::Path;

    async fn staged_order_id(pool: &Arc<SqlitePool>) -> i64 {
        let staging = SqliteStagingRepository::new(pool.clone());
        staging
            .create_staging_order("/data/run1", Path::new("/staging"), false)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn create_and_fetch_delivery_order() {
        let pool = test_pool().await;
        let staging_id = staged_order_id(&pool).await;
        let repo = SqliteDeliveryRepository::new(pool);

        let order = repo
            .create_delivery_order(staging_id, "delivery-proj-2016", DeliveryBackend::Dds)
            .await
            .unwrap();
        assert_eq!(order.status, DeliveryStatus::Pending);
        assert_eq!(order.backend, DeliveryBackend::Dds);
        assert_eq!(order.staging_order_id, staging_id);
        assert_eq!(order.external_delivery_id, None);

        let fetched = repo.delivery_order_by_id(order.id).await.unwrap();
        assert_eq!(fetched, order);
    }

    #[tokio::test]
    async fn active_delivery_blocks_a_second_order() {
        let pool = test_pool().await;
        let staging_id = staged_order_id(&pool).await;
        let repo = SqliteDeliveryRepository::new(pool);

        let first = repo
            .create_delivery_order(staging_id, "proj", DeliveryBackend::Mover)
            .await
            .unwrap();

        // Still pending, and again once the mover is running.
        let conflict = repo
            .create_delivery_order(staging_id, "proj", DeliveryBackend::Mover)
            .await;
        assert!(matches!(conflict, Err(AppError::Conflict(_))));

        repo.transition(first.id, DeliveryStatus::DeliveryInProgress)
            .await
            .unwrap();
        let conflict = repo
            .create_delivery_order(staging_id, "proj", DeliveryBackend::Dds)
            .await;
        assert!(matches!(conflict, Err(AppError::Conflict(_))));

        // A terminal order no longer blocks a retry.
        repo.transition(first.id, DeliveryStatus::DeliveryFailed)
            .await
            .unwrap();
        let retry = repo
            .create_delivery_order(staging_id, "proj", DeliveryBackend::Mover)
            .await
            .unwrap();
        assert_ne!(retry.id, first.id);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let repo = SqliteDeliveryRepository::new(test_pool().await);
        let missing = repo.delivery_order_by_id(99).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn skipped_precludes_in_progress() {
        let pool = test_pool().await;
        let staging_id = staged_order_id(&pool).await;
        let repo = SqliteDeliveryRepository::new(pool);

        let order = repo
            .create_delivery_order(staging_id, "proj", DeliveryBackend::Mover)
            .await
            .unwrap();
        let skipped = repo
            .transition(order.id, DeliveryStatus::DeliverySkipped)
            .await
            .unwrap();
        assert_eq!(skipped.status, DeliveryStatus::DeliverySkipped);
        assert!(skipped.terminal_at.is_some());

        let illegal = repo
            .transition(order.id, DeliveryStatus::DeliveryInProgress)
            .await;
        assert!(matches!(illegal, Err(AppError::IllegalTransition(_))));
    }

    #[tokio::test]
    async fn terminal_status_is_not_overwritten() {
        let pool = test_pool().await;
        let staging_id = staged_order_id(&pool).await;
        let repo = SqliteDeliveryRepository::new(pool);

        let order = repo
            .create_delivery_order(staging_id, "proj", DeliveryBackend::Mover)
            .await
            .unwrap();
        repo.transition(order.id, DeliveryStatus::DeliveryInProgress)
            .await
            .unwrap();
        repo.transition(order.id, DeliveryStatus::DeliverySuccessful)
            .await
            .unwrap();

        let late = repo.transition(order.id, DeliveryStatus::DeliveryFailed).await;
        assert!(matches!(late, Err(AppError::IllegalTransition(_))));

        let stored = repo.delivery_order_by_id(order.id).await.unwrap();
        assert_eq!(stored.status, DeliveryStatus::DeliverySuccessful);
    }

    #[tokio::test]
    async fn record_submission_stores_external_id() {
        let pool = test_pool().await;
        let staging_id = staged_order_id(&pool).await;
        let repo = SqliteDeliveryRepository::new(pool);

        let order = repo
            .create_delivery_order(staging_id, "proj", DeliveryBackend::Dds)
            .await
            .unwrap();
        let submitted = repo.record_submission(order.id, "snpseq00042").await.unwrap();
        assert_eq!(submitted.status, DeliveryStatus::DeliveryInProgress);
        assert_eq!(submitted.external_delivery_id.as_deref(), Some("snpseq00042"));

        // Submission is recorded once; a replay is refused.
        let replay = repo.record_submission(order.id, "snpseq00043").await;
        assert!(matches!(replay, Err(AppError::IllegalTransition(_))));
    }
}
