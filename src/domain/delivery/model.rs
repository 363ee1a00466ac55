use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which path handles a delivery order. Immutable once the order is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DeliveryBackend {
    /// Legacy transfer through an external mover process.
    Mover,
    /// External data-delivery system, queried by polling.
    Dds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    DeliveryInProgress,
    DeliverySuccessful,
    DeliveryFailed,
    /// Terminal short-circuit for bypass flows; never reaches in-progress.
    DeliverySkipped,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::DeliverySuccessful | Self::DeliveryFailed | Self::DeliverySkipped
        )
    }

    /// States a transition to `self` may legally start from.
    pub fn allowed_predecessors(&self) -> &'static [DeliveryStatus] {
        match self {
            Self::Pending => &[],
            Self::DeliveryInProgress | Self::DeliverySkipped => &[Self::Pending],
            Self::DeliverySuccessful | Self::DeliveryFailed => {
                &[Self::Pending, Self::DeliveryInProgress]
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DeliveryOrder {
    pub id: i64,
    pub staging_order_id: i64,
    pub delivery_project: String,
    pub backend: DeliveryBackend,
    pub status: DeliveryStatus,
    /// Identifier handed back by the delivery system, used for later polls.
    /// Always absent for the mover backend.
    pub external_delivery_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub terminal_at: Option<DateTime<Utc>>,
}
