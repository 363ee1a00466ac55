use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a staging order. Transitions are forward-only: once an order
/// has reached a terminal state it never leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StagingStatus {
    Pending,
    StagingInProgress,
    StagingSuccessful,
    StagingFailed,
}

impl StagingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StagingSuccessful | Self::StagingFailed)
    }

    /// Active orders block a new staging of the same source unless forced.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::StagingInProgress)
    }

    pub fn can_transition_to(&self, next: StagingStatus) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::StagingInProgress => next.is_terminal(),
            Self::StagingSuccessful | Self::StagingFailed => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StagingOrder {
    pub id: i64,
    pub source: String,
    pub status: StagingStatus,
    /// Destination of the staged data, `{staging_dir}/{id}_{basename(source)}`.
    /// Keyed by id so repeated staging of the same source never collides.
    pub staging_target: String,
    pub pid: Option<i64>,
    pub size: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub terminal_at: Option<DateTime<Utc>>,
}
