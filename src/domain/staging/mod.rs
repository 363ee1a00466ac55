pub mod model;
pub mod repository;

pub use model::{StagingOrder, StagingStatus};
pub use repository::{SqliteStagingRepository, StagingRepository};
