pub mod model;
pub mod repository;

pub use model::{DeliveryBackend, DeliveryOrder, DeliveryStatus};
pub use repository::{DeliveryRepository, SqliteDeliveryRepository};
