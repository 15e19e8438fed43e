pub mod models;
pub mod pii;

pub use models::events::Notification;
pub use pii::Masked;
