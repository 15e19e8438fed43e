pub mod app_config;
pub mod database;
pub mod events;
pub mod order_repo;
pub mod redis_repo;
pub mod remote;

pub use app_config::Config;
pub use database::DbClient;
pub use events::{spawn_relay, EventProducer};
pub use order_repo::PgOrderRepository;
pub use redis_repo::RedisClient;
pub use remote::http_collaborators;
