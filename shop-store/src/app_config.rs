use serde::Deserialize;
use shop_order::{OrderRules, PageLimits, TransitionPolicy};
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub services: ServicesConfig,
    #[serde(default)]
    pub resiliency: ResiliencyConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub orders: OrdersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_topic")]
    pub topic: String,
}

fn default_topic() -> String {
    "shop.orders".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Base URLs of the collaborating services.
#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    pub address_url: String,
    pub basket_url: String,
    pub product_url: String,
    pub user_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResiliencyConfig {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
    pub request_timeout_ms: u64,
}

impl Default for ResiliencyConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 30,
            request_timeout_ms: 3000,
        }
    }
}

impl ResiliencyConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 300 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrdersConfig {
    #[serde(default)]
    pub transition_policy: TransitionPolicy,
    #[serde(default = "default_true")]
    pub compensate_inventory: bool,
    #[serde(default = "default_buffer")]
    pub notification_buffer: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

fn default_true() -> bool {
    true
}

fn default_buffer() -> usize {
    1024
}

fn default_page_size() -> u32 {
    20
}

fn default_max_page_size() -> u32 {
    100
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            transition_policy: TransitionPolicy::default(),
            compensate_inventory: default_true(),
            notification_buffer: default_buffer(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl OrdersConfig {
    pub fn rules(&self) -> OrderRules {
        OrderRules {
            transition_policy: self.transition_policy,
            compensate_inventory: self.compensate_inventory,
        }
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_size: self.default_page_size,
            max_size: self.max_page_size,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `SHOP__ORDERS__TRANSITION_POLICY=permissive`
            .add_source(config::Environment::with_prefix("SHOP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_section_defaults() {
        let orders: OrdersConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(orders.rules(), OrderRules::default());
        assert_eq!(orders.page_limits(), PageLimits { default_size: 20, max_size: 100 });
        assert_eq!(orders.notification_buffer, 1024);
    }

    #[test]
    fn test_permissive_policy_parses() {
        let orders: OrdersConfig =
            serde_json::from_str(r#"{"transition_policy": "permissive", "compensate_inventory": false}"#)
                .unwrap();

        assert_eq!(orders.transition_policy, TransitionPolicy::Permissive);
        assert!(!orders.rules().compensate_inventory);
    }
}
