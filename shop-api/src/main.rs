use anyhow::Context;
use shop_api::{app, AppState, AuthConfig, Wiring};
use shop_order::NotificationSink;
use shop_store::{http_collaborators, spawn_relay, Config, DbClient, EventProducer, PgOrderRepository, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shop_api=debug,shop_order=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting shop orders API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Redis is a cache only; run without it rather than not at all
    let cache = match RedisClient::new(&config.redis.url).await {
        Ok(client) => match client.ping().await {
            Ok(()) => Some(client),
            Err(e) => {
                tracing::warn!("Redis unreachable, lookups will not be cached: {}", e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Invalid Redis configuration, lookups will not be cached: {}", e);
            None
        }
    };

    let producer = match EventProducer::new(&config.kafka.brokers, &config.kafka.topic) {
        Ok(producer) => {
            tracing::info!("Publishing order notifications to Kafka topic {}", producer.topic());
            Some(producer)
        }
        Err(e) => {
            tracing::warn!("Kafka producer unavailable, notifications stay in-process: {}", e);
            None
        }
    };

    let collaborators =
        http_collaborators(&config, cache).context("Failed to build collaborator clients")?;

    // Notification side channel: orders -> relay -> Kafka + live subscribers
    let (sink, rx) = NotificationSink::bounded(config.orders.notification_buffer);
    let (live, _) = tokio::sync::broadcast::channel(256);
    let relay = spawn_relay(rx, producer, live.clone());

    let state = AppState::new(Wiring {
        collaborators,
        repo: Arc::new(PgOrderRepository::new(db.pool.clone())),
        sink,
        live,
        rules: config.orders.rules(),
        limits: config.orders.page_limits(),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    })
    .context("Failed to register metrics")?;

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    // the router (and with it the last sink) is gone; let the relay flush
    let _ = relay.await;
    Ok(())
}
