use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;
use reader_bridge::{CloseReason, ReaderRegistry, spawn_stats_reporter};
use topic_api_server::ApiServices;
use topic_engine::{StaticAuthorizer, Topic, TopicRegistry};

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("reader-gateway starting");

    // --- Load config ---
    let config = ServerConfig::load(&args.config)?;
    tracing::info!(config = %args.config, "loaded config");

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- Create topics ---
    let mut topics = TopicRegistry::new();
    for topic_cfg in &config.topics {
        topics.register(Topic::new(topic_cfg.name.clone(), topic_cfg.max_records));
        tracing::info!(
            topic = %topic_cfg.name,
            max_records = topic_cfg.max_records,
            "registered topic"
        );
    }
    let topics = Arc::new(topics);

    let authorizer = StaticAuthorizer::new(config.auth.enabled, config.auth.grants.clone());
    tracing::info!(
        enabled = config.auth.enabled,
        grants = config.auth.grants.len(),
        role_header = %config.auth.role_header,
        "authorization"
    );

    let readers = Arc::new(ReaderRegistry::new());

    // --- Stats reporter ---
    let stats_handle = (config.stats_interval_secs > 0).then(|| {
        spawn_stats_reporter(
            readers.clone(),
            Duration::from_secs(config.stats_interval_secs),
            token.clone(),
        )
    });

    // --- API server (HTTP + WS) ---
    let services = ApiServices {
        factory: topics.clone(),
        catalog: topics,
        authorizer: Arc::new(authorizer),
        registry: readers.clone(),
    };
    let api_port = config.api_port;
    let role_header = config.auth.role_header.clone();
    let api_token = token.clone();
    let mut api_handle = tokio::spawn(async move {
        topic_api_server::run(api_port, services, &role_header, api_token)
            .await
            .map_err(ServerError::Api)
    });

    tracing::info!(port = api_port, "api server (http+ws) listening");
    tracing::info!("server ready");

    // --- Ожидание Ctrl+C или падения API ---
    let api_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutting down...");
            None
        }
        joined = &mut api_handle => Some(joined),
    };

    token.cancel();

    // Клиенты открытых reader-сессий получают close frame.
    for session in readers.sessions() {
        session.shutdown(CloseReason::GoingAway);
    }

    let api_result = match api_result {
        Some(joined) => joined,
        None => match tokio::time::timeout(Duration::from_secs(5), &mut api_handle).await {
            Ok(joined) => joined,
            Err(_) => {
                api_handle.abort();
                Ok(Ok(()))
            }
        },
    };

    if let Some(h) = stats_handle {
        let _ = h.await;
    }

    match api_result {
        Ok(result) => result?,
        Err(e) => return Err(ServerError::Api(format!("api task: {e}"))),
    }

    tracing::info!("shutdown complete");
    Ok(())
}
