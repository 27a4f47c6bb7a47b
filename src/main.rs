#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use axum::Router;
    use schemascope::core::ai_api::{OpenAiClient, ParseOrchestrator};
    use schemascope::core::ai_config::AiConfig;
    use schemascope::core::config::Config;
    use schemascope::core::entities::{EntityApiState, entity_api_router};
    use schemascope::core::store::EntityStore;
    use std::sync::Arc;
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;
    use tracing_subscriber::EnvFilter;

    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("schemascope=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();
    let mut ai_config = AiConfig::from_env();

    if let Some(path) = &config.parse_instruction_file {
        let instruction = tokio::fs::read_to_string(path).await.map_err(|e| {
            tracing::error!("Failed to read instruction file {}: {}", path.display(), e);
            e
        })?;
        ai_config = ai_config.with_instruction(instruction);
    }

    // Log config status (without revealing secrets)
    tracing::info!(
        "Config loaded: data_dir={}, model={}, api_key={}, custom_instruction={}",
        config.data_dir.display(),
        ai_config.model,
        ai_config.has_api_key(),
        config.has_instruction_file()
    );
    if !ai_config.has_api_key() {
        tracing::warn!("OPENAI_API_KEY is not set; schema extraction requests will fail");
    }

    let client = OpenAiClient::new(&ai_config)?;
    let state = EntityApiState {
        store: EntityStore::new(config.data_dir.clone()),
        parser: ParseOrchestrator::new(Arc::new(client), ai_config),
    };

    let app = Router::new()
        .merge(entity_api_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_address();
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

#[cfg(not(feature = "server"))]
pub fn main() {
    // the HTTP service needs the `server` feature
}
