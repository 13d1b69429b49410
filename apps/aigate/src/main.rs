use std::net::SocketAddr;

use anyhow::Result;
use axum::middleware;
use axum::routing::post;
use axum::Router;

mod auth;
mod handlers;
mod sse;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let boot = aigate_core::bootstrap::bootstrap_from_env().await?;

    let api = Router::new()
        .route("/v1/chat/completions", post(handlers::openai_chat_completions))
        .route("/v1/responses", post(handlers::openai_responses))
        .route("/v1/embeddings", post(handlers::openai_embeddings))
        .route("/v1/images/generations", post(handlers::openai_images_generations))
        .route("/v1/audio/transcriptions", post(handlers::openai_audio_transcriptions))
        .route("/v1/messages", post(handlers::claude_messages))
        .route("/v1beta/models/{model_action}", post(handlers::gemini_generate_content))
        .layer(middleware::from_fn(auth::extract_auth))
        .with_state(boot.state.clone());

    let app = api.nest("/admin", aigate_admin::router(boot.state.clone(), boot.registry.clone()));

    let host = boot.args.host.clone().unwrap_or_else(|| "0.0.0.0".to_string());
    let port: u16 = boot.args.port.as_deref().and_then(|p| p.parse().ok()).unwrap_or(8080);
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(event = "listening", %addr);
    axum::serve(listener, app).await?;
    Ok(())
}
