use anyhow::Result;
use axum::http::{HeaderValue, Method};
use axum::Router;
use clap::Parser;
use parley_relay_lib::{config::Settings, ws_router, AppState};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Parley signaling relay server
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to a settings file (TOML/YAML/JSON, extension optional)
    #[arg(long, default_value = "config/default")]
    config: String,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load_from(&args.config)?;
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    let addr = settings.bind_addr;
    let cors = cors_layer(&settings);
    let static_dir = settings.static_dir.clone();

    let state = AppState::new(settings);
    let mut app: Router = ws_router::create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Serve the client bundle next to the relay when configured
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    if settings.allowed_origins.is_empty() {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any);
    }

    let origins: Vec<HeaderValue> = settings
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
}
