mod compile;
mod config;
mod errors;
mod routes;
mod state;
mod templates;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::compile::{DocumentCompiler, PdfLatexCompiler};
use crate::config::Config;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed values)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting LaTeX API v{}", env!("CARGO_PKG_VERSION"));

    // Workspaces are created under this directory, one per request
    std::fs::create_dir_all(&config.compile_workdir).with_context(|| {
        format!(
            "Failed to create COMPILE_WORKDIR '{}'",
            config.compile_workdir.display()
        )
    })?;

    let compiler = PdfLatexCompiler::from_config(&config);
    if compiler.is_available().await {
        info!("Using pdflatex at: {}", compiler.binary().display());
    } else {
        // Keep serving; compile requests will report the missing dependency
        warn!(
            "pdflatex NOT executable / not found at: {}",
            compiler.binary().display()
        );
    }
    info!(
        "Compile timeout {:?}, workspaces under {}",
        config.compile_timeout,
        config.compile_workdir.display()
    );
    if let Some(dir) = &config.static_dir {
        info!("Serving editor assets from {}", dir.display());
    }

    // Build app state
    let state = AppState {
        config: config.clone(),
        compiler: Arc::new(compiler),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
