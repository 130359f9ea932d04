//! UI to HTML with Gemini
//!
//! Serves a browser UI that turns a screenshot of a user interface into
//! an HTML page by asking a Gemini model, then lets the user refine the
//! result through chat.

mod api;
mod core;
mod models;

use crate::api::endpoints::{AppState, create_router};
use crate::core::config::Config;
use crate::core::logging::init_logging;
use crate::core::provider::{Provider, ProviderError, ProviderType};
use crate::core::providers::{GeminiProvider, VertexAIProvider};
use crate::core::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How often idle sessions are swept
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // Check for --help flag
    if std::env::args().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return;
    }

    // Load configuration
    let config = match Config::load() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            eprintln!("Configuration Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config.log_level);

    // Print startup banner
    print_startup_banner(&config);

    // Validate API key
    if !config.validate_api_key() {
        error!(
            "Missing credentials for provider {:?}; set GEMINI_API_KEY in .env",
            config.provider
        );
        std::process::exit(1);
    }

    let provider = match create_provider(&config) {
        Ok(provider) => provider,
        Err(e) => {
            error!("Failed to create provider: {}", e);
            std::process::exit(1);
        }
    };

    info!("Using provider: {}", provider.provider_name());

    let Some(idle_timeout) = config.session_idle_duration() else {
        error!("SESSION_IDLE_TIMEOUT is out of range");
        std::process::exit(1);
    };

    let sessions = Arc::new(SessionStore::new());
    spawn_session_eviction(sessions.clone(), idle_timeout);

    // Create application state
    let app_state = AppState {
        config: config.clone(),
        provider,
        sessions,
    };

    // Create router
    let app = create_router(app_state);

    // Bind to address
    let addr = format!("{}:{}", config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    let url = config.server_url();
    info!("Server listening on {}", url);

    if config.open_browser {
        open_browser(&url);
    }

    // Run server
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server stopped");
}

fn create_provider(config: &Config) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider: Arc<dyn Provider> = match config.provider {
        ProviderType::Gemini => Arc::new(GeminiProvider::new(
            config.gemini_api_key.clone().unwrap_or_default(),
            config.gemini_base_url.clone(),
            config.request_timeout,
        )?),
        ProviderType::VertexAI => Arc::new(VertexAIProvider::new(
            config.vertexai_project_id.clone().unwrap_or_default(),
            config.vertexai_location.clone(),
            config.vertexai_access_token.clone().unwrap_or_default(),
            config.request_timeout,
        )?),
    };
    Ok(provider)
}

fn spawn_session_eviction(sessions: Arc<SessionStore>, idle_timeout: chrono::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            interval.tick().await;
            sessions.evict_idle(chrono::Utc::now(), idle_timeout).await;
        }
    });
}

/// Open the UI with the platform's default browser
///
/// Failure is not fatal; the URL is in the log either way.
fn open_browser(url: &str) {
    let result = if cfg!(target_os = "macos") {
        std::process::Command::new("open").arg(url).spawn()
    } else if cfg!(target_os = "windows") {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .spawn()
    } else {
        std::process::Command::new("xdg-open").arg(url).spawn()
    };

    if let Err(e) = result {
        warn!("Could not open a browser ({}); visit {} manually", e, url);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Print startup banner with configuration
fn print_startup_banner(config: &Config) {
    println!("🎨 UI to HTML with Gemini v{}", env!("CARGO_PKG_VERSION"));
    println!("✅ Configuration loaded successfully");
    println!("   Provider: {:?}", config.provider);
    if config.provider == ProviderType::Gemini {
        println!("   Base URL: {}", config.gemini_base_url);
    } else {
        println!("   Vertex AI location: {}", config.vertexai_location);
    }
    println!("   Model: {}", config.model);
    println!("   CSS framework: {}", config.css_framework);
    println!(
        "   Sampling: temperature={} top_p={} top_k={} max_output_tokens={}",
        config.temperature, config.top_p, config.top_k, config.max_output_tokens
    );
    println!("   Request Timeout: {}s", config.request_timeout);
    println!("   Max Upload: {} bytes", config.max_upload_bytes);
    println!("   Server: {}:{}", config.host, config.port);
    println!(
        "   API key: {}",
        if config.validate_api_key() {
            "configured"
        } else {
            "missing"
        }
    );
    println!();
}

/// Print help message
fn print_help() {
    println!("UI to HTML with Gemini v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: ui-to-html [OPTIONS]");
    println!();
    println!("Starts a local web server with a browser UI that converts a screenshot");
    println!("into HTML using a Gemini model.");
    println!();
    println!("Options:");
    println!("  -h, --help    Display this help message");
    println!();
    println!("Configuration is read from config.toml (or CONFIG_PATH), then .env,");
    println!("then the environment. Environment variables:");
    println!();
    println!("Gemini API provider:");
    println!("  GEMINI_API_KEY - Your Gemini API key (required)");
    println!("  GEMINI_BASE_URL - API base URL (default: https://generativelanguage.googleapis.com/v1beta)");
    println!();
    println!("Vertex AI provider (PROVIDER=vertexai):");
    println!("  VERTEXAI_PROJECT_ID - Google Cloud project ID (required)");
    println!("  VERTEXAI_LOCATION - GCP location (default: us-central1)");
    println!("  VERTEXAI_ACCESS_TOKEN - GCP access token (required)");
    println!();
    println!("Generation:");
    println!("  GEMINI_MODEL - Model name (default: gemini-2.0-flash-exp)");
    println!("  CSS_FRAMEWORK - CSS framework used in the HTML (default: Regular CSS)");
    println!("  TEMPERATURE, TOP_P, TOP_K, MAX_OUTPUT_TOKENS - Sampling (default: 0.7, 0.95, 40, 8192)");
    println!();
    println!("Server:");
    println!("  PROVIDER - gemini or vertexai (default: gemini)");
    println!("  HOST - Server host (default: 127.0.0.1)");
    println!("  PORT - Server port (default: 8501)");
    println!("  LOG_LEVEL - Logging level (default: info)");
    println!("  OPEN_BROWSER - Open the UI on startup (default: true)");
    println!("  REQUEST_TIMEOUT - Model request timeout in seconds (default: 120)");
    println!("  MAX_UPLOAD_BYTES - Largest accepted screenshot (default: 10485760)");
    println!("  SESSION_IDLE_TIMEOUT - Seconds before an idle session is dropped (default: 3600)");
}
