use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mbasic_scraper::cache::{run_sweeper, TtlCache};
use mbasic_scraper::config::Config;
use mbasic_scraper::rewrite::ProxyRewriter;
use mbasic_scraper::scraper::Scraper;
use mbasic_scraper::signer::UrlSigner;
use mbasic_scraper::transport::HttpSession;
use mbasic_scraper::web;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    init_tracing()?;

    info!("Starting mbasic-scraper");

    // Load and validate configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(base_url = %config.base_url, "Configuration loaded");

    if config.session_cookie.is_none() {
        warn!("No SESSION_COOKIE configured - most pages will only show the login form");
    }
    if let Some(proxy) = config.upstream_proxy.as_deref() {
        info!(proxy = %proxy, "Routing upstream requests through proxy");
    }
    if config.api_key.is_none() {
        warn!("API_KEY not set - /api and /proxy?url= are open to anyone who can reach them");
    }

    // Ensure the cache directory exists
    tokio::fs::create_dir_all(&config.cache_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create cache directory: {}",
                config.cache_dir.display()
            )
        })?;

    let session = HttpSession::new(&config).context("Failed to build HTTP session")?;
    let cache = Arc::new(TtlCache::new(&config.cache_dir, config.cache_ttl));
    let signer = Arc::new(UrlSigner::new(config.url_signing_secret.clone()));

    let mut scraper = Scraper::new(Arc::new(session), cache.clone())
        .with_signer(signer.clone())
        .with_allowed_domains(config.proxy_allowed_domains.clone());
    if let Some(public_base) = config.public_base_url.as_deref() {
        info!(public_base = %public_base, "Rewriting asset URLs through /proxy");
        scraper = scraper.with_rewriter(Arc::new(ProxyRewriter::new(public_base, signer)));
    }

    let shutdown = CancellationToken::new();

    // Start cache sweeper in background
    let sweeper_handle = tokio::spawn(run_sweeper(
        cache,
        config.cache_sweep_interval,
        shutdown.clone(),
    ));

    // Start web server in background
    let web_config = Arc::new(config);
    let web_scraper = Arc::new(scraper);
    let web_shutdown = shutdown.clone();
    let web_handle = tokio::spawn(async move {
        if let Err(e) = web::serve(web_config, web_scraper, web_shutdown).await {
            error!("Web server error: {e:#}");
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down...");

    shutdown.cancel();
    let _ = tokio::join!(sweeper_handle, web_handle);

    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mbasic_scraper=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        // Pretty-printed logging for development
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
