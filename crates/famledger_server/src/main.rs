use axum::http::{Method, header};
use famledger_server::{
    admission::AdmissionController,
    app_router,
    auth::{TOKEN_HEADER, TokenGate},
    config::Config,
    db::{LedgerRepo, init_database},
    handlers::AppState,
};
use rusqlite::Connection;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "famledger_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting famledger server v{}", env!("CARGO_PKG_VERSION"));
    info!("Database path: {:?}", config.database_path);
    info!(
        "Rate limit: {} requests per {}s, tracking up to {} clients",
        config.admission.max_requests,
        config.admission.window.as_secs(),
        config.admission.max_tracked_clients
    );
    info!(
        "Suspicious path patterns: {:?}",
        config.admission.suspicious_patterns
    );

    // Initialize database
    let conn = match Connection::open(&config.database_path) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_database(&conn) {
        error!("Failed to initialize database: {}", e);
        std::process::exit(1);
    }

    // Create shared state
    let repo = Arc::new(LedgerRepo::new(conn));
    let admission = Arc::new(AdmissionController::new(config.admission.clone()));
    let state = AppState {
        repo,
        admission: admission.clone(),
    };

    // Build CORS layer
    let allowed_origin = if config.cors_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        info!("CORS origins: {:?}", config.cors_origins);
        AllowOrigin::list(config.cors_origins.iter().cloned())
    };
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static(TOKEN_HEADER)])
        .allow_origin(allowed_origin);

    let app = app_router(
        state,
        TokenGate::new(config.shared_secret.clone()),
        config.trust_forwarded_for,
    )
    .layer(cors)
    .layer(TraceLayer::new_for_http());

    // Create listener
    let addr = config.server_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Server listening on http://{}", addr);

    // Start stale client sweep task
    let sweep_admission = admission.clone();
    let sweep_interval = config.security_sweep_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            let dropped = sweep_admission.sweep(std::time::Instant::now());
            if dropped > 0 {
                debug!("Swept {} stale client records", dropped);
            }
        }
    });

    // Run server with graceful shutdown
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server shut down gracefully");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
