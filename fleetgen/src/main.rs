#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code so a bad config or disk error exits cleanly.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use fleetgen::{
    AppState, DataLayout, GenerationConfig, Orchestrator, OrchestratorOptions, ServiceConfig, SystemTimeSource, router,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "fleetgen=info";

/// Install the stdout layer and, when `log_file` can be opened, the JSON-lines
/// layer that backs `GET /logs`.
fn init_tracing(log_file: Option<&Path>) {
    let file = log_file.and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("Failed to open log file {}: {e}", path.display()))
            .ok()
    });
    let json_layer = file.map(|file| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .with(json_layer)
        .init();
}

async fn shutdown_signal(orchestrator: Arc<Orchestrator>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
    orchestrator.shutdown();
}

#[tokio::main]
async fn main() {
    // Load process settings from environment variables
    let service = match ServiceConfig::from_env() {
        Ok(service) => service,
        Err(e) => {
            init_tracing(None);
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // The data directory must exist before the log file can be opened.
    let layout = DataLayout::new(&service.data_directory);
    if let Err(e) = layout.ensure_directories() {
        init_tracing(None);
        tracing::error!("Failed to create data directory: {e}");
        std::process::exit(1);
    }
    init_tracing(Some(&layout.log_file()));

    tracing::info!(
        "Loaded configuration: config_path={}, data_directory={}, listen_port={}",
        service.config_path.display(),
        service.data_directory.display(),
        service.listen_port
    );

    let config = match GenerationConfig::load(&service.config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid generation config: {e}");
            std::process::exit(1);
        }
    };

    let orchestrator = match Orchestrator::new(config, layout, Arc::new(SystemTimeSource), OrchestratorOptions::default())
    {
        Ok(orchestrator) => Arc::new(orchestrator),
        Err(e) => {
            tracing::error!("Failed to initialize generator: {e}");
            std::process::exit(1);
        }
    };
    orchestrator.start().await;

    let app = router(AppState::new(orchestrator.clone()));
    let addr = SocketAddr::from(([0, 0, 0, 0], service.listen_port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap_or_else(|e| {
        tracing::error!("Failed to bind: {e}");
        std::process::exit(1);
    });

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(orchestrator.clone()))
        .await
    {
        tracing::error!("Server error: {e}");
    }

    orchestrator.shutdown();
    orchestrator.join().await;
}
