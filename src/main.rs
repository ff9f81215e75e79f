use std::{
    path::PathBuf,
    process,
    sync::{Arc, OnceLock},
    time::{Duration, SystemTime},
};

use querybee::{
    config::Config,
    core::{
        collectors::{exposition::PrometheusExposition, registry::CollectorRegistry},
        fs::OsFileSystem,
        orchestrator::Orchestrator,
        readiness::Readiness,
        server::{self, AppState},
        substitute::Variables,
        warehouse::WarehouseRunner,
    },
    logger::LoggerManager,
    print_error,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

/// Logs every configured query file and whether it exists right now.
///
/// Missing files are not fatal; they are retried every cycle.
fn log_query_files_table(paths: &[PathBuf]) {
    let width = paths
        .iter()
        .map(|p| p.display().to_string().len())
        .max()
        .unwrap_or(10)
        .max("Query file".len());

    info!("{:<width$} | Status", "Query file", width = width);
    info!("{}-+-{}", "-".repeat(width), "-".repeat(12));

    for path in paths {
        if path.is_file() {
            info!("{:<width$} | PRESENT", path.display().to_string(), width = width);
        } else {
            warn!("{:<width$} | MISSING", path.display().to_string(), width = width);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let start = SystemTime::now();
    let cfg = config();

    let logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting querybee version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);
    debug!("{:#?}", cfg.queries);

    log_query_files_table(&cfg.queries.gauge_queries);

    let interval = Duration::from_secs(cfg.queries.refresh_interval);
    let vars = Variables::new(start, interval);

    let runner = WarehouseRunner::connect_lazy(&cfg.warehouse).unwrap_or_else(|e| {
        error!("Invalid warehouse configuration: {}", e);
        process::exit(1);
    });

    let exposition = Arc::new(PrometheusExposition::default());
    let registry = Arc::new(CollectorRegistry::new(exposition.clone()));
    let readiness = Readiness::default();
    let cancel = CancellationToken::new();

    let listener = TcpListener::bind(&cfg.server.listen_address)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to bind {}: {}", cfg.server.listen_address, e);
            process::exit(1);
        });

    let server_task = tokio::spawn(server::serve(
        listener,
        AppState {
            exposition,
            readiness: readiness.clone(),
        },
        cancel.clone(),
    ));

    let orchestrator = Orchestrator::new(
        cfg.queries.gauge_queries.clone(),
        registry,
        Arc::new(runner),
        Arc::new(OsFileSystem),
        vars,
        interval,
        readiness,
    );
    let refresh_task = tokio::spawn(orchestrator.run(cancel.clone()));

    info!("Starting refresh loop...");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Received Ctrl+C, shutting down...");
    cancel.cancel();

    if let Err(e) = refresh_task.await {
        error!("Refresh loop panicked: {}", e);
    }
    match server_task.await {
        Ok(Err(e)) => error!("Metrics server failed: {}", e),
        Err(e) => error!("Metrics server panicked: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
