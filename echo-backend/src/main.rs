use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use tokio::sync::oneshot;

mod config;
mod controllers;
mod error;
mod kv;
mod ordering;
mod processor;
mod scheduler;
mod source;
mod tracker;
mod x;

use config::Config;
use processor::MentionProcessor;
use scheduler::{CycleMonitor, Scheduler};
use tracker::WatermarkTracker;
use x::XClient;

pub struct AppState {
    pub config: Arc<Config>,
    pub processor: Arc<MentionProcessor>,
    pub monitor: Arc<CycleMonitor>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    log::info!(
        "Gethen Echo v{} watching @{} ({})",
        controllers::health::VERSION,
        config.echo.target_username,
        config.scheduler.trigger.describe()
    );

    let store = match kv::create_kv_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            log::error!("Failed to initialize store: {}", e);
            std::process::exit(1);
        }
    };

    let client = match XClient::new(&config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::error!("Failed to create X client: {}", e);
            std::process::exit(1);
        }
    };
    match client.verify_target().await {
        Ok(user_id) => log::info!("X: Monitoring @{} (user ID {})", config.echo.target_username, user_id),
        // Not fatal: the API may be briefly unreachable at boot
        Err(e) => log::warn!("X: Could not verify @{}: {}", config.echo.target_username, e),
    }

    let echo_config = Arc::new(config.echo.clone());
    let tracker = Arc::new(WatermarkTracker::new(store, &echo_config));
    let processor = Arc::new(MentionProcessor::new(
        tracker,
        client.clone(),
        client,
        echo_config,
    ));
    let monitor = Arc::new(CycleMonitor::new());

    log::info!("Initializing scheduler");
    let scheduler = Arc::new(Scheduler::new(
        processor.clone(),
        monitor.clone(),
        config.scheduler.clone(),
    ));
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let scheduler_handle = tokio::spawn(scheduler.start(shutdown_rx));

    let bind_address = config.bind_address.clone();
    let port = config.port;
    log::info!("Starting HTTP server on {}:{}", bind_address, port);

    let server_config = config.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(AppState {
                config: Arc::clone(&server_config),
                processor: Arc::clone(&processor),
                monitor: Arc::clone(&monitor),
            }))
            .wrap(Logger::default())
            .configure(controllers::health::config)
            .configure(controllers::cycle::config)
            .configure(controllers::status::config)
    })
    .bind((bind_address.as_str(), port))?
    .run()
    .await;

    log::info!("HTTP server stopped, shutting down scheduler");
    let _ = shutdown_tx.send(());
    if let Err(e) = scheduler_handle.await {
        log::error!("Scheduler task failed: {}", e);
    }

    server
}
