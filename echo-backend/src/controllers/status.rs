use actix_web::{web, HttpResponse, Responder};
use echo_types::{RpcResponse, ServiceStatus};

use crate::error::StoreError;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/status").route(web::get().to(get_status)));
}

async fn build_status(state: &AppState) -> Result<ServiceStatus, StoreError> {
    let tracker = state.processor.tracker();
    let watermark = tracker.get_watermark().await?;
    let retained_records = tracker.retained_count().await?;
    let snapshot = state.monitor.snapshot();

    Ok(ServiceStatus {
        running: true,
        uptime_secs: state.monitor.uptime_secs(),
        target_username: state.config.echo.target_username.clone(),
        schedule: state.config.scheduler.trigger.describe(),
        store_backend: tracker.backend_name().to_string(),
        watermark,
        retained_records,
        last_cycle_at: snapshot.last_cycle_at.map(|at| at.to_rfc3339()),
        last_cycle: snapshot.last_cycle,
        last_error: snapshot.last_error,
    })
}

async fn get_status(state: web::Data<AppState>) -> impl Responder {
    match build_status(&state).await {
        Ok(status) => HttpResponse::Ok().json(RpcResponse::ok(status)),
        Err(e) => {
            log::error!("Failed to read status: {}", e);
            HttpResponse::ServiceUnavailable().json(RpcResponse::<ServiceStatus>::err(e.to_string()))
        }
    }
}
