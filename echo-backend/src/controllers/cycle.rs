//! Manual triggers: run a processing cycle, sweep expired records.

use actix_web::{web, HttpResponse, Responder};
use echo_types::{CleanupReport, CycleResult, RpcResponse};

use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/cycle/run").route(web::post().to(run_cycle)));
    cfg.service(web::resource("/api/records/cleanup").route(web::post().to(cleanup_records)));
}

async fn run_cycle(state: web::Data<AppState>) -> impl Responder {
    log::info!("Manual cycle triggered");
    let outcome = state.processor.run_cycle().await;
    state.monitor.record(&outcome);

    match outcome {
        Ok(result) => HttpResponse::Ok().json(RpcResponse::ok(result)),
        Err(e) => {
            log::error!("Manual cycle failed ({}): {}", e.code(), e);
            HttpResponse::InternalServerError()
                .json(RpcResponse::<CycleResult>::err(format!("{}: {}", e.code(), e)))
        }
    }
}

async fn cleanup_records(state: web::Data<AppState>) -> impl Responder {
    match state.processor.tracker().cleanup().await {
        Ok(report) => HttpResponse::Ok().json(RpcResponse::ok(report)),
        Err(e) => {
            log::error!("Record cleanup failed: {}", e);
            HttpResponse::InternalServerError().json(RpcResponse::<CleanupReport>::err(e.to_string()))
        }
    }
}
