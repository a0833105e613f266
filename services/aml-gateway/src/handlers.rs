use crate::errors::GatewayError;
use crate::facade::{CheckFacade, CheckOutcome, ReportDownload};
use crate::intake::IntakeService;
use crate::metrics::metrics_handler;
use crate::models::*;
use actix_web::{http::header, web, HttpResponse};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<IntakeService>,
    pub facade: Arc<CheckFacade>,
}

// ===== Health Check =====
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ===== Metrics =====
pub async fn metrics() -> HttpResponse {
    match metrics_handler() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

// ===== Submit Check =====
pub async fn check_address(
    req: web::Json<CheckAddressRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let request = req.into_inner();
    request
        .validate()
        .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

    let check = state
        .intake
        .submit(&request.address, &request.currency)
        .await?;
    let outcome = state.facade.await_outcome(check.id).await?;

    outcome_response(outcome)
}

// ===== Poll Check =====
pub async fn get_check(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let raw = path.into_inner();
    let check_id = Uuid::parse_str(&raw).map_err(|_| GatewayError::NotFound(raw))?;

    outcome_response(state.facade.status(check_id)?)
}

// ===== Download Report =====
pub async fn download_report(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    match state.facade.open_report(&path.into_inner()).await? {
        ReportDownload::Redirect(url) => Ok(HttpResponse::Found()
            .insert_header((header::LOCATION, url))
            .finish()),
        ReportDownload::Inline(blob) => Ok(HttpResponse::Ok()
            .content_type(blob.content_type)
            .insert_header((
                header::CONTENT_DISPOSITION,
                "inline; filename=\"aml-report.pdf\"",
            ))
            .body(blob.data)),
    }
}

fn outcome_response(outcome: CheckOutcome) -> Result<HttpResponse, GatewayError> {
    match outcome {
        CheckOutcome::Completed { check, report_url } => {
            Ok(HttpResponse::Ok().json(CheckSuccessResponse {
                status: "success".to_string(),
                risk_score: check.risk_score.map(|s| s.score()).unwrap_or_default(),
                risk_level: check
                    .risk_level
                    .map(|l| l.as_str().to_string())
                    .unwrap_or_default(),
                categories: check.categories,
                sanctions: SanctionsResponse {
                    hit: check.sanctions.hit,
                    identifications: check.sanctions.identifications,
                },
                pdf_url: report_url,
            }))
        }
        CheckOutcome::Failed { check } => Err(GatewayError::CheckFailed(
            check.error_message.unwrap_or_default(),
        )),
        CheckOutcome::Processing { poll_url, .. } => {
            Ok(HttpResponse::Accepted().json(CheckProcessingResponse::new(poll_url)))
        }
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1")
            .route("/check-address", web::post().to(check_address))
            .route("/check-address/{check_id}", web::get().to(get_check))
            .route("/report/{token}", web::get().to(download_report))
            .route("/health", web::get().to(health_check)),
    )
    .route("/metrics", web::get().to(metrics));
}
