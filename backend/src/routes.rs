use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::http::header::{self, ContentType};
use actix_web::{HttpRequest, HttpResponse, ResponseError, web};
use log::{error, info};
use shared::{Diagnosis, HealthResponse};
use std::path::PathBuf;
use strum::IntoEnumIterator;

use crate::ingest::{IngestError, extract_upload};
use crate::mapper::DiagnosisResult;
use crate::pipeline::{DiagnosisPipeline, PipelineError};
use crate::render::{PredictionView, index_page, static_path};

pub struct AppState {
    pipeline: DiagnosisPipeline,
    upload_dir: PathBuf,
}

impl AppState {
    pub fn new(pipeline: DiagnosisPipeline, upload_dir: PathBuf) -> Self {
        Self {
            pipeline,
            upload_dir,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("Prediction failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Worker pool unavailable: {0}")]
    Blocking(#[from] BlockingError),
}

impl ResponseError for PredictError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type(ContentType::plaintext())
            .body(self.to_string())
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, upload_dir: PathBuf) {
    cfg.service(web::resource("/").route(web::get().to(home)))
        .service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(Files::new("/static", upload_dir));
}

async fn home() -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(index_page(None))
}

/// Whether the client asked for the JSON report instead of the HTML page.
fn wants_json(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

async fn predict(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, PredictError> {
    let upload = match extract_upload(payload).await {
        Ok(upload) => upload,
        Err(e) if e.is_user_facing() => {
            info!("Rejected upload: {}", e);
            return Ok(HttpResponse::Ok()
                .content_type(ContentType::plaintext())
                .body(e.to_string()));
        }
        Err(e) => {
            error!("Failed to read upload: {}", e);
            return Err(e.into());
        }
    };

    let file_name = upload.file_name.clone();
    let pipeline = state.pipeline.clone();
    let upload_dir = state.upload_dir.clone();

    let outcome = web::block(move || -> Result<DiagnosisResult, PredictError> {
        let saved = upload.persist(&upload_dir)?;
        info!("Saved upload {} to {}", upload.file_name, saved.display());
        Ok(pipeline.diagnose(&upload.bytes)?)
    })
    .await
    .map_err(PredictError::from)
    .and_then(|result| result);

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            error!("Prediction for {} failed: {}", file_name, e);
            return Err(e);
        }
    };
    info!(
        "{} -> {} (class {}, score {:.3})",
        file_name,
        result.label(),
        result.class_index,
        result.confidence
    );

    if wants_json(&req) {
        return Ok(HttpResponse::Ok().json(result.to_report()));
    }

    let image_path = static_path(&file_name);
    let page = index_page(Some(&PredictionView {
        result: &result,
        image_path: &image_path,
    }));
    Ok(HttpResponse::Ok().content_type(ContentType::html()).body(page))
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ready".into(),
        model_format: state.pipeline.model_format().to_string(),
        classes: Diagnosis::iter().map(|d| d.label().to_string()).collect(),
    })
}
