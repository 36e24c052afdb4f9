use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use cattle_backend::config::AppConfig;
use cattle_backend::inference::load_classifier;
use cattle_backend::pipeline::DiagnosisPipeline;
use cattle_backend::routes::{AppState, configure_routes};
use std::env;
use std::io;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::load().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;
    let model_format = config.model.resolved_format().map_err(|e| {
        log::error!("{}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let classifier = load_classifier(&config.model.path, model_format).map_err(|e| {
        log::error!("Failed to load model at startup: {}", e);
        io::Error::other(format!("Model loading failed: {}", e))
    })?;
    log::info!("Model loaded successfully ({})", classifier.format());

    let upload_dir = config.uploads.dir.clone();
    std::fs::create_dir_all(&upload_dir)?;
    log::info!("Uploads are stored in {}", upload_dir.display());

    let state = web::Data::new(AppState::new(
        DiagnosisPipeline::new(classifier),
        upload_dir.clone(),
    ));

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .wrap(actix_web::middleware::Logger::default())
            .app_data(state.clone())
            .configure(|cfg| configure_routes(cfg, upload_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
