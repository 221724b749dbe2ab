mod auth;
mod config;
mod errors;
mod jobs;
mod pipeline;
mod routes;
mod storage;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use auth::middleware::ApiTokenMiddleware;
use config::AppConfig;
use jobs::runner::JobRunner;
use pipeline::executor::Collaborator;
use pipeline::host::SystemHost;
use pipeline::roop::RoopCollaborator;
use routes::{configure_routes, JOB_ID_HEADER};
use std::env;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::load().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    std::fs::create_dir_all(&config.storage.workspace_dir)?;
    log::info!(
        "Job workspace: {}",
        config.storage.workspace_dir.canonicalize()?.display()
    );
    if !config.server.frontend_dir.is_dir() {
        log::warn!(
            "Frontend directory {} not found, only the API will be served",
            config.server.frontend_dir.display()
        );
    }

    let collaborator = Arc::new(RoopCollaborator::new(
        config.pipeline.python.clone(),
        config.pipeline.script.clone(),
    ));
    if !collaborator.script().is_file() {
        log::warn!(
            "Pipeline script {} not found, jobs will fail until it is installed",
            collaborator.script().display()
        );
    }
    let available_providers = collaborator.available_providers().await;
    log::info!("Execution providers available: {:?}", available_providers);

    let runner = JobRunner::from_config(
        &config,
        collaborator,
        Arc::new(SystemHost::new(config.pipeline.memory_ceiling_gib)),
        available_providers,
    );

    let auth_middleware = ApiTokenMiddleware::new(config.server.api_token.as_deref());
    if auth_middleware.is_enabled() {
        log::info!("API token authentication enabled");
    } else {
        log::warn!("SWAP_API_TOKEN is not set; the API is open to anyone who can reach it");
    }

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    let frontend_dir = config.server.frontend_dir.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(auth_middleware.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .expose_headers(vec![JOB_ID_HEADER])
                    .max_age(3600),
            )
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(runner.clone()))
            .configure(|cfg| configure_routes(cfg, frontend_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
