pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::UploadConfig;
use crate::services::conversion::ConversionService;
use crate::services::format::TargetFormat;
use crate::services::rate_limiter::UploadRateLimiter;
use crate::services::storage::LocalStorage;
use crate::services::transcoder::Transcoder;
use crate::services::upload_service::UploadService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_audio,
        api::handlers::files::serve_upload,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::upload::UploadResponse,
            api::handlers::upload::UploadForm,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "uploads", description = "Audio upload and retrieval"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<LocalStorage>,
    pub upload_service: Arc<UploadService>,
    pub rate_limiter: Arc<UploadRateLimiter>,
    pub transcoder: Arc<dyn Transcoder>,
    pub config: UploadConfig,
}

impl AppState {
    pub fn new(
        config: UploadConfig,
        storage: Arc<LocalStorage>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        let conversion = Arc::new(ConversionService::new(
            storage.clone(),
            transcoder,
            config.max_concurrent_transcodes,
            TargetFormat::Mp3,
        ));
        let upload_service = Arc::new(UploadService::new(
            storage.clone(),
            conversion.clone(),
            config.max_file_size,
        ));
        let rate_limiter = Arc::new(UploadRateLimiter::new(
            config.rate_limit_max_requests,
            config.rate_limit_window(),
        ));

        Self {
            storage,
            upload_service,
            rate_limiter,
            transcoder: conversion.transcoder().clone(),
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let files_route = format!("/{}/:filename", state.config.public_mount);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get(api::middleware::request_id::REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            tracing::info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                tracing::info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/upload",
            post(api::handlers::upload::upload_audio)
                .layer(DefaultBodyLimit::max(
                    state.config.max_file_size + MULTIPART_OVERHEAD,
                ))
                .layer(from_fn_with_state(
                    state.rate_limiter.clone(),
                    api::middleware::rate_limit::rate_limit_middleware,
                )),
        )
        .route(&files_route, get(api::handlers::files::serve_upload))
        .layer(cors_layer(&state.config))
        .layer(trace_layer)
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}

fn cors_layer(config: &UploadConfig) -> CorsLayer {
    let origins = if config.cors_allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            config
                .cors_allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
}
