use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::any::Any;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::handlers;
use crate::state::AppState;
use crate::utils::RelayError;

pub fn build_router(state: AppState) -> Router {
    // Public routes
    let public_routes = Router::new()
        .route("/", get(handlers::page::index))
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check));

    // QR login relay
    let qr_routes = Router::new()
        .route("/api/qr/create", post(handlers::qr::create_handler))
        .route("/api/qr/status/{sid}", get(handlers::qr::status_handler))
        .route("/api/qr/login/{sid}", post(handlers::qr::login_handler))
        .route("/api/qr/cookies/{sid}", get(handlers::qr::cookies_handler));

    Router::new()
        .merge(public_routes)
        .merge(qr_routes)
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    RelayError::Internal(format!("handler panicked: {}", detail)).into_response()
}
