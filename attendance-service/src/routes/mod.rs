use axum::{
    extract::Request,
    middleware,
    routing::{get, patch, post},
    Router,
};
use log::{info, warn};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::AppError;
use crate::handlers::event_handlers::{
    create_event, delete_event, get_event_details, get_rating, list_attendees, submit_rating,
    toggle_attendance, update_event,
};
use eventhub_shared::store::{dynamo::DynamoStore, EventStore, RatingStore, UserStore};

use eventhub_shared::auth::auth_middleware;

/// Router backed by DynamoDB, configured from the environment.
pub async fn create_router() -> Router {
    let store = Arc::new(DynamoStore::new().await);

    // API Gateway stages mount the API under /Prod unless told otherwise
    let prefix = match std::env::var("REMOVE_BASE_PATH") {
        Ok(v) if v.eq_ignore_ascii_case("true") => "",
        _ => "/Prod",
    };
    info!("Attendance routes mounted at '{}'", prefix);

    create_router_with_store(store, prefix)
}

/// Router over any store; tests pass a mock here.
pub fn create_router_with_store<S>(store: Arc<S>, prefix: &str) -> Router
where
    S: EventStore + RatingStore + UserStore + 'static,
{
    info!("Setting up API routes with prefix: '{}'", prefix);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    async fn logging_middleware(
        req: Request,
        next: axum::middleware::Next,
    ) -> impl axum::response::IntoResponse {
        info!(
            "Router received request: method={}, uri={}",
            req.method(),
            req.uri()
        );
        next.run(req).await
    }

    let event_routes = Router::new()
        .route("/events", post(create_event))
        .route(
            "/events/:id",
            get(get_event_details)
                .patch(update_event)
                .delete(delete_event),
        )
        .route("/events/:id/attendance", patch(toggle_attendance))
        .route("/events/:id/attendees", get(list_attendees))
        .route("/events/:id/rating", get(get_rating).put(submit_rating))
        .layer(middleware::from_fn(auth_middleware))
        .with_state(store);

    let router = if prefix.is_empty() {
        event_routes
            .layer(cors)
            .layer(middleware::from_fn(logging_middleware))
    } else {
        Router::new()
            .nest(prefix, event_routes)
            .layer(cors)
            .layer(middleware::from_fn(logging_middleware))
    };

    router.fallback(|req: Request| async move {
        warn!("Unmatched route {} {}", req.method(), req.uri());
        AppError::not_found(format!("No route for {} {}", req.method(), req.uri().path()))
    })
}
