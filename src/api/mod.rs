pub mod auth;
mod books;
mod catalog;
mod categories;
pub mod error;
pub mod metrics;
mod orders;
mod profile;
pub mod rate_limit;
mod validation;
mod videos;

#[cfg(test)]
pub(crate) mod test_support;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::uploads::PUBLIC_PREFIX;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.config.uploads.max_file_size);

    // Credential endpoints (tighter rate limit)
    let credential_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    let account_routes = Router::new()
        .route("/logout", post(auth::logout))
        .route("/profile", get(auth::get_profile).put(auth::update_profile))
        .route("/change-password", post(auth::change_password))
        .route(
            "/favorites",
            get(profile::list_favorites).post(profile::add_favorite),
        )
        .route("/favorites/:item_id", delete(profile::remove_favorite))
        .route("/history", post(profile::record_history));

    // Authentication is enforced per handler through the `User` extractors,
    // so anonymous callers can still browse public items.
    let api_routes = Router::new()
        // Books
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/upload",
            post(books::upload_book).layer(upload_limit.clone()),
        )
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route("/books/:id/view", post(books::view_book))
        .route("/books/:id/rate", post(books::rate_book))
        // Videos
        .route("/videos", get(videos::list_videos).post(videos::create_video))
        .route(
            "/videos/upload",
            post(videos::upload_video).layer(upload_limit),
        )
        .route(
            "/videos/:id",
            get(videos::get_video)
                .put(videos::update_video)
                .delete(videos::delete_video),
        )
        .route("/videos/:id/view", post(videos::view_video))
        .route("/videos/:id/rate", post(videos::rate_video))
        // Categories
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        // Orders
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/status", axum::routing::put(orders::update_order_status))
        .nest("/auth", account_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ))
        .nest("/auth", credential_routes);

    let uploads = ServeDir::new(state.uploads.root());

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api", api_routes)
        .nest_service(PUBLIC_PREFIX, uploads)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state.config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if parsed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(parsed)
    }
}

async fn health_check() -> &'static str {
    "OK"
}
