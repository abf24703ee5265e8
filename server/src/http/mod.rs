pub mod health;
pub mod ingress;
pub mod intake;
pub mod query;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assembles the HTTP/JSON surface (§6). Routing, schema validation of
/// request bodies beyond the Position fields, and everything about
/// authentication/vehicle-CRUD stay external per §1 — this router only
/// wires the core's own operations to paths.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/vehicles/:id/location", post(ingress::push_single).get(query::get_current))
        .route("/api/vehicles/batch/locations", post(ingress::push_batch))
        .route("/api/vehicles/:id/history", get(query::get_history))
        .route("/api/nearby", get(query::get_nearby))
        .route("/api/reports", post(intake::submit_report))
        .route("/api/sos", post(intake::submit_sos))
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/metrics", get(health::metrics))
        .route("/ws", get(crate::ws::upgrade))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
}
