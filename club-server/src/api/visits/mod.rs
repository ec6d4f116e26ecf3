//! Visit Session API 模块

mod handler;

use axum::{Router, routing::post};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/visits", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/check-in", post(handler::check_in))
        .route("/{id}/check-out", post(handler::check_out))
        .route("/sweep", post(handler::sweep))
}
