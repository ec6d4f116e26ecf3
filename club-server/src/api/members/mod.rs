//! Member API 模块

mod handler;

use axum::{Router, routing::get};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/members", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list).post(handler::create))
        .route("/search", get(handler::search))
        .route("/{id}", get(handler::get_by_id).put(handler::update))
        .route(
            "/{id}/ledger",
            get(handler::ledger_history).post(handler::post_ledger),
        )
        .route("/{id}/sessions", get(handler::session_history))
        .route("/{id}/limits", get(handler::limits))
        .route("/{id}/fees", get(handler::fee_history))
}
