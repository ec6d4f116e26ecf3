//! Redemption API 模块

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/redemptions", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/request", post(handler::request))
        .route("/{id}/confirm", post(handler::confirm))
        .route("/assign", post(handler::assign))
        .route("/session/{id}", get(handler::by_session))
}
