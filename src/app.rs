use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, post}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/healthz", get(handlers::healthz))
        .route("/auth/signup", post(handlers::sign_up))
        .route("/auth/signin", post(handlers::sign_in))
        .route("/auth/signout", post(handlers::sign_out))
        .route("/habits", post(handlers::add_habit))
        .route("/habits/:id/today", post(handlers::toggle_today))
        .route("/habits/:id/delete", post(handlers::delete_habit))
        .route("/api/state", get(handlers::get_state))
        .route("/api/habits", post(handlers::api_add_habit))
        .route("/api/habits/:id/today", post(handlers::api_toggle_today))
        .with_state(state)
}
