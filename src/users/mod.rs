use crate::state::AppState;
use axum::Router;

pub mod diff;
pub mod dto;
pub mod errors;
pub mod handlers;
pub mod password;
pub mod policy;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::user_routes())
}
