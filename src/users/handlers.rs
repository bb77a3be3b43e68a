use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    state::AppState,
    store::Filter,
    users::{
        dto::{CountResponse, CreateUserRequest, DeleteResponse, RecordOutcome, UpdateOutcome},
        repo_types::PublicUser,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user).get(list_users).delete(delete_users))
        .route("/users/count", get(count_users))
        .route("/users/:id", get(get_user).patch(update_user))
}

fn status_for(code: Option<&str>) -> StatusCode {
    match code {
        None => StatusCode::OK,
        Some("not_found") => StatusCode::NOT_FOUND,
        Some("validation") | Some("empty_update") => StatusCode::BAD_REQUEST,
        Some("weak_credential") => StatusCode::UNPROCESSABLE_ENTITY,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Splits `limit` off the query string and parses the rest as a filter.
fn parse_query(
    params: &HashMap<String, String>,
) -> Result<(Filter, Option<i64>), (StatusCode, String)> {
    let limit = match params.get("limit") {
        Some(raw) => Some(
            raw.parse::<i64>()
                .ok()
                .filter(|n| *n >= 0)
                .ok_or((StatusCode::BAD_REQUEST, "Invalid limit".to_string()))?,
        ),
        None => None,
    };
    let filter = Filter::from_pairs(
        params
            .iter()
            .filter(|(k, _)| k.as_str() != "limit")
            .map(|(k, v)| (k.as_str(), v.as_str())),
    )
    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok((filter, limit))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> (StatusCode, Json<RecordOutcome>) {
    let outcome = state.users.create(payload).await;
    let status = match outcome.code {
        None => StatusCode::CREATED,
        code => status_for(code),
    };
    (status, Json(outcome))
}

#[instrument(skip(state, body))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<Map<String, Value>>,
) -> (StatusCode, Json<UpdateOutcome>) {
    let outcome = state.users.update(id, &body).await;
    (status_for(outcome.code), Json(outcome))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    state
        .users
        .get_one(&Filter::by_id(id))
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "User not found".into()))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<PublicUser>>, (StatusCode, String)> {
    let (filter, limit) = parse_query(&params)?;
    Ok(Json(state.users.list_where(&filter, limit).await))
}

#[instrument(skip(state))]
pub async fn count_users(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<CountResponse>, (StatusCode, String)> {
    let (filter, _) = parse_query(&params)?;
    Ok(Json(CountResponse {
        count: state.users.count_where(&filter).await,
    }))
}

#[instrument(skip(state))]
pub async fn delete_users(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<DeleteResponse>, (StatusCode, String)> {
    let (filter, _) = parse_query(&params)?;
    if filter.is_empty() {
        warn!("refusing unfiltered delete");
        return Err((
            StatusCode::BAD_REQUEST,
            "Refusing to delete without a filter".into(),
        ));
    }
    Ok(Json(DeleteResponse {
        success: state.users.delete_where(&filter).await,
    }))
}
