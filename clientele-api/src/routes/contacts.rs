//! Contact REST API Routes
//!
//! Listing without a `client_id` or `lead_id` returns an empty array rather
//! than every contact in the tenant.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use clientele_core::{ContactPatch, NewContact, RecordId};
use serde_json::json;

use crate::error::ApiResult;
use crate::extractors::{JsonBody, PathId};
use crate::middleware::Principal;
use crate::params::ParentQuery;
use crate::state::AppState;

/// GET /?client_id=|lead_id=
pub async fn list_contacts(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ParentQuery>,
) -> ApiResult<impl IntoResponse> {
    let contacts = state
        .engine
        .list_contacts(&principal, query.parent())
        .await?;
    Ok(Json(contacts))
}

/// POST /
pub async fn create_contact(
    State(state): State<AppState>,
    principal: Principal,
    JsonBody(req): JsonBody<NewContact>,
) -> ApiResult<impl IntoResponse> {
    let contact = state.engine.create_contact(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": contact.contact.id }))))
}

/// PUT /:id
pub async fn update_contact(
    State(state): State<AppState>,
    principal: Principal,
    PathId(id): PathId<RecordId>,
    JsonBody(patch): JsonBody<ContactPatch>,
) -> ApiResult<impl IntoResponse> {
    state.engine.update_contact(&principal, id, patch).await?;
    Ok(Json(json!({ "message": "Contact updated" })))
}

/// DELETE /:id
pub async fn delete_contact(
    State(state): State<AppState>,
    principal: Principal,
    PathId(id): PathId<RecordId>,
) -> ApiResult<impl IntoResponse> {
    state.engine.delete_contact(&principal, id).await?;
    Ok(Json(json!({ "message": "Contact deleted" })))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_contacts).post(create_contact))
        .route("/:id", put(update_contact).delete(delete_contact))
}
