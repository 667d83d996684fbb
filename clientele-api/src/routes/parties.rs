//! Client and Lead REST API Routes
//!
//! One set of handlers serves `/api/clients` and `/api/leads`; the party
//! kind arrives as a request extension set where the router is mounted.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use clientele_core::{NewParty, PartyKind, PartyPatch, RecordId, UserId};
use clientele_engine::{NotificationOutcome, PartyListing};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ApiResult;
use crate::extractors::{JsonBody, PathId};
use crate::middleware::Principal;
use crate::params::ListQuery;
use crate::state::AppState;

// ============================================================================
// REQUEST / RESPONSE SHAPES
// ============================================================================

/// Body of `PUT /{id}/assign`. Leads accept `null` to clear the assignee.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssignRequest {
    pub assigned_to: Option<UserId>,
}

/// `{"clients": [...], "total": .., ...}` keyed by the kind's plural.
fn listing_body(listing: PartyListing) -> ApiResult<Value> {
    let mut body = Map::new();
    body.insert(
        listing.kind.plural().to_string(),
        serde_json::to_value(&listing.items)?,
    );
    body.insert("total".to_string(), json!(listing.total));
    body.insert("page".to_string(), json!(listing.page.page));
    body.insert("per_page".to_string(), json!(listing.page.per_page));
    body.insert("sort_order".to_string(), json!(listing.sort.as_str()));
    body.insert(
        "activity_filter".to_string(),
        json!(listing.activity.as_str()),
    );
    if let Some(email) = listing.user_email {
        body.insert("user_email".to_string(), json!(email));
    }
    Ok(Value::Object(body))
}

fn label(kind: PartyKind) -> &'static str {
    match kind {
        PartyKind::Client => "Client",
        PartyKind::Lead => "Lead",
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET / - Caller's own records, paged
pub async fn list_parties(
    State(state): State<AppState>,
    Extension(kind): Extension<PartyKind>,
    principal: Principal,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let params = query.to_params(state.api.default_per_page);
    let listing = state.engine.list_parties(&principal, kind, &params).await?;
    Ok(Json(listing_body(listing)?))
}

/// GET /all - Every record in the tenant (admin)
pub async fn list_all_parties(
    State(state): State<AppState>,
    Extension(kind): Extension<PartyKind>,
    principal: Principal,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let params = query.to_params(state.api.default_per_page);
    let listing = state
        .engine
        .list_all_parties(&principal, kind, &params, query.user_email())
        .await?;
    Ok(Json(listing_body(listing)?))
}

/// GET /assigned - Caller's records, unpaged
pub async fn list_assigned_parties(
    State(state): State<AppState>,
    Extension(kind): Extension<PartyKind>,
    principal: Principal,
) -> ApiResult<impl IntoResponse> {
    let items = state.engine.list_assigned_parties(&principal, kind).await?;
    Ok(Json(items))
}

/// POST / - Create
pub async fn create_party(
    State(state): State<AppState>,
    Extension(kind): Extension<PartyKind>,
    principal: Principal,
    JsonBody(req): JsonBody<NewParty>,
) -> ApiResult<impl IntoResponse> {
    let party = state.engine.create_party(&principal, kind, req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": party.id }))))
}

/// GET /:id - Read one; records a view in the activity log
pub async fn get_party(
    State(state): State<AppState>,
    Extension(kind): Extension<PartyKind>,
    principal: Principal,
    PathId(id): PathId<RecordId>,
) -> ApiResult<impl IntoResponse> {
    let party = state.engine.get_party(&principal, kind, id).await?;
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(party)))
}

/// PUT /:id - Partial update
pub async fn update_party(
    State(state): State<AppState>,
    Extension(kind): Extension<PartyKind>,
    principal: Principal,
    PathId(id): PathId<RecordId>,
    JsonBody(patch): JsonBody<PartyPatch>,
) -> ApiResult<impl IntoResponse> {
    let party = state
        .engine
        .update_party(&principal, kind, id, patch)
        .await?;
    Ok(Json(json!({ "id": party.id })))
}

/// DELETE /:id - Soft delete
pub async fn delete_party(
    State(state): State<AppState>,
    Extension(kind): Extension<PartyKind>,
    principal: Principal,
    PathId(id): PathId<RecordId>,
) -> ApiResult<impl IntoResponse> {
    state.engine.delete_party(&principal, kind, id).await?;
    Ok(Json(json!({
        "message": format!("{} soft-deleted successfully", label(kind))
    })))
}

/// PUT /:id/assign - Reassign (admin)
pub async fn assign_party(
    State(state): State<AppState>,
    Extension(kind): Extension<PartyKind>,
    principal: Principal,
    PathId(id): PathId<RecordId>,
    JsonBody(req): JsonBody<AssignRequest>,
) -> ApiResult<impl IntoResponse> {
    let report = state
        .engine
        .assign_party(&principal, kind, id, req.assigned_to)
        .await?;
    if let NotificationOutcome::Failed { reason } = &report.notification {
        tracing::warn!(entity_id = %id, reason = %reason, "Assignment saved, notification not delivered");
    }
    Ok(Json(json!({
        "message": format!("{} assigned successfully", label(kind))
    })))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Routes for one party kind. Mount with an `Extension(PartyKind)` layer.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_parties).post(create_party))
        .route("/all", get(list_all_parties))
        .route("/assigned", get(list_assigned_parties))
        .route("/:id", get(get_party).put(update_party).delete(delete_party))
        .route("/:id/assign", put(assign_party))
}
