//! Project REST API Routes

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clientele_core::{NewProject, PartyRef, ProjectPatch, RecordId};
use clientele_engine::ProjectListing;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::extractors::{JsonBody, PathId};
use crate::middleware::Principal;
use crate::params::ListQuery;
use crate::state::AppState;

fn listing_body(listing: ProjectListing) -> ApiResult<Value> {
    Ok(json!({
        "projects": serde_json::to_value(&listing.items)?,
        "total": listing.total,
        "page": listing.page.page,
        "per_page": listing.page.per_page,
        "sort_order": listing.sort.as_str(),
        "activity_filter": listing.activity.as_str(),
    }))
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET / - Projects the caller created, paged
pub async fn list_projects(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let params = query.to_params(state.api.default_per_page);
    let listing = state.engine.list_projects(&principal, &params).await?;
    Ok(Json(listing_body(listing)?))
}

/// GET /all - Every project in the tenant (admin)
pub async fn list_all_projects(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let params = query.to_params(state.api.default_per_page);
    let listing = state.engine.list_all_projects(&principal, &params).await?;
    Ok(Json(listing_body(listing)?))
}

/// GET /by-client/:id
pub async fn list_by_client(
    State(state): State<AppState>,
    principal: Principal,
    PathId(id): PathId<RecordId>,
) -> ApiResult<impl IntoResponse> {
    let items = state
        .engine
        .list_projects_by_party(&principal, PartyRef::client(id))
        .await?;
    Ok(Json(items))
}

/// GET /by-lead/:id
pub async fn list_by_lead(
    State(state): State<AppState>,
    principal: Principal,
    PathId(id): PathId<RecordId>,
) -> ApiResult<impl IntoResponse> {
    let items = state
        .engine
        .list_projects_by_party(&principal, PartyRef::lead(id))
        .await?;
    Ok(Json(items))
}

/// POST / - Create; responds with the stored project
pub async fn create_project(
    State(state): State<AppState>,
    principal: Principal,
    JsonBody(req): JsonBody<NewProject>,
) -> ApiResult<impl IntoResponse> {
    let project = state.engine.create_project(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /:id
pub async fn get_project(
    State(state): State<AppState>,
    principal: Principal,
    PathId(id): PathId<RecordId>,
) -> ApiResult<impl IntoResponse> {
    let project = state.engine.get_project(&principal, id).await?;
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(project)))
}

/// PUT /:id
pub async fn update_project(
    State(state): State<AppState>,
    principal: Principal,
    PathId(id): PathId<RecordId>,
    JsonBody(patch): JsonBody<ProjectPatch>,
) -> ApiResult<impl IntoResponse> {
    let project = state.engine.update_project(&principal, id, patch).await?;
    Ok(Json(project))
}

/// DELETE /:id - Hard delete
pub async fn delete_project(
    State(state): State<AppState>,
    principal: Principal,
    PathId(id): PathId<RecordId>,
) -> ApiResult<impl IntoResponse> {
    state.engine.delete_project(&principal, id).await?;
    Ok(Json(json!({ "message": "Project deleted" })))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/all", get(list_all_projects))
        .route("/by-client/:id", get(list_by_client))
        .route("/by-lead/:id", get(list_by_lead))
        .route(
            "/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
}
