//! HTTP round trips through the full router against the in-memory store.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use clientele_api::{create_router, ApiConfig, AppState, AuthConfig, Claims, JwtSecret};
use clientele_core::{Clock, CrmResult, PartyKind, Role, TenantContext, TenantId};
use clientele_test_utils::World;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "route_test_secret";
const T1: TenantId = TenantId::new(1);

fn app(world: &World) -> Router {
    let auth = AuthConfig::new(JwtSecret::new(SECRET).unwrap()).with_clock(Arc::new(world.clock));
    create_router(AppState::new(world.engine(), auth, ApiConfig::default()))
}

fn token(world: &World, ctx: &TenantContext) -> String {
    let now = world.now().timestamp();
    let claims = Claims {
        sub: ctx.user_id.to_string(),
        tenant_id: ctx.tenant_id.get(),
        iat: now,
        exp: now + 3600,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

struct Reply {
    status: StatusCode,
    cache_control: Option<String>,
    body: Value,
}

async fn send(app: &Router, method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Reply {
    send_text(app, method, uri, bearer, body.map(|json| json.to_string())).await
}

/// Like `send`, with the body passed through verbatim as `application/json`.
async fn send_text(
    app: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<String>,
) -> Reply {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(text) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(text))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cache_control = response
        .headers()
        .get(header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| json!(String::from_utf8_lossy(&bytes)))
    };
    Reply {
        status,
        cache_control,
        body,
    }
}

// ============================================================================
// AUTHENTICATION
// ============================================================================

#[tokio::test]
async fn test_api_requires_bearer_token() {
    let world = World::new();
    let app = app(&world);

    let reply = send(&app, Method::GET, "/api/clients", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert!(reply.body["error"].is_string());

    let reply = send(&app, Method::GET, "/api/leads", Some("not.a.jwt"), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_is_public() {
    let world = World::new();
    let app = app(&world);

    let reply = send(&app, Method::GET, "/health/ping", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = send(&app, Method::GET, "/health/ready", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "healthy");
}

#[tokio::test]
async fn test_inactive_user_token_is_rejected() -> CrmResult<()> {
    let world = World::new();
    let app = app(&world);
    let gone = world.add_inactive_user(T1, "gone@t1.example").await?;
    let ctx = TenantContext::new(T1, gone, "gone@t1.example");

    let reply = send(&app, Method::GET, "/api/clients", Some(&token(&world, &ctx)), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_expired_token_is_rejected() -> CrmResult<()> {
    let world = World::new();
    let app = app(&world);
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    let claims = Claims {
        sub: a.user_id.to_string(),
        tenant_id: 1,
        iat: 0,
        exp: world.clock.now().timestamp() - 3600,
    };
    let stale = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    let reply = send(&app, Method::GET, "/api/clients", Some(&stale), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

// ============================================================================
// CLIENTS AND LEADS
// ============================================================================

#[tokio::test]
async fn test_list_echoes_normalised_parameters() -> CrmResult<()> {
    let world = World::new();
    let app = app(&world);
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    world.party(PartyKind::Client, &a).named("Acme Tank").insert().await?;
    let token = token(&world, &a);

    let reply = send(
        &app,
        Method::GET,
        "/api/clients?page=abc&per_page=-3&sort=bogus&activity_filter=sleepy",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["total"], 1);
    assert_eq!(reply.body["page"], 1);
    assert_eq!(reply.body["per_page"], 20);
    assert_eq!(reply.body["sort_order"], "newest");
    assert_eq!(reply.body["activity_filter"], "all");
    assert_eq!(reply.body["clients"][0]["name"], "Acme Tank");
    assert_eq!(reply.body["clients"][0]["assigned_to_name"], "a@t1.example");
    assert_eq!(reply.body["clients"][0]["interaction_count"], 0);

    let leads = send(&app, Method::GET, "/api/leads", Some(&token), None).await;
    assert_eq!(leads.body["leads"], json!([]));
    Ok(())
}

#[tokio::test]
async fn test_party_crud_round_trip() -> CrmResult<()> {
    let world = World::new();
    let app = app(&world);
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    let token = token(&world, &a);

    let created = send(
        &app,
        Method::POST,
        "/api/leads",
        Some(&token),
        Some(json!({ "name": "Ridge Pipe", "type": "Pipe", "phone": "(555) 010-2000" })),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.body["id"].as_i64().unwrap();

    let fetched = send(&app, Method::GET, &format!("/api/leads/{id}"), Some(&token), None).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.cache_control.as_deref(), Some("no-store"));
    assert_eq!(fetched.body["type"], "Pipe");
    assert_eq!(fetched.body["lead_status"], "open");

    let updated = send(
        &app,
        Method::PUT,
        &format!("/api/leads/{id}"),
        Some(&token),
        Some(json!({ "lead_status": "converted" })),
    )
    .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["id"], id);

    let fetched = send(&app, Method::GET, &format!("/api/leads/{id}"), Some(&token), None).await;
    assert_eq!(fetched.body["lead_status"], "converted");
    assert!(fetched.body["converted_on"].is_string());

    let deleted = send(&app, Method::DELETE, &format!("/api/leads/{id}"), Some(&token), None).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["message"], "Lead soft-deleted successfully");

    let gone = send(&app, Method::GET, &format!("/api/leads/{id}"), Some(&token), None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    assert_eq!(gone.body["error"], "Lead not found");
    Ok(())
}

#[tokio::test]
async fn test_create_without_name_is_bad_request() -> CrmResult<()> {
    let world = World::new();
    let app = app(&world);
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    let token = token(&world, &a);

    let reply = send(&app, Method::POST, "/api/clients", Some(&token), Some(json!({ "name": "  " }))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(
        &app,
        Method::POST,
        "/api/clients",
        Some(&token),
        Some(json!({ "name": "Acme", "type": "Spaceship" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_unreadable_body_is_json_bad_request() -> CrmResult<()> {
    let world = World::new();
    let app = app(&world);
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    let token = token(&world, &a);

    for body in [r#"{"name": 5}"#, r#"{"name": "x""#] {
        let reply = send_text(&app, Method::POST, "/api/clients", Some(&token), Some(body.to_string())).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "body {body}");
        assert!(reply.body["error"].is_string(), "body {body}: {:?}", reply.body);
    }

    let reply = send_text(
        &app,
        Method::PUT,
        "/api/projects/not-a-number",
        Some(&token),
        Some("{}".to_string()),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body["error"].is_string());
    Ok(())
}

#[tokio::test]
async fn test_other_users_record_is_not_found() -> CrmResult<()> {
    let world = World::new();
    let app = app(&world);
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    let b = world.add_user(T1, "b@t1.example", &[Role::User]).await?;
    let c = world.party(PartyKind::Client, &a).insert().await?;

    let reply = send(
        &app,
        Method::GET,
        &format!("/api/clients/{}", c.id),
        Some(&token(&world, &b)),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["error"], "Client not found");
    Ok(())
}

#[tokio::test]
async fn test_all_view_is_admin_only() -> CrmResult<()> {
    let world = World::new();
    let app = app(&world);
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    let admin = world.add_admin(T1, "admin@t1.example").await?;
    world.party(PartyKind::Client, &a).insert().await?;

    let denied = send(&app, Method::GET, "/api/clients/all", Some(&token(&world, &a)), None).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.body["error"], "Forbidden");

    let allowed = send(
        &app,
        Method::GET,
        "/api/clients/all?user_email=A@T1.example",
        Some(&token(&world, &admin)),
        None,
    )
    .await;
    assert_eq!(allowed.status, StatusCode::OK);
    assert_eq!(allowed.body["total"], 1);
    assert_eq!(allowed.body["user_email"], "A@T1.example");
    Ok(())
}

#[tokio::test]
async fn test_assignment_flow() -> CrmResult<()> {
    let world = World::new();
    let app = app(&world);
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    let b = world.add_user(T1, "b@t1.example", &[Role::User]).await?;
    let admin = world.add_admin(T1, "admin@t1.example").await?;
    let c = world.party(PartyKind::Client, &a).insert().await?;
    let admin_token = token(&world, &admin);
    let uri = format!("/api/clients/{}/assign", c.id);

    let missing = send(&app, Method::PUT, &uri, Some(&admin_token), Some(json!({}))).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let by_user = send(
        &app,
        Method::PUT,
        &uri,
        Some(&token(&world, &a)),
        Some(json!({ "assigned_to": b.user_id })),
    )
    .await;
    assert_eq!(by_user.status, StatusCode::FORBIDDEN);

    let assigned = send(
        &app,
        Method::PUT,
        &uri,
        Some(&admin_token),
        Some(json!({ "assigned_to": b.user_id })),
    )
    .await;
    assert_eq!(assigned.status, StatusCode::OK);
    assert_eq!(assigned.body["message"], "Client assigned successfully");

    let mine = send(&app, Method::GET, "/api/clients/assigned", Some(&token(&world, &b)), None).await;
    assert_eq!(mine.status, StatusCode::OK);
    assert_eq!(mine.body.as_array().map(Vec::len), Some(1));

    let theirs = send(&app, Method::GET, "/api/clients", Some(&token(&world, &a)), None).await;
    assert_eq!(theirs.body["total"], 0);
    Ok(())
}

// ============================================================================
// PROJECTS AND CONTACTS
// ============================================================================

#[tokio::test]
async fn test_project_routes() -> CrmResult<()> {
    let world = World::new();
    let app = app(&world);
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    let c = world.party(PartyKind::Client, &a).named("Acme Tank").insert().await?;
    let token = token(&world, &a);

    let created = send(
        &app,
        Method::POST,
        "/api/projects",
        Some(&token),
        Some(json!({ "project_name": "Tank relining", "client_id": c.id, "project_worth": 12000.5 })),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["project_name"], "Tank relining");
    let id = created.body["id"].as_i64().unwrap();

    let by_client = send(
        &app,
        Method::GET,
        &format!("/api/projects/by-client/{}", c.id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(by_client.status, StatusCode::OK);
    assert_eq!(by_client.body[0]["client_name"], "Acme Tank");

    let listed = send(&app, Method::GET, "/api/projects?sort=alphabetical", Some(&token), None).await;
    assert_eq!(listed.body["total"], 1);
    assert_eq!(listed.body["sort_order"], "alphabetical");

    let fetched = send(&app, Method::GET, &format!("/api/projects/{id}"), Some(&token), None).await;
    assert_eq!(fetched.cache_control.as_deref(), Some("no-store"));

    let deleted = send(&app, Method::DELETE, &format!("/api/projects/{id}"), Some(&token), None).await;
    assert_eq!(deleted.body["message"], "Project deleted");

    let gone = send(&app, Method::GET, &format!("/api/projects/{id}"), Some(&token), None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_contact_routes() -> CrmResult<()> {
    let world = World::new();
    let app = app(&world);
    let a = world.add_user(T1, "a@t1.example", &[Role::User]).await?;
    let lead = world.party(PartyKind::Lead, &a).insert().await?;
    let token = token(&world, &a);

    let created = send(
        &app,
        Method::POST,
        "/api/contacts",
        Some(&token),
        Some(json!({ "lead_id": lead.id, "first_name": "Dana", "phone_label": "mobile" })),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.body["id"].as_i64().unwrap();

    let listed = send(
        &app,
        Method::GET,
        &format!("/api/contacts?lead_id={}", lead.id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(listed.body[0]["first_name"], "Dana");
    assert_eq!(listed.body[0]["lead_id"], lead.id.get());

    let unscoped = send(&app, Method::GET, "/api/contacts", Some(&token), None).await;
    assert_eq!(unscoped.status, StatusCode::OK);
    assert_eq!(unscoped.body, json!([]));

    let updated = send(
        &app,
        Method::PUT,
        &format!("/api/contacts/{id}"),
        Some(&token),
        Some(json!({ "title": "Foreman" })),
    )
    .await;
    assert_eq!(updated.body["message"], "Contact updated");

    let deleted = send(&app, Method::DELETE, &format!("/api/contacts/{id}"), Some(&token), None).await;
    assert_eq!(deleted.body["message"], "Contact deleted");
    Ok(())
}
