//! HTTP route handlers: health, workflow introspection, entities and
//! transitions.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use praxis_engine::{Actor, EngineError, EntityPatch, Payload, TransitionRequest};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::error::ApiError;
use super::json_error;
use super::state::AppState;

type Shared = State<Arc<AppState>>;

/// Caller identity taken from `X-Actor-Id` / `X-Actor-Role`.
pub(crate) struct RequestActor(pub(crate) Actor);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl<S: Send + Sync> FromRequestParts<S> for RequestActor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, "x-actor-id")
            .ok_or_else(|| ApiError::BadRequest("missing X-Actor-Id header".to_string()))?;
        let role = header(parts, "x-actor-role")
            .ok_or_else(|| ApiError::BadRequest("missing X-Actor-Role header".to_string()))?;
        Ok(RequestActor(Actor::new(id, role)))
    }
}

/// Parse a JSON body. An empty body is read as `T::default()`.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {}", e)))
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health(State(state): Shared) -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "workflow": state.engine.workflow().name(),
    });
    (StatusCode::OK, Json(response))
}

/// GET /workflows
pub(crate) async fn handle_list_workflows(State(state): Shared) -> impl IntoResponse {
    let workflow = state.engine.workflow();
    let types: Vec<serde_json::Value> = workflow
        .entity_types()
        .iter()
        .map(|t| {
            let mut actions: Vec<&str> = Vec::new();
            for r in workflow.rules_for(&t.name) {
                if !actions.contains(&r.action.as_str()) {
                    actions.push(r.action.as_str());
                }
            }
            serde_json::json!({
                "name": t.name,
                "statuses": t.statuses,
                "initial": t.initial,
                "terminal": t.terminal,
                "actions": actions,
            })
        })
        .collect();
    let response = serde_json::json!({
        "name": workflow.name(),
        "entityTypes": types,
    });
    (StatusCode::OK, Json(response))
}

/// GET /workflows/{type}/rules
pub(crate) async fn handle_rules(
    State(state): Shared,
    Path(entity_type): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow = state.engine.workflow();
    if workflow.entity_type(&entity_type).is_none() {
        return Err(EngineError::UnknownEntityType { entity_type }.into());
    }
    let rules: Vec<_> = workflow.rules_for(&entity_type).collect();
    let response = serde_json::json!({
        "entityType": entity_type,
        "rules": rules,
    });
    Ok((StatusCode::OK, Json(response)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CreateBody {
    #[serde(default)]
    payload: Payload,
    #[serde(default)]
    owner_id: Option<String>,
}

/// POST /entities/{type}
pub(crate) async fn handle_create(
    State(state): Shared,
    Path(entity_type): Path<String>,
    RequestActor(actor): RequestActor,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let body: CreateBody = parse_body(&body)?;
    let entity = state
        .engine
        .create(&entity_type, body.payload, body.owner_id)
        .await?;
    tracing::debug!(actor = %actor.id, role = %actor.role, entity_id = %entity.id, "create");
    Ok((StatusCode::CREATED, Json(entity)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    status: Option<String>,
}

/// GET /entities/{type}?status=
pub(crate) async fn handle_list(
    State(state): Shared,
    Path(entity_type): Path<String>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let entities = state
        .engine
        .list(&entity_type, query.status.as_deref())
        .await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "entities": entities }))))
}

/// GET /entities/{type}/{id}
pub(crate) async fn handle_get(
    State(state): Shared,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let entity = state.engine.get(&entity_type, &entity_id).await?;
    Ok((StatusCode::OK, Json(entity)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct PatchBody {
    #[serde(default)]
    patch: Payload,
    #[serde(default)]
    owner_id: Option<String>,
    expected_version: Option<i64>,
}

/// PATCH /entities/{type}/{id}
pub(crate) async fn handle_patch(
    State(state): Shared,
    Path((entity_type, entity_id)): Path<(String, String)>,
    RequestActor(actor): RequestActor,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let body: PatchBody = parse_body(&body)?;
    let expected_version = body
        .expected_version
        .ok_or_else(|| ApiError::BadRequest("missing 'expectedVersion' field".to_string()))?;
    let patch = EntityPatch {
        payload: body.patch,
        owner_id: body.owner_id,
    };
    let entity = state
        .engine
        .update(&entity_type, &entity_id, patch, expected_version)
        .await?;
    tracing::debug!(actor = %actor.id, entity_id = %entity.id, version = entity.version, "patch");
    Ok((StatusCode::OK, Json(entity)))
}

/// POST /entities/{type}/{id}/transitions
pub(crate) async fn handle_transition(
    State(state): Shared,
    Path((entity_type, entity_id)): Path<(String, String)>,
    RequestActor(actor): RequestActor,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: TransitionRequest = parse_body(&body)?;
    if request.action.trim().is_empty() {
        return Err(ApiError::BadRequest("missing 'action' field".to_string()));
    }
    let outcome = state
        .engine
        .transition(&entity_type, &entity_id, &actor, &request)
        .await?;
    Ok((StatusCode::OK, Json(outcome)))
}

/// GET /entities/{type}/{id}/transitions
pub(crate) async fn handle_history(
    State(state): Shared,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let transitions = state.engine.history(&entity_type, &entity_id).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "transitions": transitions })),
    ))
}

/// GET /entities/{type}/{id}/actions
pub(crate) async fn handle_actions(
    State(state): Shared,
    Path((entity_type, entity_id)): Path<(String, String)>,
    RequestActor(actor): RequestActor,
) -> Result<impl IntoResponse, ApiError> {
    let actions = state
        .engine
        .available_actions(&entity_type, &entity_id, &actor.role)
        .await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "role": actor.role, "actions": actions })),
    ))
}
