use axum::{extract::Path, extract::State, Json};
use guardian_core::types::{CommandVerdict, DomainVerdict, Scope};
use serde::Deserialize;

use crate::{
    error::{Error, Result},
    state::AppState,
};

/// `GET /pending` — JSON list of pending command requests.
pub async fn list_commands(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.command_approver.queue().list()))
}

/// `GET /pending-domains` — JSON list of pending domain requests.
pub async fn list_domains(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.domain_approver.queue().list()))
}

#[derive(Deserialize, Default)]
pub struct DenyCommandPayload {
    #[serde(default)]
    #[allow(dead_code)]
    reason: Option<String>,
}

/// `POST /approve/{id}` — resolve a pending command request as approved.
pub async fn approve_command(State(state): State<AppState>, Path(id): Path<String>, Json(_body): Json<serde_json::Value>) -> Result<Json<serde_json::Value>> {
    state
        .command_approver
        .queue()
        .resolve(&id, CommandVerdict::Approved)
        .map_err(|_| Error::not_found("request not found"))?;
    Ok(Json(serde_json::json!({ "status": "success" })))
}

/// `POST /deny/{id}` — resolve a pending command request as denied.
pub async fn deny_command(State(state): State<AppState>, Path(id): Path<String>, Json(_body): Json<DenyCommandPayload>) -> Result<Json<serde_json::Value>> {
    state
        .command_approver
        .queue()
        .resolve(&id, CommandVerdict::Denied)
        .map_err(|_| Error::not_found("request not found"))?;
    Ok(Json(serde_json::json!({ "status": "success" })))
}

#[derive(Deserialize)]
pub struct ApproveDomainPayload {
    scope: Scope,
    #[serde(default)]
    pattern: Option<String>,
}

#[derive(Deserialize)]
pub struct DenyDomainPayload {
    scope: Scope,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// `POST /approve-domain/{id}`. Persists the project/global side effect
/// through the decision persister before the response is sent, then
/// resolves the queue entry — the blocked proxy task's own bookkeeping may
/// run after this handler has already returned.
pub async fn approve_domain(State(state): State<AppState>, Path(id): Path<String>, Json(body): Json<ApproveDomainPayload>) -> Result<Json<serde_json::Value>> {
    let request = state.domain_approver.queue().get(&id).ok_or_else(|| Error::not_found("request not found"))?;
    let verdict = DomainVerdict::Approved {
        scope: body.scope,
        pattern: body.pattern,
    };
    state.domain_approver.persist_verdict(&request.project, &request.domain, &verdict);
    state
        .domain_approver
        .queue()
        .resolve(&id, verdict)
        .map_err(|_| Error::not_found("request not found"))?;
    Ok(Json(serde_json::json!({ "status": "success" })))
}

/// `POST /deny-domain/{id}`.
pub async fn deny_domain(State(state): State<AppState>, Path(id): Path<String>, Json(body): Json<DenyDomainPayload>) -> Result<Json<serde_json::Value>> {
    let request = state.domain_approver.queue().get(&id).ok_or_else(|| Error::not_found("request not found"))?;
    let verdict = DomainVerdict::Denied {
        scope: body.scope,
        pattern: body.pattern,
        reason: body.reason,
    };
    state.domain_approver.persist_verdict(&request.project, &request.domain, &verdict);
    state
        .domain_approver
        .queue()
        .resolve(&id, verdict)
        .map_err(|_| Error::not_found("request not found"))?;
    Ok(Json(serde_json::json!({ "status": "success" })))
}
