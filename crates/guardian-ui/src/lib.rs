//! Approval UI / event hub (C7): loopback-only HTTP service for human review
//! of pending domain and command requests, plus the SSE stream that feeds
//! live dashboard updates.

pub mod error;
pub mod handlers;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, sync::watch};
use tracing::warn;

/// Build the full `/`, `/pending*`, `/approve*`, `/deny*`, `/events`,
/// `/static/*`, `/healthz` route table (§4.6).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::assets::dashboard))
        .route("/healthz", get(handlers::assets::healthz))
        .route("/static/{*path}", get(handlers::assets::static_asset))
        .route("/pending", get(handlers::pending::list_commands))
        .route("/pending-domains", get(handlers::pending::list_domains))
        .route("/approve/{id}", post(handlers::pending::approve_command))
        .route("/deny/{id}", post(handlers::pending::deny_command))
        .route("/approve-domain/{id}", post(handlers::pending::approve_domain))
        .route("/deny-domain/{id}", post(handlers::pending::deny_domain))
        .route("/events", get(handlers::sse::sse_handler))
        .with_state(state)
}

/// Serve the router on `listener` until `shutdown` flips to `true`, keeping
/// `axum::serve` wiring out of the binary crate.
pub async fn serve(listener: TcpListener, router: Router, mut shutdown: watch::Receiver<bool>) {
    let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = shutdown.changed().await;
    });
    if let Err(e) = serve.await {
        warn!(error = %e, "approval UI server exited with an error");
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use guardian_core::{cache::AllowlistCache, decision::DecisionPersister, events::EventHub, session::SessionLists};
    use guardian_proxy::{CommandApprover, DomainApprover};
    use tower::ServiceExt;

    use super::*;

    fn test_state() -> AppState {
        let sessions = Arc::new(SessionLists::new());
        let cache = Arc::new(AllowlistCache::new());
        let dir = tempfile::tempdir().unwrap();
        let persister = Arc::new(DecisionPersister::new(dir.path(), Arc::new(guardian_core::NoopReloadNotifier)));
        let events = Arc::new(EventHub::new(16));
        let domain_approver = Arc::new(DomainApprover::new(Duration::from_secs(30), sessions, cache, persister, Arc::clone(&events)));
        let command_approver = Arc::new(CommandApprover::new(Duration::from_secs(30), Arc::clone(&events)));
        AppState::new(domain_approver, command_approver, events)
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let app = router(test_state());
        let response = app.oneshot(Request::get("/healthz").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn dashboard_serves_html() {
        let app = router(test_state());
        let response = app.oneshot(Request::get("/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn static_asset_serves_known_file() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::get("/static/style.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn static_asset_404s_on_unknown_file() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::get("/static/missing.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pending_lists_start_empty() {
        let app = router(test_state());
        let response = app.oneshot(Request::get("/pending").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
