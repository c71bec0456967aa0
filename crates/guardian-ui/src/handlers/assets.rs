use axum::{extract::Path, http::StatusCode, response::{Html, IntoResponse}};

/// `GET /` — the dashboard shell; client-side JS polls `/pending*` and
/// listens on `/events` for live updates.
pub async fn dashboard() -> impl IntoResponse {
    Html(include_str!("../assets/index.html"))
}

/// `GET /healthz` — liveness probe.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// `GET /static/{*path}` — the handful of assets the dashboard needs,
/// embedded at compile time rather than served from disk.
pub async fn static_asset(Path(path): Path<String>) -> impl IntoResponse {
    match path.as_str() {
        "style.css" => ([("content-type", "text/css; charset=utf-8")], include_str!("../assets/style.css")).into_response(),
        "app.js" => (
            [("content-type", "application/javascript; charset=utf-8")],
            include_str!("../assets/app.js"),
        )
            .into_response(),
        _ => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}
