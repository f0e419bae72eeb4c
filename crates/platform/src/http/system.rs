use super::*;
use axum::http::header::CONTENT_TYPE;
use axum::routing::get;
use utoipa::OpenApi;

pub(crate) fn router() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/openapi.json", get(openapi_spec))
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct Health {
    status: &'static str,
    version: &'static str,
}

#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "Process is serving", body = Health)),
    tag = "system"
)]
pub(crate) async fn healthz() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[utoipa::path(
    get,
    path = "/metrics",
    responses((status = 200, description = "Prometheus exposition text")),
    tag = "system"
)]
pub(crate) async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.metrics.render();
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/api/openapi.json",
    responses((status = 200, description = "OpenAPI document")),
    tag = "system"
)]
pub(crate) async fn openapi_spec() -> Json<Value> {
    Json(
        serde_json::to_value(crate::openapi::ApiDoc::openapi()).unwrap_or_else(|_| Value::Null),
    )
}
