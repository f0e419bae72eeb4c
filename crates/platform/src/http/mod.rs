use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode, header::LOCATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;
use subtle::ConstantTimeEq;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::warn;
use uuid::Uuid;

use mep_common::api::{
    AppReadyConfirmation, AppTerminationConfirmation, AppTerminationNotificationSubscription,
    ChangeAppInstanceState, ConfigPlatformForApp, DnsRule, LcmOperation, LcmOperationRef,
    OAuthCredentials, ProblemDetails, SerAvailabilityNotificationSubscription, ServiceInfo,
    SubscriptionLinkList, TerminateAppInstance, TrafficRule,
};

use crate::app_state::AppState;
use crate::error::{ApiResult, AppError};
use crate::persistence::ServiceFilters;
use crate::persistence::subscriptions::{KIND_APP_TERMINATION, KIND_SER_AVAILABILITY};
use crate::services::{
    lifecycle as lifecycle_svc, registry as registry_svc, rules as rules_svc,
    subscriptions as subscriptions_svc,
};
use crate::telemetry;

pub(crate) mod lifecycle;
pub(crate) mod rules;
pub(crate) mod services;
pub(crate) mod subscriptions;
pub(crate) mod system;

/// Assembles the full HTTP surface.
///
/// `/mp1/v1` is the app-facing surface and carries no platform auth; the
/// management surface under `/mepm/v1` requires a platform bearer token.
pub fn build_router(state: AppState) -> Router {
    let mp1 = Router::<AppState>::new()
        .merge(lifecycle::mp1_router())
        .merge(services::router())
        .merge(subscriptions::router())
        .merge(rules::router());

    Router::<AppState>::new()
        .merge(system::router())
        .nest("/mp1/v1", mp1)
        .nest("/mepm/v1", lifecycle::management_router(state.clone()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Bearer-token gate for the management surface.
pub(crate) async fn require_platform_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> ApiResult<Response> {
    let request_id = telemetry::request_id_from_request(&req);

    let Some(raw) = req
        .headers()
        .get(state.platform_auth.header_name.as_str())
        .and_then(|value| value.to_str().ok())
    else {
        warn!(
            request_id = request_id.as_deref(),
            "missing platform authorization header"
        );
        return Err(AppError::unauthorized(
            "missing platform authorization header",
        ));
    };
    let candidate = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();

    let authorized = state.platform_auth.tokens.iter().any(|token| {
        token.len() == candidate.len() && token.as_bytes().ct_eq(candidate.as_bytes()).into()
    });
    if !authorized {
        warn!(
            request_id = request_id.as_deref(),
            path = req.uri().path(),
            "invalid platform token"
        );
        return Err(AppError::unauthorized("invalid platform token"));
    }

    Ok(next.run(req).await)
}

pub(crate) fn into_problem_response(err: AppError) -> Response {
    let body = Json(ProblemDetails {
        problem_type: Some(err.code.to_string()),
        title: err
            .status
            .canonical_reason()
            .unwrap_or("error")
            .to_string(),
        status: err.status.as_u16(),
        detail: err.message,
    });
    let mut response = (err.status, body).into_response();
    if let Some(headers) = err.headers.as_deref() {
        for (name, value) in headers.iter() {
            response.headers_mut().insert(name.clone(), value.clone());
        }
    }
    response
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        into_problem_response(self)
    }
}

fn location_header(path: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(path) {
        headers.insert(LOCATION, value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use axum::body::to_bytes;
    use tower::ServiceExt;

    #[tokio::test]
    async fn errors_render_problem_details() {
        let err = AppError::conflict("instance already configured");
        let response = into_problem_response(err);
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(payload["status"], 409);
        assert_eq!(payload["type"], "conflict");
        assert_eq!(payload["detail"], "instance already configured");
    }

    #[tokio::test]
    async fn management_surface_requires_bearer_token() {
        let platform = test_support::platform().await;
        let app = build_router(platform.state);

        let unauthenticated = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/mepm/v1/app_lcm_op_occs")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);

        let wrong_token = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/mepm/v1/app_lcm_op_occs")
                    .header("authorization", "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong_token.status(), StatusCode::UNAUTHORIZED);

        let authorized = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/mepm/v1/app_lcm_op_occs")
                    .header("authorization", "Bearer test-platform-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(authorized.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn mp1_surface_is_open_and_health_responds() {
        let platform = test_support::platform().await;
        let app = build_router(platform.state);

        let health = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let services = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/mp1/v1/services")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(services.status(), StatusCode::OK);
    }
}
