use super::*;
use axum::http::header::{ETAG, IF_MATCH, IF_UNMODIFIED_SINCE, LAST_MODIFIED};
use axum::routing::get;
use chrono::{DateTime, Utc};

use crate::services::rules::DnsRuleView;

pub(crate) fn router() -> Router<AppState> {
    Router::<AppState>::new()
        .route(
            "/applications/{app_instance_id}/traffic_rules",
            get(list_traffic_rules),
        )
        .route(
            "/applications/{app_instance_id}/traffic_rules/{traffic_rule_id}",
            get(get_traffic_rule).put(put_traffic_rule),
        )
        .route(
            "/applications/{app_instance_id}/dns_rules",
            get(list_dns_rules),
        )
        .route(
            "/applications/{app_instance_id}/dns_rules/{dns_rule_id}",
            get(get_dns_rule).put(put_dns_rule),
        )
}

#[utoipa::path(
    get,
    path = "/mp1/v1/applications/{app_instance_id}/traffic_rules",
    params(("app_instance_id" = String, Path, description = "Application instance id")),
    responses(
        (status = 200, description = "Traffic rules for the instance", body = [TrafficRule]),
        (status = 404, description = "Unknown application instance", body = ProblemDetails)
    ),
    tag = "rules"
)]
pub(crate) async fn list_traffic_rules(
    State(state): State<AppState>,
    Path(app_instance_id): Path<String>,
) -> ApiResult<Json<Vec<TrafficRule>>> {
    let rules = rules_svc::list_traffic(&state, &app_instance_id).await?;
    Ok(Json(rules))
}

#[utoipa::path(
    get,
    path = "/mp1/v1/applications/{app_instance_id}/traffic_rules/{traffic_rule_id}",
    params(
        ("app_instance_id" = String, Path, description = "Application instance id"),
        ("traffic_rule_id" = String, Path, description = "Traffic rule id")
    ),
    responses(
        (status = 200, description = "One traffic rule", body = TrafficRule),
        (status = 404, description = "Unknown rule", body = ProblemDetails)
    ),
    tag = "rules"
)]
pub(crate) async fn get_traffic_rule(
    State(state): State<AppState>,
    Path((app_instance_id, traffic_rule_id)): Path<(String, String)>,
) -> ApiResult<Json<TrafficRule>> {
    let rule = rules_svc::get_traffic(&state, &app_instance_id, &traffic_rule_id).await?;
    Ok(Json(rule))
}

#[utoipa::path(
    put,
    path = "/mp1/v1/applications/{app_instance_id}/traffic_rules/{traffic_rule_id}",
    request_body = TrafficRule,
    params(
        ("app_instance_id" = String, Path, description = "Application instance id"),
        ("traffic_rule_id" = String, Path, description = "Traffic rule id")
    ),
    responses(
        (status = 200, description = "Traffic rule replaced", body = TrafficRule),
        (status = 400, description = "Body id does not match the path", body = ProblemDetails),
        (status = 404, description = "Unknown rule", body = ProblemDetails)
    ),
    tag = "rules"
)]
pub(crate) async fn put_traffic_rule(
    State(state): State<AppState>,
    Path((app_instance_id, traffic_rule_id)): Path<(String, String)>,
    Json(body): Json<TrafficRule>,
) -> ApiResult<Json<TrafficRule>> {
    let rule = rules_svc::put_traffic(&state, &app_instance_id, &traffic_rule_id, body).await?;
    Ok(Json(rule))
}

#[utoipa::path(
    get,
    path = "/mp1/v1/applications/{app_instance_id}/dns_rules",
    params(("app_instance_id" = String, Path, description = "Application instance id")),
    responses(
        (status = 200, description = "DNS rules for the instance", body = [DnsRule]),
        (status = 404, description = "Unknown application instance", body = ProblemDetails)
    ),
    tag = "rules"
)]
pub(crate) async fn list_dns_rules(
    State(state): State<AppState>,
    Path(app_instance_id): Path<String>,
) -> ApiResult<Json<Vec<DnsRule>>> {
    let rules = rules_svc::list_dns(&state, &app_instance_id).await?;
    Ok(Json(rules))
}

#[utoipa::path(
    get,
    path = "/mp1/v1/applications/{app_instance_id}/dns_rules/{dns_rule_id}",
    params(
        ("app_instance_id" = String, Path, description = "Application instance id"),
        ("dns_rule_id" = String, Path, description = "DNS rule id")
    ),
    responses(
        (status = 200, description = "One DNS rule", body = DnsRule),
        (status = 404, description = "Unknown rule", body = ProblemDetails)
    ),
    tag = "rules"
)]
pub(crate) async fn get_dns_rule(
    State(state): State<AppState>,
    Path((app_instance_id, dns_rule_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let view = rules_svc::get_dns(&state, &app_instance_id, &dns_rule_id).await?;
    Ok(dns_rule_response(StatusCode::OK, &view))
}

#[utoipa::path(
    put,
    path = "/mp1/v1/applications/{app_instance_id}/dns_rules/{dns_rule_id}",
    request_body = DnsRule,
    params(
        ("app_instance_id" = String, Path, description = "Application instance id"),
        ("dns_rule_id" = String, Path, description = "DNS rule id"),
        ("If-Match" = Option<String>, Header, description = "ETag the stored rule must still carry"),
        ("If-Unmodified-Since" = Option<String>, Header, description = "RFC 2822 timestamp the stored rule must not be newer than")
    ),
    responses(
        (status = 200, description = "DNS rule replaced", body = DnsRule),
        (status = 400, description = "Body id does not match the path", body = ProblemDetails),
        (status = 403, description = "DNS record provisioning failed", body = ProblemDetails),
        (status = 404, description = "Unknown rule", body = ProblemDetails),
        (status = 412, description = "Precondition failed", body = ProblemDetails)
    ),
    tag = "rules"
)]
pub(crate) async fn put_dns_rule(
    State(state): State<AppState>,
    Path((app_instance_id, dns_rule_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<DnsRule>,
) -> ApiResult<Response> {
    let if_match = headers.get(IF_MATCH).and_then(|v| v.to_str().ok());
    let if_unmodified_since = headers
        .get(IF_UNMODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| DateTime::parse_from_rfc2822(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc));

    let view = rules_svc::put_dns(
        &state,
        &app_instance_id,
        &dns_rule_id,
        body,
        if_match,
        if_unmodified_since,
    )
    .await?;
    Ok(dns_rule_response(StatusCode::OK, &view))
}

fn dns_rule_response(status: StatusCode, view: &DnsRuleView) -> Response {
    let mut response = (status, Json(view.rule.clone())).into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", view.etag)) {
        response.headers_mut().insert(ETAG, value);
    }
    let last_modified = view
        .last_modified
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        response.headers_mut().insert(LAST_MODIFIED, value);
    }
    response
}
