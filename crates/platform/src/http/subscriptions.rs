use super::*;
use axum::routing::get;

pub(crate) fn router() -> Router<AppState> {
    Router::<AppState>::new()
        .route(
            "/applications/{app_instance_id}/subscriptions",
            get(list_subscriptions).post(create_subscription),
        )
        .route(
            "/applications/{app_instance_id}/subscriptions/{subscription_id}",
            get(get_subscription).delete(delete_subscription),
        )
}

#[utoipa::path(
    get,
    path = "/mp1/v1/applications/{app_instance_id}/subscriptions",
    params(("app_instance_id" = String, Path, description = "Application instance id")),
    responses(
        (status = 200, description = "Subscriptions held by the instance", body = SubscriptionLinkList),
        (status = 404, description = "Unknown application instance", body = ProblemDetails)
    ),
    tag = "subscriptions"
)]
pub(crate) async fn list_subscriptions(
    State(state): State<AppState>,
    Path(app_instance_id): Path<String>,
) -> ApiResult<Json<SubscriptionLinkList>> {
    let list = subscriptions_svc::list(&state, &app_instance_id).await?;
    Ok(Json(list))
}

/// The request body is dispatched on `subscriptionType`, so this handler
/// accepts raw JSON and re-parses it into the matching subscription shape.
#[utoipa::path(
    post,
    path = "/mp1/v1/applications/{app_instance_id}/subscriptions",
    request_body = SerAvailabilityNotificationSubscription,
    params(("app_instance_id" = String, Path, description = "Application instance id")),
    responses(
        (status = 201, description = "Subscription created", body = SerAvailabilityNotificationSubscription),
        (status = 400, description = "Unknown subscription type or invalid criteria", body = ProblemDetails),
        (status = 403, description = "Instance is not READY", body = ProblemDetails),
        (status = 404, description = "Unknown application instance", body = ProblemDetails)
    ),
    tag = "subscriptions"
)]
pub(crate) async fn create_subscription(
    State(state): State<AppState>,
    Path(app_instance_id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let kind = body
        .get("subscriptionType")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let (subscription_id, payload) = match kind.as_str() {
        KIND_SER_AVAILABILITY => {
            let subscription: SerAvailabilityNotificationSubscription =
                serde_json::from_value(body).map_err(|err| {
                    AppError::bad_request(format!("invalid availability subscription: {err}"))
                })?;
            let (id, stored) =
                subscriptions_svc::create_availability(&state, &app_instance_id, subscription)
                    .await?;
            (id, serde_json::to_value(stored).unwrap_or_default())
        }
        KIND_APP_TERMINATION => {
            let subscription: AppTerminationNotificationSubscription =
                serde_json::from_value(body).map_err(|err| {
                    AppError::bad_request(format!("invalid termination subscription: {err}"))
                })?;
            let (id, stored) =
                subscriptions_svc::create_termination(&state, &app_instance_id, subscription)
                    .await?;
            (id, serde_json::to_value(stored).unwrap_or_default())
        }
        other => {
            return Err(AppError::bad_request(format!(
                "unsupported subscriptionType {other:?}"
            )));
        }
    };

    let location = format!(
        "/mp1/v1/applications/{app_instance_id}/subscriptions/{subscription_id}"
    );
    Ok((
        StatusCode::CREATED,
        location_header(&location),
        Json(payload),
    ))
}

#[utoipa::path(
    get,
    path = "/mp1/v1/applications/{app_instance_id}/subscriptions/{subscription_id}",
    params(
        ("app_instance_id" = String, Path, description = "Application instance id"),
        ("subscription_id" = String, Path, description = "Subscription id")
    ),
    responses(
        (status = 200, description = "One subscription", body = SerAvailabilityNotificationSubscription),
        (status = 404, description = "Unknown subscription", body = ProblemDetails)
    ),
    tag = "subscriptions"
)]
pub(crate) async fn get_subscription(
    State(state): State<AppState>,
    Path((app_instance_id, subscription_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let body = subscriptions_svc::get(&state, &app_instance_id, &subscription_id).await?;
    Ok(Json(body))
}

#[utoipa::path(
    delete,
    path = "/mp1/v1/applications/{app_instance_id}/subscriptions/{subscription_id}",
    params(
        ("app_instance_id" = String, Path, description = "Application instance id"),
        ("subscription_id" = String, Path, description = "Subscription id")
    ),
    responses(
        (status = 204, description = "Subscription removed"),
        (status = 404, description = "Unknown subscription", body = ProblemDetails)
    ),
    tag = "subscriptions"
)]
pub(crate) async fn delete_subscription(
    State(state): State<AppState>,
    Path((app_instance_id, subscription_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    subscriptions_svc::delete(&state, &app_instance_id, &subscription_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
