use super::*;
use axum::routing::{get, post};

pub(crate) fn mp1_router() -> Router<AppState> {
    Router::<AppState>::new()
        .route(
            "/applications/{app_instance_id}/confirm_ready",
            post(confirm_ready),
        )
        .route(
            "/applications/{app_instance_id}/confirm_termination",
            post(confirm_termination),
        )
        .route("/applications/{app_instance_id}/token", get(token))
}

pub(crate) fn management_router(state: AppState) -> Router<AppState> {
    Router::<AppState>::new()
        .route(
            "/app_instances/{app_instance_id}/configure_platform_for_app",
            post(configure),
        )
        .route(
            "/app_instances/{app_instance_id}/change_state",
            post(change_state),
        )
        .route("/app_instances/{app_instance_id}/terminate", post(terminate))
        .route("/app_lcm_op_occs", get(list_operations))
        .route("/app_lcm_op_occs/{operation_id}", get(get_operation))
        .route_layer(middleware::from_fn_with_state(
            state,
            super::require_platform_auth,
        ))
}

#[utoipa::path(
    post,
    path = "/mp1/v1/applications/{app_instance_id}/confirm_ready",
    request_body = AppReadyConfirmation,
    params(("app_instance_id" = String, Path, description = "Application instance id")),
    responses(
        (status = 204, description = "Readiness recorded"),
        (status = 404, description = "Unknown application instance", body = ProblemDetails),
        (status = 429, description = "Too many confirmation attempts", body = ProblemDetails)
    ),
    tag = "lifecycle"
)]
pub(crate) async fn confirm_ready(
    State(state): State<AppState>,
    Path(app_instance_id): Path<String>,
    Json(body): Json<AppReadyConfirmation>,
) -> ApiResult<Response> {
    let decision = lifecycle_svc::confirm_ready(&state, &app_instance_id, body).await?;
    let mut response = StatusCode::NO_CONTENT.into_response();
    response.headers_mut().extend(decision.headers());
    Ok(response)
}

#[utoipa::path(
    post,
    path = "/mp1/v1/applications/{app_instance_id}/confirm_termination",
    request_body = AppTerminationConfirmation,
    params(("app_instance_id" = String, Path, description = "Application instance id")),
    responses(
        (status = 204, description = "Termination acknowledged; instance removed"),
        (status = 403, description = "Credential revocation failed", body = ProblemDetails),
        (status = 409, description = "No matching termination in progress", body = ProblemDetails),
        (status = 429, description = "Too many confirmation attempts", body = ProblemDetails)
    ),
    tag = "lifecycle"
)]
pub(crate) async fn confirm_termination(
    State(state): State<AppState>,
    Path(app_instance_id): Path<String>,
    Json(body): Json<AppTerminationConfirmation>,
) -> ApiResult<Response> {
    let decision = lifecycle_svc::confirm_termination(&state, &app_instance_id, body).await?;
    let mut response = StatusCode::NO_CONTENT.into_response();
    response.headers_mut().extend(decision.headers());
    Ok(response)
}

#[utoipa::path(
    get,
    path = "/mp1/v1/applications/{app_instance_id}/token",
    params(("app_instance_id" = String, Path, description = "Application instance id")),
    responses(
        (status = 200, description = "Credential bundle issued at configuration time", body = OAuthCredentials),
        (status = 404, description = "Unknown application instance", body = ProblemDetails)
    ),
    tag = "lifecycle"
)]
pub(crate) async fn token(
    State(state): State<AppState>,
    Path(app_instance_id): Path<String>,
) -> ApiResult<Json<OAuthCredentials>> {
    let bundle = lifecycle_svc::credentials(&state, &app_instance_id).await?;
    Ok(Json(bundle))
}

#[utoipa::path(
    post,
    path = "/mepm/v1/app_instances/{app_instance_id}/configure_platform_for_app",
    request_body = ConfigPlatformForApp,
    params(("app_instance_id" = String, Path, description = "Application instance id")),
    responses(
        (status = 201, description = "Instance configured", body = LcmOperationRef),
        (status = 403, description = "Credential provisioning failed", body = ProblemDetails),
        (status = 409, description = "Instance already configured", body = ProblemDetails)
    ),
    tag = "management"
)]
pub(crate) async fn configure(
    State(state): State<AppState>,
    Path(app_instance_id): Path<String>,
    Json(body): Json<ConfigPlatformForApp>,
) -> ApiResult<impl IntoResponse> {
    let operation = lifecycle_svc::configure(&state, &app_instance_id, body).await?;
    Ok((StatusCode::CREATED, Json(operation)))
}

#[utoipa::path(
    post,
    path = "/mepm/v1/app_instances/{app_instance_id}/change_state",
    request_body = ChangeAppInstanceState,
    params(("app_instance_id" = String, Path, description = "Application instance id")),
    responses(
        (status = 201, description = "State change recorded", body = LcmOperationRef),
        (status = 409, description = "Unknown instance or already in the requested state", body = ProblemDetails)
    ),
    tag = "management"
)]
pub(crate) async fn change_state(
    State(state): State<AppState>,
    Path(app_instance_id): Path<String>,
    Json(body): Json<ChangeAppInstanceState>,
) -> ApiResult<impl IntoResponse> {
    let operation = lifecycle_svc::update_state(&state, &app_instance_id, body).await?;
    Ok((StatusCode::CREATED, Json(operation)))
}

#[utoipa::path(
    post,
    path = "/mepm/v1/app_instances/{app_instance_id}/terminate",
    request_body = TerminateAppInstance,
    params(("app_instance_id" = String, Path, description = "Application instance id")),
    responses(
        (status = 201, description = "Termination recorded", body = LcmOperationRef),
        (status = 409, description = "Unknown instance or termination already in progress", body = ProblemDetails)
    ),
    tag = "management"
)]
pub(crate) async fn terminate(
    State(state): State<AppState>,
    Path(app_instance_id): Path<String>,
    Json(body): Json<TerminateAppInstance>,
) -> ApiResult<impl IntoResponse> {
    let operation = lifecycle_svc::request_termination(&state, &app_instance_id, body).await?;
    Ok((StatusCode::CREATED, Json(operation)))
}

#[utoipa::path(
    get,
    path = "/mepm/v1/app_lcm_op_occs",
    responses((status = 200, description = "All lifecycle operation occurrences", body = [LcmOperation])),
    tag = "management"
)]
pub(crate) async fn list_operations(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<LcmOperation>>> {
    let operations = lifecycle_svc::operations(&state).await?;
    Ok(Json(operations))
}

#[utoipa::path(
    get,
    path = "/mepm/v1/app_lcm_op_occs/{operation_id}",
    params(("operation_id" = Uuid, Path, description = "Lifecycle operation occurrence id")),
    responses(
        (status = 200, description = "One lifecycle operation occurrence", body = LcmOperation),
        (status = 404, description = "Unknown operation", body = ProblemDetails)
    ),
    tag = "management"
)]
pub(crate) async fn get_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<Uuid>,
) -> ApiResult<Json<LcmOperation>> {
    let operation = lifecycle_svc::operation(&state, operation_id).await?;
    Ok(Json(operation))
}
