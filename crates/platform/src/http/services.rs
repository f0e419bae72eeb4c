use super::*;
use axum::routing::get;

pub(crate) fn router() -> Router<AppState> {
    Router::<AppState>::new()
        .route(
            "/applications/{app_instance_id}/services",
            get(list_app_services).post(register_service),
        )
        .route(
            "/applications/{app_instance_id}/services/{ser_instance_id}",
            get(get_app_service)
                .put(update_service)
                .delete(deregister_service),
        )
        .route("/services", get(discover_services))
        .route("/services/{ser_instance_id}", get(get_service))
}

/// Discovery query; list-valued parameters are comma separated.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub(crate) struct ServiceQuery {
    ser_instance_id: Option<String>,
    ser_name: Option<String>,
    ser_category_id: Option<String>,
    scope_of_locality: Option<String>,
    consumed_local_only: Option<bool>,
    is_local: Option<bool>,
}

impl ServiceQuery {
    fn into_filters(self) -> ServiceFilters {
        let split = |value: String| -> Vec<String> {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };
        ServiceFilters {
            ser_instance_ids: self.ser_instance_id.map(split),
            ser_names: self.ser_name.map(split),
            ser_category_id: self.ser_category_id,
            scope_of_locality: self.scope_of_locality,
            consumed_local_only: self.consumed_local_only,
            is_local: self.is_local,
            app_instance_id: None,
            exclude_app_instance_ids: Vec::new(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/mp1/v1/applications/{app_instance_id}/services",
    params(
        ("app_instance_id" = String, Path, description = "Application instance id"),
        ServiceQuery
    ),
    responses(
        (status = 200, description = "Services registered by the instance", body = [ServiceInfo]),
        (status = 400, description = "Conflicting identity filters", body = ProblemDetails),
        (status = 404, description = "Unknown application instance", body = ProblemDetails)
    ),
    tag = "services"
)]
pub(crate) async fn list_app_services(
    State(state): State<AppState>,
    Path(app_instance_id): Path<String>,
    Query(query): Query<ServiceQuery>,
) -> ApiResult<Json<Vec<ServiceInfo>>> {
    let services =
        registry_svc::app_services(&state, &app_instance_id, query.into_filters()).await?;
    Ok(Json(services))
}

#[utoipa::path(
    post,
    path = "/mp1/v1/applications/{app_instance_id}/services",
    request_body = ServiceInfo,
    params(("app_instance_id" = String, Path, description = "Application instance id")),
    responses(
        (status = 201, description = "Service registered or updated", body = ServiceInfo),
        (status = 403, description = "Instance is not READY", body = ProblemDetails),
        (status = 404, description = "Unknown application instance", body = ProblemDetails)
    ),
    tag = "services"
)]
pub(crate) async fn register_service(
    State(state): State<AppState>,
    Path(app_instance_id): Path<String>,
    Json(body): Json<ServiceInfo>,
) -> ApiResult<impl IntoResponse> {
    let info = registry_svc::register(&state, &app_instance_id, body).await?;
    let location = format!(
        "/mp1/v1/applications/{app_instance_id}/services/{}",
        info.ser_instance_id.as_deref().unwrap_or_default()
    );
    Ok((StatusCode::CREATED, location_header(&location), Json(info)))
}

#[utoipa::path(
    get,
    path = "/mp1/v1/applications/{app_instance_id}/services/{ser_instance_id}",
    params(
        ("app_instance_id" = String, Path, description = "Application instance id"),
        ("ser_instance_id" = String, Path, description = "Service instance id")
    ),
    responses(
        (status = 200, description = "One registered service", body = ServiceInfo),
        (status = 404, description = "Unknown service", body = ProblemDetails)
    ),
    tag = "services"
)]
pub(crate) async fn get_app_service(
    State(state): State<AppState>,
    Path((app_instance_id, ser_instance_id)): Path<(String, String)>,
) -> ApiResult<Json<ServiceInfo>> {
    let services = registry_svc::app_services(
        &state,
        &app_instance_id,
        ServiceFilters {
            ser_instance_ids: Some(vec![ser_instance_id.clone()]),
            ..Default::default()
        },
    )
    .await?;
    let info = services
        .into_iter()
        .next()
        .ok_or_else(|| AppError::not_found(format!("service {ser_instance_id} not found")))?;
    Ok(Json(info))
}

#[utoipa::path(
    put,
    path = "/mp1/v1/applications/{app_instance_id}/services/{ser_instance_id}",
    request_body = ServiceInfo,
    params(
        ("app_instance_id" = String, Path, description = "Application instance id"),
        ("ser_instance_id" = String, Path, description = "Service instance id")
    ),
    responses(
        (status = 200, description = "Service updated", body = ServiceInfo),
        (status = 400, description = "Body id does not match the path", body = ProblemDetails),
        (status = 404, description = "Unknown service", body = ProblemDetails)
    ),
    tag = "services"
)]
pub(crate) async fn update_service(
    State(state): State<AppState>,
    Path((app_instance_id, ser_instance_id)): Path<(String, String)>,
    Json(body): Json<ServiceInfo>,
) -> ApiResult<Json<ServiceInfo>> {
    let info = registry_svc::update(&state, &app_instance_id, &ser_instance_id, body).await?;
    Ok(Json(info))
}

#[utoipa::path(
    delete,
    path = "/mp1/v1/applications/{app_instance_id}/services/{ser_instance_id}",
    params(
        ("app_instance_id" = String, Path, description = "Application instance id"),
        ("ser_instance_id" = String, Path, description = "Service instance id")
    ),
    responses(
        (status = 204, description = "Service removed"),
        (status = 404, description = "Unknown service", body = ProblemDetails)
    ),
    tag = "services"
)]
pub(crate) async fn deregister_service(
    State(state): State<AppState>,
    Path((app_instance_id, ser_instance_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    registry_svc::deregister(&state, &app_instance_id, &ser_instance_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/mp1/v1/services",
    params(ServiceQuery),
    responses(
        (status = 200, description = "Discoverable services", body = [ServiceInfo]),
        (status = 400, description = "Conflicting identity filters", body = ProblemDetails)
    ),
    tag = "services"
)]
pub(crate) async fn discover_services(
    State(state): State<AppState>,
    Query(query): Query<ServiceQuery>,
) -> ApiResult<Json<Vec<ServiceInfo>>> {
    let services = registry_svc::discover(&state, query.into_filters()).await?;
    Ok(Json(services))
}

#[utoipa::path(
    get,
    path = "/mp1/v1/services/{ser_instance_id}",
    params(("ser_instance_id" = String, Path, description = "Service instance id")),
    responses(
        (status = 200, description = "One discoverable service", body = ServiceInfo),
        (status = 404, description = "Unknown or hidden service", body = ProblemDetails)
    ),
    tag = "services"
)]
pub(crate) async fn get_service(
    State(state): State<AppState>,
    Path(ser_instance_id): Path<String>,
) -> ApiResult<Json<ServiceInfo>> {
    let info = registry_svc::get(&state, &ser_instance_id).await?;
    Ok(Json(info))
}
