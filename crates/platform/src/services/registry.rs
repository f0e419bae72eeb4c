//! Service registration, discovery, and availability notifications.
//!
//! Registration matches by service name within the owning instance: a repost
//! under the same name updates the existing registration instead of creating
//! a second one. The service row is written before the per-instance summary
//! so discovery never sees a summary for a missing row.

use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use mep_common::api::{
    LinkType, NotificationLinks, ServiceAvailabilityNotification, ServiceChangeType, ServiceInfo,
    ServiceReference,
};

use crate::app_state::AppState;
use crate::error::{ApiResult, AppError};
use crate::persistence::{
    Indication, ServiceFilters, ServiceSummary, app_status, services, subscriptions,
};
use crate::services::subscriptions::criteria_matches;

/// Classifies what a repost changes about an existing registration.
///
/// Returns `None` when nothing changed at all; identity is ignored because
/// the existing instance id is always kept.
pub(crate) fn classify_change(
    existing: &ServiceInfo,
    incoming: &ServiceInfo,
) -> Option<ServiceChangeType> {
    let mut old = existing.clone();
    let mut new = incoming.clone();
    old.ser_instance_id = None;
    new.ser_instance_id = None;

    if old == new {
        return None;
    }
    if old.state != new.state {
        old.state = new.state;
        if old == new {
            return Some(ServiceChangeType::StateChanged);
        }
    }
    Some(ServiceChangeType::AttributesChanged)
}

/// Registers a service, or updates the registration sharing its name.
pub async fn register(
    state: &AppState,
    app_instance_id: &str,
    mut info: ServiceInfo,
) -> ApiResult<ServiceInfo> {
    let status = require_ready(state, app_instance_id).await?;

    let owned = services::list(
        &state.db,
        &ServiceFilters {
            app_instance_id: Some(app_instance_id.to_string()),
            ..Default::default()
        },
    )
    .await?;

    let change = match owned.iter().find(|r| r.ser_name == info.ser_name) {
        None => {
            if info.ser_instance_id.is_none() {
                info.ser_instance_id = Some(Uuid::new_v4().to_string());
            }
            ServiceChangeType::Added
        }
        Some(existing) => {
            info.ser_instance_id = Some(existing.ser_instance_id.clone());
            match classify_change(&existing.info.0, &info) {
                Some(change) => change,
                None => {
                    debug!(
                        app_instance_id,
                        ser_name = info.ser_name,
                        "service repost changed nothing"
                    );
                    return Ok(existing.info.0.clone());
                }
            }
        }
    };

    let record = services::upsert(&state.db, app_instance_id, &info).await?;
    refresh_summary(state, &status.app_instance_id).await?;
    notify_availability(state, &record.info.0, change).await?;

    info!(
        app_instance_id,
        ser_name = record.ser_name,
        ser_instance_id = record.ser_instance_id,
        change = ?change,
        "service registration applied"
    );
    Ok(record.info.0.clone())
}

/// Updates one registration addressed by its instance id.
pub async fn update(
    state: &AppState,
    app_instance_id: &str,
    ser_instance_id: &str,
    mut info: ServiceInfo,
) -> ApiResult<ServiceInfo> {
    require_ready(state, app_instance_id).await?;

    let existing = services::get(&state.db, ser_instance_id)
        .await?
        .filter(|r| r.app_instance_id == app_instance_id)
        .ok_or_else(|| AppError::not_found(format!("service {ser_instance_id} not found")))?;

    if let Some(id) = &info.ser_instance_id
        && id != ser_instance_id
    {
        return Err(AppError::bad_request(
            "serInstanceId in body does not match the path",
        ));
    }
    info.ser_instance_id = Some(ser_instance_id.to_string());

    let Some(change) = classify_change(&existing.info.0, &info) else {
        return Ok(existing.info.0.clone());
    };

    let record = services::upsert(&state.db, app_instance_id, &info).await?;
    refresh_summary(state, app_instance_id).await?;
    notify_availability(state, &record.info.0, change).await?;
    Ok(record.info.0.clone())
}

/// Removes one registration owned by the instance.
pub async fn deregister(
    state: &AppState,
    app_instance_id: &str,
    ser_instance_id: &str,
) -> ApiResult<()> {
    require_ready(state, app_instance_id).await?;
    let existing = services::get(&state.db, ser_instance_id)
        .await?
        .filter(|r| r.app_instance_id == app_instance_id)
        .ok_or_else(|| AppError::not_found(format!("service {ser_instance_id} not found")))?;

    services::delete(&state.db, ser_instance_id).await?;
    refresh_summary(state, app_instance_id).await?;
    notify_availability(state, &existing.info.0, ServiceChangeType::Removed).await?;

    info!(
        app_instance_id,
        ser_instance_id, "service registration removed"
    );
    Ok(())
}

/// Lists the services registered by one instance, applying discovery filters.
pub async fn app_services(
    state: &AppState,
    app_instance_id: &str,
    mut filters: ServiceFilters,
) -> ApiResult<Vec<ServiceInfo>> {
    require_ready(state, app_instance_id).await?;
    validate_filters(&filters)?;
    filters.app_instance_id = Some(app_instance_id.to_string());

    let records = services::list(&state.db, &filters).await?;
    Ok(records.into_iter().map(|r| r.info.0).collect())
}

/// Platform-wide discovery; services owned by instances that are mid-teardown
/// are hidden.
pub async fn discover(state: &AppState, mut filters: ServiceFilters) -> ApiResult<Vec<ServiceInfo>> {
    validate_filters(&filters)?;
    filters.exclude_app_instance_ids = app_status::tearing_down_instances(&state.db).await?;

    let records = services::list(&state.db, &filters).await?;
    Ok(records.into_iter().map(|r| r.info.0).collect())
}

/// Looks up one service platform-wide, with the same teardown exclusion as
/// discovery.
pub async fn get(state: &AppState, ser_instance_id: &str) -> ApiResult<ServiceInfo> {
    let record = services::get(&state.db, ser_instance_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("service {ser_instance_id} not found")))?;

    let tearing_down = app_status::tearing_down_instances(&state.db).await?;
    if tearing_down.contains(&record.app_instance_id) {
        return Err(AppError::not_found(format!(
            "service {ser_instance_id} not found"
        )));
    }
    Ok(record.info.0)
}

/// The identity filters are mutually exclusive.
pub(crate) fn validate_filters(filters: &ServiceFilters) -> ApiResult<()> {
    let identity_filters = usize::from(filters.ser_instance_ids.is_some())
        + usize::from(filters.ser_names.is_some())
        + usize::from(filters.ser_category_id.is_some());
    if identity_filters > 1 {
        return Err(AppError::bad_request(
            "ser_instance_id, ser_name, and ser_category_id are mutually exclusive",
        ));
    }
    Ok(())
}

async fn require_ready(
    state: &AppState,
    app_instance_id: &str,
) -> ApiResult<crate::persistence::AppStatusRecord> {
    let status = app_status::get(&state.db, app_instance_id)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("application instance {app_instance_id} not found"))
        })?;
    if status.indication != Indication::Ready {
        return Err(AppError::forbidden(format!(
            "application instance {app_instance_id} is not READY"
        )));
    }
    Ok(status)
}

/// Rebuilds the per-instance service summary from the service rows.
async fn refresh_summary(state: &AppState, app_instance_id: &str) -> ApiResult<()> {
    let owned = services::list(
        &state.db,
        &ServiceFilters {
            app_instance_id: Some(app_instance_id.to_string()),
            ..Default::default()
        },
    )
    .await?;

    let summaries: Vec<ServiceSummary> = owned
        .iter()
        .map(|r| {
            ServiceSummary::now(
                r.ser_name.clone(),
                r.ser_instance_id.clone(),
                r.info.0.state,
                r.info.0.liveness_interval,
            )
        })
        .collect();
    app_status::set_services(&state.db, app_instance_id, &summaries).await?;
    Ok(())
}

/// Fans a service change out to every matching availability subscription.
async fn notify_availability(
    state: &AppState,
    info: &ServiceInfo,
    change: ServiceChangeType,
) -> ApiResult<()> {
    let ser_instance_id = info.ser_instance_id.clone().unwrap_or_default();
    let subs =
        subscriptions::list_by_kind(&state.db, subscriptions::KIND_SER_AVAILABILITY).await?;

    for sub in subs {
        if let Some(criteria) = &sub.filtering_criteria
            && !criteria_matches(&criteria.0, info)
        {
            continue;
        }

        let subscription_href = sub
            .links
            .as_ref()
            .map(|l| l.0.self_link.href.clone())
            .unwrap_or_else(|| {
                format!(
                    "/mp1/v1/applications/{}/subscriptions/{}",
                    sub.app_instance_id, sub.subscription_id
                )
            });
        let notice = ServiceAvailabilityNotification {
            notification_type: "SerAvailabilityNotification".to_string(),
            service_references: vec![ServiceReference {
                link: LinkType::new(format!("/mp1/v1/services/{ser_instance_id}")),
                ser_name: info.ser_name.clone(),
                ser_instance_id: ser_instance_id.clone(),
                state: info.state,
                change_type: change,
            }],
            links: NotificationLinks {
                subscription: LinkType::new(subscription_href),
            },
        };
        let payload = serde_json::to_value(&notice).map_err(anyhow::Error::from)?;
        state
            .dispatcher
            .dispatch_after(sub.callback_reference, payload, Duration::ZERO);
    }
    Ok(())
}
