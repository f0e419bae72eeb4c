//! Subscription management and the matching predicate used when fanning out
//! availability notifications.

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use mep_common::api::{
    AppTerminationNotificationSubscription, FilteringCriteria, LinkType,
    SerAvailabilityNotificationSubscription, SelfLinks, ServiceInfo, SubscriptionLink,
    SubscriptionLinkList, SubscriptionLinkListLinks,
};

use crate::app_state::AppState;
use crate::error::{ApiResult, AppError};
use crate::persistence::SubscriptionRecord;
use crate::persistence::subscriptions::{
    self as store, KIND_APP_TERMINATION, KIND_SER_AVAILABILITY, NewSubscription,
};
use crate::persistence::{Indication, app_status};

/// True when a service matches the criteria. Every set criterion must match;
/// an unset criterion matches anything.
pub(crate) fn criteria_matches(criteria: &FilteringCriteria, info: &ServiceInfo) -> bool {
    if let Some(ids) = &criteria.ser_instance_ids {
        let Some(id) = &info.ser_instance_id else {
            return false;
        };
        if !ids.contains(id) {
            return false;
        }
    }
    if let Some(names) = &criteria.ser_names
        && !names.contains(&info.ser_name)
    {
        return false;
    }
    if let Some(categories) = &criteria.ser_categories {
        let Some(category) = &info.ser_category else {
            return false;
        };
        if !categories.iter().any(|c| c.id == category.id) {
            return false;
        }
    }
    if let Some(states) = &criteria.states
        && !states.contains(&info.state)
    {
        return false;
    }
    if let Some(is_local) = criteria.is_local
        && info.is_local.unwrap_or(false) != is_local
    {
        return false;
    }
    true
}

/// The three identity criteria are mutually exclusive.
fn validate_criteria(criteria: &FilteringCriteria) -> ApiResult<()> {
    let identity_criteria = usize::from(criteria.ser_instance_ids.is_some())
        + usize::from(criteria.ser_names.is_some())
        + usize::from(criteria.ser_categories.is_some());
    if identity_criteria > 1 {
        return Err(AppError::bad_request(
            "serInstanceIds, serNames, and serCategories are mutually exclusive",
        ));
    }
    Ok(())
}

async fn require_ready(state: &AppState, app_instance_id: &str) -> ApiResult<()> {
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
    Ok(())
}

fn subscription_href(app_instance_id: &str, subscription_id: &str) -> String {
    format!("/mp1/v1/applications/{app_instance_id}/subscriptions/{subscription_id}")
}

/// Stores an availability subscription; the self link is generated when the
/// caller did not provide one.
pub async fn create_availability(
    state: &AppState,
    app_instance_id: &str,
    mut subscription: SerAvailabilityNotificationSubscription,
) -> ApiResult<(String, SerAvailabilityNotificationSubscription)> {
    require_ready(state, app_instance_id).await?;
    if let Some(criteria) = &subscription.filtering_criteria {
        validate_criteria(criteria)?;
    }

    let subscription_id = Uuid::new_v4().to_string();
    let links = subscription.links.take().unwrap_or_else(|| SelfLinks {
        self_link: LinkType::new(subscription_href(app_instance_id, &subscription_id)),
    });

    store::create(
        &state.db,
        NewSubscription {
            subscription_id: &subscription_id,
            app_instance_id,
            kind: KIND_SER_AVAILABILITY,
            callback_reference: &subscription.callback_reference,
            filtering_criteria: subscription.filtering_criteria.as_ref(),
            links: Some(&links),
        },
    )
    .await?;

    info!(app_instance_id, subscription_id, "availability subscription created");
    subscription.links = Some(links);
    Ok((subscription_id, subscription))
}

/// Stores a termination subscription; its `appInstanceId` must name the
/// instance it is created under.
pub async fn create_termination(
    state: &AppState,
    app_instance_id: &str,
    mut subscription: AppTerminationNotificationSubscription,
) -> ApiResult<(String, AppTerminationNotificationSubscription)> {
    require_ready(state, app_instance_id).await?;
    if subscription.app_instance_id != app_instance_id {
        return Err(AppError::bad_request(
            "appInstanceId in body does not match the path",
        ));
    }

    let subscription_id = Uuid::new_v4().to_string();
    let links = subscription.links.take().unwrap_or_else(|| SelfLinks {
        self_link: LinkType::new(subscription_href(app_instance_id, &subscription_id)),
    });

    store::create(
        &state.db,
        NewSubscription {
            subscription_id: &subscription_id,
            app_instance_id,
            kind: KIND_APP_TERMINATION,
            callback_reference: &subscription.callback_reference,
            filtering_criteria: None,
            links: Some(&links),
        },
    )
    .await?;

    info!(app_instance_id, subscription_id, "termination subscription created");
    subscription.links = Some(links);
    Ok((subscription_id, subscription))
}

/// Lists an instance's subscriptions as a link list.
pub async fn list(state: &AppState, app_instance_id: &str) -> ApiResult<SubscriptionLinkList> {
    require_ready(state, app_instance_id).await?;

    let records = store::list_for_app(&state.db, app_instance_id).await?;
    let subscriptions = records
        .iter()
        .map(|record| SubscriptionLink {
            href: record
                .links
                .as_ref()
                .map(|l| l.0.self_link.href.clone())
                .unwrap_or_else(|| {
                    subscription_href(app_instance_id, &record.subscription_id)
                }),
            rel: record.kind.clone(),
        })
        .collect();

    Ok(SubscriptionLinkList {
        links: SubscriptionLinkListLinks {
            self_link: LinkType::new(format!(
                "/mp1/v1/applications/{app_instance_id}/subscriptions"
            )),
            subscriptions,
        },
    })
}

/// Returns one subscription in its kind-specific wire shape.
pub async fn get(
    state: &AppState,
    app_instance_id: &str,
    subscription_id: &str,
) -> ApiResult<Value> {
    require_ready(state, app_instance_id).await?;
    let record = store::get(&state.db, subscription_id)
        .await?
        .filter(|r| r.app_instance_id == app_instance_id)
        .ok_or_else(|| {
            AppError::not_found(format!("subscription {subscription_id} not found"))
        })?;
    record_body(&record)
}

fn record_body(record: &SubscriptionRecord) -> ApiResult<Value> {
    let links = record.links.as_ref().map(|l| l.0.clone());
    let body = if record.kind == KIND_SER_AVAILABILITY {
        serde_json::to_value(SerAvailabilityNotificationSubscription {
            subscription_type: record.kind.clone(),
            callback_reference: record.callback_reference.clone(),
            links,
            filtering_criteria: record.filtering_criteria.as_ref().map(|c| c.0.clone()),
        })
    } else {
        serde_json::to_value(AppTerminationNotificationSubscription {
            subscription_type: record.kind.clone(),
            callback_reference: record.callback_reference.clone(),
            links,
            app_instance_id: record.app_instance_id.clone(),
        })
    };
    body.map_err(|err| AppError::from(anyhow::Error::from(err)))
}

/// Deletes one subscription.
pub async fn delete(
    state: &AppState,
    app_instance_id: &str,
    subscription_id: &str,
) -> ApiResult<()> {
    let exists = store::get(&state.db, subscription_id)
        .await?
        .is_some_and(|r| r.app_instance_id == app_instance_id);
    if !exists {
        return Err(AppError::not_found(format!(
            "subscription {subscription_id} not found"
        )));
    }

    store::delete(&state.db, subscription_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::lifecycle;
    use crate::test_support::{self, TestPlatform};
    use axum::http::StatusCode;
    use mep_common::api::{
        AppReadyConfirmation, CategoryRef, ConfigPlatformForApp, IndicationType, SerializerType,
        ServiceState,
    };

    fn info(name: &str, state: ServiceState) -> ServiceInfo {
        ServiceInfo {
            ser_instance_id: Some("svc-1".into()),
            ser_name: name.to_string(),
            ser_category: Some(CategoryRef {
                href: "/categories/loc".into(),
                id: "loc".into(),
                name: "Location".into(),
                version: "1".into(),
            }),
            version: "1.0".into(),
            state,
            transport_info: None,
            serializer: SerializerType::Json,
            scope_of_locality: None,
            consumed_local_only: None,
            is_local: Some(true),
            liveness_interval: None,
            links: None,
        }
    }

    fn availability_subscription(callback: &str) -> SerAvailabilityNotificationSubscription {
        SerAvailabilityNotificationSubscription {
            subscription_type: KIND_SER_AVAILABILITY.to_string(),
            callback_reference: callback.to_string(),
            links: None,
            filtering_criteria: None,
        }
    }

    async fn ready_instance(platform: &TestPlatform, app: &str) {
        lifecycle::configure(&platform.state, app, ConfigPlatformForApp::default())
            .await
            .expect("configure");
        lifecycle::confirm_ready(
            &platform.state,
            app,
            AppReadyConfirmation {
                indication: IndicationType::Ready,
            },
        )
        .await
        .expect("ready");
    }

    #[test]
    fn unset_criteria_match_everything() {
        let criteria = FilteringCriteria::default();
        assert!(criteria_matches(&criteria, &info("location", ServiceState::Active)));
    }

    #[test]
    fn set_criteria_must_all_match() {
        let criteria = FilteringCriteria {
            ser_names: Some(vec!["location".into()]),
            states: Some(vec![ServiceState::Active]),
            ..Default::default()
        };

        assert!(criteria_matches(&criteria, &info("location", ServiceState::Active)));
        assert!(!criteria_matches(&criteria, &info("location", ServiceState::Inactive)));
        assert!(!criteria_matches(&criteria, &info("radio", ServiceState::Active)));
    }

    #[test]
    fn category_criterion_matches_by_id() {
        let criteria = FilteringCriteria {
            ser_categories: Some(vec![CategoryRef {
                href: "/categories/loc".into(),
                id: "loc".into(),
                name: "anything".into(),
                version: "9".into(),
            }]),
            ..Default::default()
        };

        assert!(criteria_matches(&criteria, &info("location", ServiceState::Active)));

        let mut other = info("location", ServiceState::Active);
        other.ser_category = None;
        assert!(!criteria_matches(&criteria, &other));
    }

    #[test]
    fn is_local_criterion_requires_exact_match() {
        let criteria = FilteringCriteria {
            is_local: Some(true),
            ..Default::default()
        };

        assert!(criteria_matches(&criteria, &info("location", ServiceState::Active)));

        let mut remote = info("location", ServiceState::Active);
        remote.is_local = Some(false);
        assert!(!criteria_matches(&criteria, &remote));
    }

    #[tokio::test]
    async fn create_generates_id_and_self_link() {
        let platform = test_support::platform().await;
        ready_instance(&platform, "app-1").await;

        let (id, body) = create_availability(
            &platform.state,
            "app-1",
            availability_subscription("http://app-1/cb"),
        )
        .await
        .expect("create");

        let href = body.links.expect("links").self_link.href;
        assert!(href.ends_with(&id));
        assert!(href.contains("/applications/app-1/subscriptions/"));

        let fetched = get(&platform.state, "app-1", &id).await.expect("get");
        assert_eq!(fetched["callbackReference"], "http://app-1/cb");
        assert_eq!(fetched["subscriptionType"], KIND_SER_AVAILABILITY);
    }

    #[tokio::test]
    async fn create_rejects_conflicting_identity_criteria() {
        let platform = test_support::platform().await;
        ready_instance(&platform, "app-1").await;

        let mut subscription = availability_subscription("http://app-1/cb");
        subscription.filtering_criteria = Some(FilteringCriteria {
            ser_names: Some(vec!["a".into()]),
            ser_instance_ids: Some(vec!["b".into()]),
            ..Default::default()
        });

        let err = create_availability(&platform.state, "app-1", subscription)
            .await
            .expect_err("should fail");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn termination_subscription_must_name_its_own_instance() {
        let platform = test_support::platform().await;
        ready_instance(&platform, "app-1").await;

        let err = create_termination(
            &platform.state,
            "app-1",
            AppTerminationNotificationSubscription {
                subscription_type: KIND_APP_TERMINATION.to_string(),
                callback_reference: "http://app-1/term".into(),
                links: None,
                app_instance_id: "app-2".into(),
            },
        )
        .await
        .expect_err("should fail");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_links_both_kinds_and_delete_removes() {
        let platform = test_support::platform().await;
        ready_instance(&platform, "app-1").await;

        let (avail_id, _) = create_availability(
            &platform.state,
            "app-1",
            availability_subscription("http://app-1/cb"),
        )
        .await
        .expect("create");
        create_termination(
            &platform.state,
            "app-1",
            AppTerminationNotificationSubscription {
                subscription_type: KIND_APP_TERMINATION.to_string(),
                callback_reference: "http://app-1/term".into(),
                links: None,
                app_instance_id: "app-1".into(),
            },
        )
        .await
        .expect("create");

        let listed = list(&platform.state, "app-1").await.expect("list");
        assert_eq!(listed.links.subscriptions.len(), 2);
        let rels: Vec<&str> = listed
            .links
            .subscriptions
            .iter()
            .map(|s| s.rel.as_str())
            .collect();
        assert!(rels.contains(&KIND_SER_AVAILABILITY));
        assert!(rels.contains(&KIND_APP_TERMINATION));

        delete(&platform.state, "app-1", &avail_id)
            .await
            .expect("delete");
        let err = delete(&platform.state, "app-1", &avail_id)
            .await
            .expect_err("gone");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn subscriptions_require_ready_instance() {
        let platform = test_support::platform().await;
        lifecycle::configure(&platform.state, "app-1", ConfigPlatformForApp::default())
            .await
            .expect("configure");

        let err = create_availability(
            &platform.state,
            "app-1",
            availability_subscription("http://app-1/cb"),
        )
        .await
        .expect_err("should fail");
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }
}
