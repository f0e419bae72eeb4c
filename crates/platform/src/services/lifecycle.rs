//! Application instance lifecycle: configuration, readiness, state changes,
//! and the termination cascade.
//!
//! An instance moves STARTING -> READY -> (STOPPING | TERMINATING) -> removed.
//! Teardown always runs the same cascade: credentials are revoked first, and
//! nothing is deleted until revocation succeeds.

use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use mep_common::api::{
    AppReadyConfirmation, AppTerminationConfirmation, AppTerminationNotification,
    ChangeAppInstanceState, ChangeStateTo, ConfigPlatformForApp, LcmOperation, LcmOperationRef,
    LinkType, NotificationLinks, OAuthCredentials, OperationActionType, RuleState,
};

use crate::app_state::AppState;
use crate::error::{ApiResult, AppError};
use crate::persistence::{
    AppStatusRecord, DbOperationStatus, DnsRuleState, Indication, OperationKind, ServiceFilters,
    app_status, dns_rules, lcm_operations, services, subscriptions, traffic_rules,
};
use crate::rate_limit::RateLimitDecision;

/// Provisions the platform for a new application instance.
///
/// Credentials and active DNS records are obtained before anything is
/// persisted; a failing collaborator leaves no trace of the instance.
pub async fn configure(
    state: &AppState,
    app_instance_id: &str,
    request: ConfigPlatformForApp,
) -> ApiResult<LcmOperationRef> {
    if app_status::get(&state.db, app_instance_id).await?.is_some() {
        return Err(AppError::conflict(format!(
            "application instance {app_instance_id} is already configured"
        )));
    }

    let registration = state.oauth.register_client().await.map_err(|err| {
        warn!(?err, app_instance_id, "credential provisioning failed");
        AppError::forbidden("credential provisioning failed, retry the request")
    })?;
    let access_token = state
        .oauth
        .issue_token(&registration.client_id, &registration.client_secret)
        .await
        .map_err(|err| {
            warn!(?err, app_instance_id, "token issuance failed");
            AppError::forbidden("credential provisioning failed, retry the request")
        })?;

    for rule in &request.app_dns_rule {
        if rule.state == RuleState::Active {
            state
                .dns
                .create_record(&rule.domain_name, &rule.ip_address, rule.ttl)
                .await
                .map_err(|err| {
                    warn!(
                        ?err,
                        app_instance_id,
                        dns_rule_id = rule.dns_rule_id,
                        "dns record provisioning failed"
                    );
                    AppError::forbidden("dns record provisioning failed, retry the request")
                })?;
        }
    }

    for rule in &request.app_traffic_rule {
        traffic_rules::upsert(&state.db, app_instance_id, rule).await?;
    }
    for rule in &request.app_dns_rule {
        dns_rules::upsert(&state.db, app_instance_id, rule).await?;
    }

    let credentials = OAuthCredentials {
        client_id: registration.client_id,
        client_secret: registration.client_secret,
        access_token,
    };
    app_status::create(&state.db, app_instance_id, Indication::Starting, &credentials)
        .await
        .map_err(|err| {
            if crate::error::is_unique_violation(&err) {
                AppError::conflict(format!(
                    "application instance {app_instance_id} is already configured"
                ))
            } else {
                err.into()
            }
        })?;
    let operation = lcm_operations::create(&state.db, app_instance_id, OperationKind::Starting)
        .await?;

    info!(
        app_instance_id,
        operation_id = %operation.lcm_operation_id,
        traffic_rules = request.app_traffic_rule.len(),
        dns_rules = request.app_dns_rule.len(),
        "application instance configured"
    );

    Ok(LcmOperationRef {
        lifecycle_operation_occurrence_id: operation.lcm_operation_id,
    })
}

/// Handles a readiness confirmation posted by the instance itself.
///
/// Confirming an already-READY instance is a no-op; each attempt is charged
/// against the readiness limiter regardless of outcome.
pub async fn confirm_ready(
    state: &AppState,
    app_instance_id: &str,
    confirmation: AppReadyConfirmation,
) -> ApiResult<RateLimitDecision> {
    if confirmation.indication != mep_common::api::IndicationType::Ready {
        return Err(AppError::bad_request("indication must be READY"));
    }

    let decision = state.ready_attempts.lock().await.check(app_instance_id);
    if !decision.allowed {
        return Err(
            AppError::too_many_requests("too many readiness confirmations")
                .with_headers(decision.headers()),
        );
    }

    let record = app_status::get(&state.db, app_instance_id)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("application instance {app_instance_id} not found"))
        })?;

    match record.indication {
        Indication::Ready => {}
        Indication::Starting => {
            app_status::set_indication(&state.db, app_instance_id, Indication::Ready).await?;
            lcm_operations::finish_latest(
                &state.db,
                app_instance_id,
                OperationKind::Starting,
                DbOperationStatus::SuccessfullyDone,
            )
            .await?;
            state.ready_attempts.lock().await.clear(app_instance_id);
            info!(app_instance_id, "application instance is ready");
        }
        Indication::Stopping | Indication::Terminating => {
            return Err(AppError::conflict(format!(
                "application instance {app_instance_id} is being torn down"
            )));
        }
    }

    Ok(decision)
}

/// Handles a termination acknowledgement posted by the instance itself.
///
/// The acknowledged action must match the requested one; a matching
/// acknowledgement runs the full teardown cascade.
pub async fn confirm_termination(
    state: &AppState,
    app_instance_id: &str,
    confirmation: AppTerminationConfirmation,
) -> ApiResult<RateLimitDecision> {
    let decision = state
        .termination_attempts
        .lock()
        .await
        .check(app_instance_id);
    if !decision.allowed {
        return Err(
            AppError::too_many_requests("too many termination confirmations")
                .with_headers(decision.headers()),
        );
    }

    let record = app_status::get(&state.db, app_instance_id)
        .await?
        .ok_or_else(|| {
            AppError::conflict(format!(
                "no termination in progress for application instance {app_instance_id}"
            ))
        })?;

    let requested = match record.indication {
        Indication::Stopping => OperationActionType::Stopping,
        Indication::Terminating => OperationActionType::Terminating,
        Indication::Starting | Indication::Ready => {
            return Err(AppError::conflict(format!(
                "no termination in progress for application instance {app_instance_id}"
            )));
        }
    };
    if confirmation.operation_action != requested {
        return Err(AppError::conflict(format!(
            "acknowledged action {} does not match requested action {}",
            confirmation.operation_action.as_str(),
            requested.as_str()
        )));
    }

    teardown(state, &record, true).await?;
    state
        .termination_attempts
        .lock()
        .await
        .clear(app_instance_id);
    state.ready_attempts.lock().await.clear(app_instance_id);

    Ok(decision)
}

/// Removes every trace of an instance.
///
/// Order matters: revocation comes first and, when `enforce_revocation` is
/// set, aborts the cascade on failure so the caller can retry with all state
/// intact. Forced cleanup after a graceful timeout passes `false` and
/// tolerates a revocation failure.
async fn teardown(
    state: &AppState,
    record: &AppStatusRecord,
    enforce_revocation: bool,
) -> ApiResult<()> {
    let app_instance_id = record.app_instance_id.as_str();
    let kind = match record.indication {
        Indication::Stopping => OperationKind::Stopping,
        _ => OperationKind::Terminating,
    };

    if let Err(err) = state
        .oauth
        .revoke_client(&record.oauth.0.client_id, &record.oauth.0.client_secret)
        .await
    {
        warn!(?err, app_instance_id, "credential revocation failed");
        if enforce_revocation {
            return Err(AppError::forbidden(
                "credential revocation failed, retry the confirmation",
            ));
        }
    }

    traffic_rules::delete_for_app(&state.db, app_instance_id).await?;

    for rule in dns_rules::list_for_app(&state.db, app_instance_id).await? {
        if rule.state == DnsRuleState::Active
            && let Err(err) = state.dns.delete_record(&rule.domain_name).await
        {
            warn!(
                ?err,
                app_instance_id,
                domain = rule.domain_name,
                "dns record cleanup failed"
            );
        }
    }
    dns_rules::delete_for_app(&state.db, app_instance_id).await?;

    let owned = services::list(
        &state.db,
        &ServiceFilters {
            app_instance_id: Some(app_instance_id.to_string()),
            ..Default::default()
        },
    )
    .await?;
    let ser_ids: Vec<String> = owned.iter().map(|r| r.ser_instance_id.clone()).collect();
    services::delete_many(&state.db, &ser_ids).await?;

    subscriptions::delete_for_app(&state.db, app_instance_id).await?;
    app_status::delete(&state.db, app_instance_id).await?;
    lcm_operations::finish_latest(
        &state.db,
        app_instance_id,
        kind,
        DbOperationStatus::SuccessfullyDone,
    )
    .await?;

    info!(app_instance_id, services = ser_ids.len(), "application instance removed");
    Ok(())
}

/// Moves an instance toward STARTED or STOPPED on behalf of the manager.
pub async fn update_state(
    state: &AppState,
    app_instance_id: &str,
    request: ChangeAppInstanceState,
) -> ApiResult<LcmOperationRef> {
    let record = app_status::get(&state.db, app_instance_id)
        .await?
        .ok_or_else(|| {
            AppError::conflict(format!(
                "application instance {app_instance_id} is not configured"
            ))
        })?;

    match request.change_state_to {
        ChangeStateTo::Stopped => {
            if record.indication == Indication::Stopping {
                return Err(AppError::conflict(format!(
                    "application instance {app_instance_id} is already stopping"
                )));
            }
            if record.indication == Indication::Terminating {
                return Err(AppError::conflict(format!(
                    "application instance {app_instance_id} is terminating"
                )));
            }

            app_status::set_indication(&state.db, app_instance_id, Indication::Stopping).await?;
            let operation =
                lcm_operations::create(&state.db, app_instance_id, OperationKind::Stopping).await?;
            notify_termination(
                state,
                app_instance_id,
                OperationActionType::Stopping,
                request.graceful_stop_timeout.unwrap_or(0),
            )
            .await?;

            Ok(LcmOperationRef {
                lifecycle_operation_occurrence_id: operation.lcm_operation_id,
            })
        }
        ChangeStateTo::Started => {
            if record.indication == Indication::Ready {
                return Err(AppError::conflict(format!(
                    "application instance {app_instance_id} is already started"
                )));
            }

            app_status::set_indication(&state.db, app_instance_id, Indication::Ready).await?;
            let operation =
                lcm_operations::create(&state.db, app_instance_id, OperationKind::Starting).await?;
            lcm_operations::set_status(
                &state.db,
                operation.lcm_operation_id,
                DbOperationStatus::SuccessfullyDone,
            )
            .await?;

            Ok(LcmOperationRef {
                lifecycle_operation_occurrence_id: operation.lcm_operation_id,
            })
        }
    }
}

/// Manager-initiated stop or termination.
///
/// The instance is notified and granted `gracefulStopTimeout` seconds to
/// acknowledge; a background task forces the cascade afterwards if it never
/// does.
pub async fn request_termination(
    state: &AppState,
    app_instance_id: &str,
    request: mep_common::api::TerminateAppInstance,
) -> ApiResult<LcmOperationRef> {
    let record = app_status::get(&state.db, app_instance_id)
        .await?
        .ok_or_else(|| {
            AppError::conflict(format!(
                "application instance {app_instance_id} is not configured"
            ))
        })?;

    let target = Indication::from(request.termination_type.indication());
    if record.indication == target {
        return Err(AppError::conflict(format!(
            "application instance {app_instance_id} is already {}",
            request.termination_type.as_str()
        )));
    }

    app_status::set_indication(&state.db, app_instance_id, target).await?;
    let kind = match request.termination_type {
        OperationActionType::Stopping => OperationKind::Stopping,
        OperationActionType::Terminating => OperationKind::Terminating,
    };
    let operation = lcm_operations::create(&state.db, app_instance_id, kind).await?;

    let timeout = request.graceful_stop_timeout.unwrap_or(0);
    notify_termination(state, app_instance_id, request.termination_type, timeout).await?;
    schedule_forced_teardown(state, app_instance_id, timeout);

    Ok(LcmOperationRef {
        lifecycle_operation_occurrence_id: operation.lcm_operation_id,
    })
}

/// Delivers the termination notice to the instance's own subscription, if any.
async fn notify_termination(
    state: &AppState,
    app_instance_id: &str,
    action: OperationActionType,
    max_graceful_timeout: u32,
) -> ApiResult<()> {
    let Some(subscription) =
        subscriptions::termination_subscription(&state.db, app_instance_id).await?
    else {
        info!(app_instance_id, "no termination subscription registered");
        return Ok(());
    };

    let href = subscription
        .links
        .as_ref()
        .map(|l| l.0.self_link.href.clone())
        .unwrap_or_else(|| {
            format!(
                "/mp1/v1/applications/{app_instance_id}/subscriptions/{}",
                subscription.subscription_id
            )
        });
    let notice = AppTerminationNotification {
        notification_type: "AppTerminationNotification".to_string(),
        operation_action: action,
        max_graceful_timeout,
        links: NotificationLinks {
            subscription: LinkType::new(href),
        },
    };
    let payload = serde_json::to_value(&notice).map_err(anyhow::Error::from)?;
    state.dispatcher.dispatch_after(
        subscription.callback_reference,
        payload,
        Duration::from_secs(state.notifications.termination_delay_secs),
    );
    Ok(())
}

/// Runs the cascade once the graceful window has elapsed, unless the
/// instance already confirmed and disappeared.
fn schedule_forced_teardown(state: &AppState, app_instance_id: &str, graceful_stop_timeout: u32) {
    let state = state.clone();
    let app_instance_id = app_instance_id.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(u64::from(graceful_stop_timeout))).await;

        let record = match app_status::get(&state.db, &app_instance_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(err) => {
                warn!(?err, app_instance_id, "forced teardown lookup failed");
                return;
            }
        };
        if !matches!(
            record.indication,
            Indication::Stopping | Indication::Terminating
        ) {
            return;
        }

        warn!(
            app_instance_id,
            graceful_stop_timeout, "graceful window elapsed, forcing teardown"
        );
        if let Err(err) = teardown(&state, &record, false).await {
            warn!(
                status = %err.status,
                app_instance_id,
                "forced teardown failed: {}",
                err.message
            );
        }
    });
}

/// Looks up one lifecycle operation occurrence.
pub async fn operation(state: &AppState, operation_id: Uuid) -> ApiResult<LcmOperation> {
    let record = lcm_operations::get(&state.db, operation_id)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("lifecycle operation {operation_id} not found"))
        })?;
    Ok(record.to_api())
}

/// Lists every recorded lifecycle operation occurrence.
pub async fn operations(state: &AppState) -> ApiResult<Vec<LcmOperation>> {
    let records = lcm_operations::list(&state.db).await?;
    Ok(records.iter().map(|record| record.to_api()).collect())
}

/// Returns the credential bundle issued to an instance at configuration time.
pub async fn credentials(state: &AppState, app_instance_id: &str) -> ApiResult<OAuthCredentials> {
    let record = app_status::get(&state.db, app_instance_id)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("application instance {app_instance_id} not found"))
        })?;
    Ok(record.oauth.0.clone())
}
