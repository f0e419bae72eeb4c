//! Traffic and DNS rule management.
//!
//! Rules are provisioned at configuration time; PUT updates an existing rule
//! but never creates one. DNS rule updates honor `If-Match` and
//! `If-Unmodified-Since`, and a failed precondition leaves both the stored
//! rule and the external DNS service untouched.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use mep_common::api::{DnsRule, RuleState, TrafficRule};

use crate::app_state::AppState;
use crate::error::{ApiResult, AppError};
use crate::persistence::{DnsRuleRecord, app_status, dns_rules, traffic_rules};

/// A stored DNS rule plus its concurrency anchors.
#[derive(Debug, Clone)]
pub struct DnsRuleView {
    pub rule: DnsRule,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

impl From<&DnsRuleRecord> for DnsRuleView {
    fn from(record: &DnsRuleRecord) -> Self {
        let rule = record.to_api();
        let etag = rule_etag(&rule);
        Self {
            rule,
            etag,
            last_modified: record.last_modified,
        }
    }
}

/// ETag of a DNS rule: hex SHA-256 over its canonical JSON form.
pub(crate) fn rule_etag(rule: &DnsRule) -> String {
    let canonical = serde_json::to_vec(rule).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

async fn require_instance(state: &AppState, app_instance_id: &str) -> ApiResult<()> {
    if app_status::get(&state.db, app_instance_id).await?.is_none() {
        return Err(AppError::not_found(format!(
            "application instance {app_instance_id} not found"
        )));
    }
    Ok(())
}

async fn require_ready(state: &AppState, app_instance_id: &str) -> ApiResult<()> {
    let status = app_status::get(&state.db, app_instance_id)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("application instance {app_instance_id} not found"))
        })?;
    if status.indication != crate::persistence::Indication::Ready {
        return Err(AppError::forbidden(format!(
            "application instance {app_instance_id} is not READY"
        )));
    }
    Ok(())
}

/// Lists an instance's traffic rules.
pub async fn list_traffic(state: &AppState, app_instance_id: &str) -> ApiResult<Vec<TrafficRule>> {
    require_ready(state, app_instance_id).await?;
    let records = traffic_rules::list_for_app(&state.db, app_instance_id).await?;
    Ok(records.into_iter().map(|r| r.rule.0).collect())
}

/// Fetches one traffic rule.
pub async fn get_traffic(
    state: &AppState,
    app_instance_id: &str,
    traffic_rule_id: &str,
) -> ApiResult<TrafficRule> {
    require_ready(state, app_instance_id).await?;
    let record = traffic_rules::get(&state.db, app_instance_id, traffic_rule_id)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("traffic rule {traffic_rule_id} not found"))
        })?;
    Ok(record.rule.0)
}

/// Replaces one traffic rule; the rule must already exist.
pub async fn put_traffic(
    state: &AppState,
    app_instance_id: &str,
    traffic_rule_id: &str,
    rule: TrafficRule,
) -> ApiResult<TrafficRule> {
    require_ready(state, app_instance_id).await?;
    if rule.traffic_rule_id != traffic_rule_id {
        return Err(AppError::bad_request(
            "trafficRuleId in body does not match the path",
        ));
    }
    if traffic_rules::get(&state.db, app_instance_id, traffic_rule_id)
        .await?
        .is_none()
    {
        return Err(AppError::not_found(format!(
            "traffic rule {traffic_rule_id} not found"
        )));
    }

    traffic_rules::upsert(&state.db, app_instance_id, &rule).await?;
    info!(app_instance_id, traffic_rule_id, "traffic rule replaced");
    Ok(rule)
}

/// Lists an instance's DNS rules.
pub async fn list_dns(state: &AppState, app_instance_id: &str) -> ApiResult<Vec<DnsRule>> {
    require_instance(state, app_instance_id).await?;
    let records = dns_rules::list_for_app(&state.db, app_instance_id).await?;
    Ok(records.iter().map(|r| r.to_api()).collect())
}

/// Fetches one DNS rule with its ETag and Last-Modified anchors.
pub async fn get_dns(
    state: &AppState,
    app_instance_id: &str,
    dns_rule_id: &str,
) -> ApiResult<DnsRuleView> {
    require_instance(state, app_instance_id).await?;
    let record = dns_rules::get(&state.db, app_instance_id, dns_rule_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("dns rule {dns_rule_id} not found")))?;
    Ok(DnsRuleView::from(&record))
}

/// Replaces one DNS rule.
///
/// Preconditions are checked before anything else: a stale `If-Match` or
/// `If-Unmodified-Since` fails with 412 and neither the stored rule nor the
/// external DNS service is touched. State transitions then drive the DNS
/// collaborator before the new rule is persisted.
pub async fn put_dns(
    state: &AppState,
    app_instance_id: &str,
    dns_rule_id: &str,
    rule: DnsRule,
    if_match: Option<&str>,
    if_unmodified_since: Option<DateTime<Utc>>,
) -> ApiResult<DnsRuleView> {
    require_instance(state, app_instance_id).await?;
    if rule.dns_rule_id != dns_rule_id {
        return Err(AppError::bad_request(
            "dnsRuleId in body does not match the path",
        ));
    }

    let existing = dns_rules::get(&state.db, app_instance_id, dns_rule_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("dns rule {dns_rule_id} not found")))?;

    if let Some(expected) = if_match {
        let current = rule_etag(&existing.to_api());
        if expected.trim_matches('"') != current {
            return Err(AppError::precondition_failed(
                "stored rule no longer matches If-Match",
            ));
        }
    }
    if let Some(anchor) = if_unmodified_since
        && existing.last_modified > anchor
    {
        return Err(AppError::precondition_failed(
            "stored rule was modified after If-Unmodified-Since",
        ));
    }

    let was_active = crate::persistence::DnsRuleState::Active == existing.state;
    let is_active = rule.state == RuleState::Active;

    if was_active && (!is_active || existing.domain_name != rule.domain_name) {
        state
            .dns
            .delete_record(&existing.domain_name)
            .await
            .map_err(|err| {
                warn!(?err, app_instance_id, dns_rule_id, "dns record removal failed");
                AppError::forbidden("dns record removal failed, retry the request")
            })?;
    }
    if is_active && (!was_active || existing.domain_name != rule.domain_name) {
        state
            .dns
            .create_record(&rule.domain_name, &rule.ip_address, rule.ttl)
            .await
            .map_err(|err| {
                warn!(?err, app_instance_id, dns_rule_id, "dns record creation failed");
                AppError::forbidden("dns record creation failed, retry the request")
            })?;
    }

    let record = dns_rules::upsert(&state.db, app_instance_id, &rule).await?;
    info!(app_instance_id, dns_rule_id, state = rule.state.as_str(), "dns rule replaced");
    Ok(DnsRuleView::from(&record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::lifecycle;
    use crate::test_support::{self, TestPlatform};
    use axum::http::StatusCode;
    use chrono::Duration as ChronoDuration;
    use mep_common::api::{
        AppReadyConfirmation, ConfigPlatformForApp, FilterType, IndicationType, IpAddressType,
        TrafficRuleAction,
    };

    fn dns_rule(state: RuleState) -> DnsRule {
        DnsRule {
            dns_rule_id: "dns-1".into(),
            domain_name: "app.edge.example".into(),
            ip_address_type: IpAddressType::IpV4,
            ip_address: "10.0.0.7".into(),
            ttl: 300,
            state,
        }
    }

    fn traffic_rule(priority: u32) -> TrafficRule {
        TrafficRule {
            traffic_rule_id: "tr-1".into(),
            filter_type: FilterType::Flow,
            priority,
            traffic_filter: vec![],
            action: TrafficRuleAction::Passthrough,
            dst_interface: None,
            state: RuleState::Active,
        }
    }

    async fn configured_with_rules(platform: &TestPlatform, dns_state: RuleState) {
        lifecycle::configure(
            &platform.state,
            "app-1",
            ConfigPlatformForApp {
                app_traffic_rule: vec![traffic_rule(1)],
                app_dns_rule: vec![dns_rule(dns_state)],
            },
        )
        .await
        .expect("configure");
        lifecycle::confirm_ready(
            &platform.state,
            "app-1",
            AppReadyConfirmation {
                indication: IndicationType::Ready,
            },
        )
        .await
        .expect("ready");
    }

    #[test]
    fn etag_changes_with_rule_content() {
        let inactive = rule_etag(&dns_rule(RuleState::Inactive));
        let active = rule_etag(&dns_rule(RuleState::Active));
        assert_ne!(inactive, active);
        assert_eq!(active, rule_etag(&dns_rule(RuleState::Active)));
        assert_eq!(active.len(), 64);
    }

    #[tokio::test]
    async fn traffic_put_updates_but_never_creates() {
        let platform = test_support::platform().await;
        configured_with_rules(&platform, RuleState::Inactive).await;

        let updated = put_traffic(&platform.state, "app-1", "tr-1", traffic_rule(9))
            .await
            .expect("put");
        assert_eq!(updated.priority, 9);

        let mut unknown = traffic_rule(1);
        unknown.traffic_rule_id = "tr-9".into();
        let err = put_traffic(&platform.state, "app-1", "tr-9", unknown)
            .await
            .expect_err("should fail");
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err = put_traffic(&platform.state, "app-1", "tr-1", {
            let mut r = traffic_rule(1);
            r.traffic_rule_id = "other".into();
            r
        })
        .await
        .expect_err("should fail");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn activating_a_rule_creates_the_dns_record() {
        let platform = test_support::platform().await;
        configured_with_rules(&platform, RuleState::Inactive).await;
        assert_eq!(platform.dns.call_count(), 0);

        put_dns(
            &platform.state,
            "app-1",
            "dns-1",
            dns_rule(RuleState::Active),
            None,
            None,
        )
        .await
        .expect("activate");

        let created = platform.dns.created.lock().expect("created");
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].0, "app.edge.example");
    }

    #[tokio::test]
    async fn deactivating_a_rule_deletes_the_dns_record() {
        let platform = test_support::platform().await;
        configured_with_rules(&platform, RuleState::Active).await;

        put_dns(
            &platform.state,
            "app-1",
            "dns-1",
            dns_rule(RuleState::Inactive),
            None,
            None,
        )
        .await
        .expect("deactivate");

        assert_eq!(
            platform.dns.deleted.lock().expect("deleted")[0],
            "app.edge.example"
        );
    }

    #[tokio::test]
    async fn stale_if_match_fails_before_any_side_effect() {
        let platform = test_support::platform().await;
        configured_with_rules(&platform, RuleState::Inactive).await;

        let err = put_dns(
            &platform.state,
            "app-1",
            "dns-1",
            dns_rule(RuleState::Active),
            Some("deadbeef"),
            None,
        )
        .await
        .expect_err("should fail");
        assert_eq!(err.status, StatusCode::PRECONDITION_FAILED);

        // Neither the collaborator nor the stored rule was touched.
        assert_eq!(platform.dns.call_count(), 0);
        let view = get_dns(&platform.state, "app-1", "dns-1")
            .await
            .expect("get");
        assert_eq!(view.rule.state, RuleState::Inactive);
    }

    #[tokio::test]
    async fn current_if_match_allows_the_update() {
        let platform = test_support::platform().await;
        configured_with_rules(&platform, RuleState::Inactive).await;

        let view = get_dns(&platform.state, "app-1", "dns-1")
            .await
            .expect("get");
        let updated = put_dns(
            &platform.state,
            "app-1",
            "dns-1",
            dns_rule(RuleState::Active),
            Some(&view.etag),
            None,
        )
        .await
        .expect("put");
        assert_eq!(updated.rule.state, RuleState::Active);
        assert_ne!(updated.etag, view.etag);
    }

    #[tokio::test]
    async fn stale_if_unmodified_since_fails_with_412() {
        let platform = test_support::platform().await;
        configured_with_rules(&platform, RuleState::Inactive).await;

        let view = get_dns(&platform.state, "app-1", "dns-1")
            .await
            .expect("get");
        let stale_anchor = view.last_modified - ChronoDuration::hours(1);

        let err = put_dns(
            &platform.state,
            "app-1",
            "dns-1",
            dns_rule(RuleState::Active),
            None,
            Some(stale_anchor),
        )
        .await
        .expect_err("should fail");
        assert_eq!(err.status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(platform.dns.call_count(), 0);
    }

    #[tokio::test]
    async fn dns_failure_on_activation_is_forbidden_and_keeps_the_rule() {
        let platform = test_support::platform().await;
        configured_with_rules(&platform, RuleState::Inactive).await;
        platform
            .dns
            .fail
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let err = put_dns(
            &platform.state,
            "app-1",
            "dns-1",
            dns_rule(RuleState::Active),
            None,
            None,
        )
        .await
        .expect_err("should fail");
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let stored = get_dns(&platform.state, "app-1", "dns-1")
            .await
            .expect("get");
        assert_eq!(stored.rule.state, RuleState::Inactive);
    }

    #[tokio::test]
    async fn dns_failure_on_deactivation_is_forbidden_and_keeps_the_rule() {
        let platform = test_support::platform().await;
        configured_with_rules(&platform, RuleState::Active).await;
        platform
            .dns
            .fail
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let err = put_dns(
            &platform.state,
            "app-1",
            "dns-1",
            dns_rule(RuleState::Inactive),
            None,
            None,
        )
        .await
        .expect_err("should fail");
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let stored = get_dns(&platform.state, "app-1", "dns-1")
            .await
            .expect("get");
        assert_eq!(stored.rule.state, RuleState::Active);
    }

    #[tokio::test]
    async fn traffic_rules_require_a_ready_instance() {
        let platform = test_support::platform().await;
        lifecycle::configure(
            &platform.state,
            "app-1",
            ConfigPlatformForApp {
                app_traffic_rule: vec![traffic_rule(1)],
                app_dns_rule: vec![],
            },
        )
        .await
        .expect("configure");

        let err = list_traffic(&platform.state, "app-1")
            .await
            .expect_err("not ready yet");
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn rules_of_unknown_instances_are_not_found() {
        let platform = test_support::platform().await;
        let err = list_dns(&platform.state, "ghost").await.expect_err("fail");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        let err = list_traffic(&platform.state, "ghost")
            .await
            .expect_err("fail");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
