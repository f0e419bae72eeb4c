use chrono::{DateTime, Utc};
use sqlx::FromRow;

use mep_common::api::{DnsRule, IpAddressType, RuleState};

use super::Db;
use crate::Result;

/// Rule activation state as stored in the `dns_rules` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum DnsRuleState {
    Active,
    Inactive,
}

impl From<RuleState> for DnsRuleState {
    fn from(value: RuleState) -> Self {
        match value {
            RuleState::Active => DnsRuleState::Active,
            RuleState::Inactive => DnsRuleState::Inactive,
        }
    }
}

impl From<DnsRuleState> for RuleState {
    fn from(value: DnsRuleState) -> Self {
        match value {
            DnsRuleState::Active => RuleState::Active,
            DnsRuleState::Inactive => RuleState::Inactive,
        }
    }
}

/// One row per DNS rule, keyed by `(app_instance_id, dns_rule_id)`.
#[derive(Debug, Clone, FromRow)]
pub struct DnsRuleRecord {
    pub app_instance_id: String,
    pub dns_rule_id: String,
    pub domain_name: String,
    pub ip_address_type: String,
    pub ip_address: String,
    pub ttl: i64,
    pub state: DnsRuleState,
    /// Optimistic-concurrency anchor for Last-Modified comparisons.
    pub last_modified: DateTime<Utc>,
}

impl DnsRuleRecord {
    /// The wire shape of the stored rule.
    pub fn to_api(&self) -> DnsRule {
        DnsRule {
            dns_rule_id: self.dns_rule_id.clone(),
            domain_name: self.domain_name.clone(),
            ip_address_type: if self.ip_address_type == "IP_V6" {
                IpAddressType::IpV6
            } else {
                IpAddressType::IpV4
            },
            ip_address: self.ip_address.clone(),
            ttl: self.ttl as u32,
            state: self.state.into(),
        }
    }
}

const DNS_RULE_COLUMNS: &str = r#"
    app_instance_id,
    dns_rule_id,
    domain_name,
    ip_address_type,
    ip_address,
    ttl,
    state,
    last_modified
"#;

fn address_type_token(rule: &DnsRule) -> &'static str {
    match rule.ip_address_type {
        IpAddressType::IpV4 => "IP_V4",
        IpAddressType::IpV6 => "IP_V6",
    }
}

/// Insert or overwrite; re-posting the same rule id replaces the stored rule
/// and refreshes `last_modified`.
pub async fn upsert(pool: &Db, app_instance_id: &str, rule: &DnsRule) -> Result<DnsRuleRecord> {
    sqlx::query(
        r#"
        INSERT INTO dns_rules (
            app_instance_id,
            dns_rule_id,
            domain_name,
            ip_address_type,
            ip_address,
            ttl,
            state
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT (app_instance_id, dns_rule_id) DO UPDATE SET
            domain_name = excluded.domain_name,
            ip_address_type = excluded.ip_address_type,
            ip_address = excluded.ip_address,
            ttl = excluded.ttl,
            state = excluded.state,
            last_modified = datetime('now')
        "#,
    )
    .bind(app_instance_id)
    .bind(&rule.dns_rule_id)
    .bind(&rule.domain_name)
    .bind(address_type_token(rule))
    .bind(&rule.ip_address)
    .bind(rule.ttl as i64)
    .bind(DnsRuleState::from(rule.state))
    .execute(pool)
    .await?;

    get(pool, app_instance_id, &rule.dns_rule_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("dns rule upsert did not return row"))
}

pub async fn get(
    pool: &Db,
    app_instance_id: &str,
    dns_rule_id: &str,
) -> Result<Option<DnsRuleRecord>> {
    let record = sqlx::query_as::<_, DnsRuleRecord>(&format!(
        "SELECT {DNS_RULE_COLUMNS} FROM dns_rules \
         WHERE app_instance_id = ?1 AND dns_rule_id = ?2"
    ))
    .bind(app_instance_id)
    .bind(dns_rule_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

pub async fn list_for_app(pool: &Db, app_instance_id: &str) -> Result<Vec<DnsRuleRecord>> {
    let records = sqlx::query_as::<_, DnsRuleRecord>(&format!(
        "SELECT {DNS_RULE_COLUMNS} FROM dns_rules \
         WHERE app_instance_id = ?1 ORDER BY dns_rule_id"
    ))
    .bind(app_instance_id)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

pub async fn delete_for_app(pool: &Db, app_instance_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM dns_rules WHERE app_instance_id = ?1")
        .bind(app_instance_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
