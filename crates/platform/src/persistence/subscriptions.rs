use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::types::Json;

use mep_common::api::{FilteringCriteria, SelfLinks};

use super::Db;
use crate::Result;

pub const KIND_SER_AVAILABILITY: &str = "SerAvailabilityNotificationSubscription";
pub const KIND_APP_TERMINATION: &str = "AppTerminationNotificationSubscription";

/// One row per subscription, both kinds discriminated by `kind`.
#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRecord {
    pub subscription_id: String,
    pub app_instance_id: String,
    pub kind: String,
    pub callback_reference: String,
    pub filtering_criteria: Option<Json<FilteringCriteria>>,
    pub links: Option<Json<SelfLinks>>,
    pub created_at: DateTime<Utc>,
}

const SUBSCRIPTION_COLUMNS: &str = r#"
    subscription_id,
    app_instance_id,
    kind,
    callback_reference,
    filtering_criteria,
    links,
    created_at
"#;

pub struct NewSubscription<'a> {
    pub subscription_id: &'a str,
    pub app_instance_id: &'a str,
    pub kind: &'a str,
    pub callback_reference: &'a str,
    pub filtering_criteria: Option<&'a FilteringCriteria>,
    pub links: Option<&'a SelfLinks>,
}

pub async fn create(pool: &Db, new: NewSubscription<'_>) -> Result<SubscriptionRecord> {
    sqlx::query(
        r#"
        INSERT INTO subscriptions (
            subscription_id,
            app_instance_id,
            kind,
            callback_reference,
            filtering_criteria,
            links
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(new.subscription_id)
    .bind(new.app_instance_id)
    .bind(new.kind)
    .bind(new.callback_reference)
    .bind(new.filtering_criteria.map(Json))
    .bind(new.links.map(Json))
    .execute(pool)
    .await?;

    get(pool, new.subscription_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("subscription insert did not return row"))
}

pub async fn get(pool: &Db, subscription_id: &str) -> Result<Option<SubscriptionRecord>> {
    let record = sqlx::query_as::<_, SubscriptionRecord>(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE subscription_id = ?1"
    ))
    .bind(subscription_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

pub async fn list_for_app(pool: &Db, app_instance_id: &str) -> Result<Vec<SubscriptionRecord>> {
    let records = sqlx::query_as::<_, SubscriptionRecord>(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions \
         WHERE app_instance_id = ?1 ORDER BY created_at, subscription_id"
    ))
    .bind(app_instance_id)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

pub async fn list_by_kind(pool: &Db, kind: &str) -> Result<Vec<SubscriptionRecord>> {
    let records = sqlx::query_as::<_, SubscriptionRecord>(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions \
         WHERE kind = ?1 ORDER BY created_at, subscription_id"
    ))
    .bind(kind)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// The app's own termination subscription, if it registered one.
pub async fn termination_subscription(
    pool: &Db,
    app_instance_id: &str,
) -> Result<Option<SubscriptionRecord>> {
    let record = sqlx::query_as::<_, SubscriptionRecord>(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions \
         WHERE app_instance_id = ?1 AND kind = ?2 \
         ORDER BY created_at LIMIT 1"
    ))
    .bind(app_instance_id)
    .bind(KIND_APP_TERMINATION)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

pub async fn delete(pool: &Db, subscription_id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM subscriptions WHERE subscription_id = ?1")
        .bind(subscription_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_for_app(pool: &Db, app_instance_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM subscriptions WHERE app_instance_id = ?1")
        .bind(app_instance_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
