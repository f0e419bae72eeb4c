use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::types::Json;

use mep_common::api::{IndicationType, OAuthCredentials, ServiceState};

use super::Db;
use crate::Result;

/// Lifecycle indication as stored in the `app_status` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum Indication {
    Starting,
    Ready,
    Stopping,
    Terminating,
}

impl From<IndicationType> for Indication {
    fn from(value: IndicationType) -> Self {
        match value {
            IndicationType::Starting => Indication::Starting,
            IndicationType::Ready => Indication::Ready,
            IndicationType::Stopping => Indication::Stopping,
            IndicationType::Terminating => Indication::Terminating,
        }
    }
}

impl From<Indication> for IndicationType {
    fn from(value: Indication) -> Self {
        match value {
            Indication::Starting => IndicationType::Starting,
            Indication::Ready => IndicationType::Ready,
            Indication::Stopping => IndicationType::Stopping,
            Indication::Terminating => IndicationType::Terminating,
        }
    }
}

/// Liveness block embedded in a service summary.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LivenessInfo {
    pub interval: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<DateTime<Utc>>,
}

/// Registration timestamp embedded in a service summary.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTimeStamp {
    pub seconds: i64,
    pub nano_seconds: u32,
}

/// Per-service summary embedded in `AppStatusRecord.services`.
///
/// Kept 1:1 with the rows of the `services` table for this instance; writes
/// order the service row first, then this summary.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub ser_name: String,
    pub ser_instance_id: String,
    pub state: ServiceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness: Option<LivenessInfo>,
    pub time_stamp: SummaryTimeStamp,
}

impl ServiceSummary {
    pub fn now(ser_name: String, ser_instance_id: String, state: ServiceState, liveness_interval: Option<u32>) -> Self {
        let now = Utc::now();
        Self {
            ser_name,
            ser_instance_id,
            state,
            liveness: liveness_interval.map(|interval| LivenessInfo {
                interval,
                update: Some(now),
            }),
            time_stamp: SummaryTimeStamp {
                seconds: now.timestamp(),
                nano_seconds: now.timestamp_subsec_nanos(),
            },
        }
    }
}

/// One row per application instance.
#[derive(Debug, Clone, FromRow)]
pub struct AppStatusRecord {
    pub app_instance_id: String,
    pub indication: Indication,
    pub services: Json<Vec<ServiceSummary>>,
    pub oauth: Json<OAuthCredentials>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const APP_STATUS_COLUMNS: &str = r#"
    app_instance_id,
    indication,
    services,
    oauth,
    created_at,
    updated_at
"#;

pub async fn create(
    pool: &Db,
    app_instance_id: &str,
    indication: Indication,
    oauth: &OAuthCredentials,
) -> Result<AppStatusRecord> {
    sqlx::query(
        r#"
        INSERT INTO app_status (app_instance_id, indication, services, oauth)
        VALUES (?1, ?2, '[]', ?3)
        "#,
    )
    .bind(app_instance_id)
    .bind(indication)
    .bind(Json(oauth))
    .execute(pool)
    .await?;

    get(pool, app_instance_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("app_status insert did not return row"))
}

pub async fn get(pool: &Db, app_instance_id: &str) -> Result<Option<AppStatusRecord>> {
    let record = sqlx::query_as::<_, AppStatusRecord>(&format!(
        "SELECT {APP_STATUS_COLUMNS} FROM app_status WHERE app_instance_id = ?1"
    ))
    .bind(app_instance_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

pub async fn set_indication(
    pool: &Db,
    app_instance_id: &str,
    indication: Indication,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE app_status
        SET indication = ?2, updated_at = datetime('now')
        WHERE app_instance_id = ?1
        "#,
    )
    .bind(app_instance_id)
    .bind(indication)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn set_services(
    pool: &Db,
    app_instance_id: &str,
    services: &[ServiceSummary],
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE app_status
        SET services = ?2, updated_at = datetime('now')
        WHERE app_instance_id = ?1
        "#,
    )
    .bind(app_instance_id)
    .bind(Json(services))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &Db, app_instance_id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM app_status WHERE app_instance_id = ?1")
        .bind(app_instance_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Instance ids whose indication is STOPPING or TERMINATING.
///
/// Used by service discovery to hide producers that are mid-teardown.
pub async fn tearing_down_instances(pool: &Db) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>(
        r#"
        SELECT app_instance_id FROM app_status
        WHERE indication IN ('STOPPING', 'TERMINATING')
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::migrations::{init_pool, run_migrations};

    fn credentials() -> OAuthCredentials {
        OAuthCredentials {
            client_id: "client".into(),
            client_secret: "secret".into(),
            access_token: "token".into(),
        }
    }

    #[tokio::test]
    async fn create_get_and_transition() {
        let pool = init_pool("sqlite::memory:").await.expect("pool");
        run_migrations(&pool).await.expect("migrations");

        let record = create(&pool, "app-1", Indication::Starting, &credentials())
            .await
            .expect("create");
        assert_eq!(record.indication, Indication::Starting);
        assert!(record.services.0.is_empty());
        assert_eq!(record.oauth.0.client_id, "client");

        assert!(
            set_indication(&pool, "app-1", Indication::Ready)
                .await
                .expect("update")
        );
        let record = get(&pool, "app-1").await.expect("get").expect("exists");
        assert_eq!(record.indication, Indication::Ready);

        assert!(delete(&pool, "app-1").await.expect("delete"));
        assert!(get(&pool, "app-1").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn duplicate_create_is_a_unique_violation() {
        let pool = init_pool("sqlite::memory:").await.expect("pool");
        run_migrations(&pool).await.expect("migrations");
        create(&pool, "app-1", Indication::Starting, &credentials())
            .await
            .expect("create");

        let err = create(&pool, "app-1", Indication::Starting, &credentials())
            .await
            .expect_err("should violate the primary key");
        assert!(crate::error::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn summaries_round_trip_through_json_column() {
        let pool = init_pool("sqlite::memory:").await.expect("pool");
        run_migrations(&pool).await.expect("migrations");
        create(&pool, "app-1", Indication::Ready, &credentials())
            .await
            .expect("create");

        let summary = ServiceSummary::now("location".into(), "svc-1".into(), ServiceState::Active, Some(5));
        set_services(&pool, "app-1", std::slice::from_ref(&summary))
            .await
            .expect("set services");

        let record = get(&pool, "app-1").await.expect("get").expect("exists");
        assert_eq!(record.services.0, vec![summary]);
    }

    #[tokio::test]
    async fn tearing_down_lists_only_stopping_and_terminating() {
        let pool = init_pool("sqlite::memory:").await.expect("pool");
        run_migrations(&pool).await.expect("migrations");
        create(&pool, "app-a", Indication::Ready, &credentials())
            .await
            .expect("create");
        create(&pool, "app-b", Indication::Stopping, &credentials())
            .await
            .expect("create");
        create(&pool, "app-c", Indication::Terminating, &credentials())
            .await
            .expect("create");

        let mut ids = tearing_down_instances(&pool).await.expect("query");
        ids.sort();
        assert_eq!(ids, vec!["app-b".to_string(), "app-c".to_string()]);
    }
}
