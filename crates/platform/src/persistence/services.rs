use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder};

use mep_common::api::ServiceInfo;

use super::Db;
use crate::Result;

/// One row per registered service instance; filterable attributes are
/// extracted into columns, the full wire shape lives in `info`.
#[derive(Debug, Clone, FromRow)]
pub struct ServiceRecord {
    pub ser_instance_id: String,
    pub app_instance_id: String,
    pub ser_name: String,
    pub ser_category_id: Option<String>,
    pub state: String,
    pub info: Json<ServiceInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Discovery filters; the three identity filters are mutually exclusive and
/// validated before reaching this layer.
#[derive(Debug, Clone, Default)]
pub struct ServiceFilters {
    pub ser_instance_ids: Option<Vec<String>>,
    pub ser_names: Option<Vec<String>>,
    pub ser_category_id: Option<String>,
    pub scope_of_locality: Option<String>,
    pub consumed_local_only: Option<bool>,
    pub is_local: Option<bool>,
    /// Restrict to one owning instance (app-scoped listing).
    pub app_instance_id: Option<String>,
    /// Hide services owned by these instances (producers mid-teardown).
    pub exclude_app_instance_ids: Vec<String>,
}

const SERVICE_COLUMNS: &str = r#"
    ser_instance_id,
    app_instance_id,
    ser_name,
    ser_category_id,
    state,
    info,
    created_at,
    updated_at
"#;

pub async fn upsert(pool: &Db, app_instance_id: &str, info: &ServiceInfo) -> Result<ServiceRecord> {
    let ser_instance_id = info
        .ser_instance_id
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("service info missing serInstanceId"))?;

    sqlx::query(
        r#"
        INSERT INTO services (
            ser_instance_id,
            app_instance_id,
            ser_name,
            ser_category_id,
            state,
            scope_of_locality,
            consumed_local_only,
            is_local,
            info
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT (ser_instance_id) DO UPDATE SET
            ser_name = excluded.ser_name,
            ser_category_id = excluded.ser_category_id,
            state = excluded.state,
            scope_of_locality = excluded.scope_of_locality,
            consumed_local_only = excluded.consumed_local_only,
            is_local = excluded.is_local,
            info = excluded.info,
            updated_at = datetime('now')
        "#,
    )
    .bind(ser_instance_id)
    .bind(app_instance_id)
    .bind(&info.ser_name)
    .bind(info.ser_category.as_ref().map(|c| c.id.clone()))
    .bind(info.state.as_str())
    .bind(info.scope_of_locality.map(|s| s.as_str()))
    .bind(info.consumed_local_only)
    .bind(info.is_local)
    .bind(Json(info))
    .execute(pool)
    .await?;

    get(pool, ser_instance_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("service upsert did not return row"))
}

pub async fn get(pool: &Db, ser_instance_id: &str) -> Result<Option<ServiceRecord>> {
    let record = sqlx::query_as::<_, ServiceRecord>(&format!(
        "SELECT {SERVICE_COLUMNS} FROM services WHERE ser_instance_id = ?1"
    ))
    .bind(ser_instance_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

pub async fn list(pool: &Db, filters: &ServiceFilters) -> Result<Vec<ServiceRecord>> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT {SERVICE_COLUMNS} FROM services WHERE 1 = 1"
    ));

    if let Some(app) = &filters.app_instance_id {
        builder.push(" AND app_instance_id = ").push_bind(app);
    }
    if let Some(ids) = &filters.ser_instance_ids
        && !ids.is_empty()
    {
        builder.push(" AND ser_instance_id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        builder.push(")");
    }
    if let Some(names) = &filters.ser_names
        && !names.is_empty()
    {
        builder.push(" AND ser_name IN (");
        let mut separated = builder.separated(", ");
        for name in names {
            separated.push_bind(name);
        }
        builder.push(")");
    }
    if let Some(category) = &filters.ser_category_id {
        builder.push(" AND ser_category_id = ").push_bind(category);
    }
    if let Some(scope) = &filters.scope_of_locality {
        builder.push(" AND scope_of_locality = ").push_bind(scope);
    }
    if let Some(consumed) = filters.consumed_local_only {
        builder
            .push(" AND consumed_local_only = ")
            .push_bind(consumed);
    }
    if let Some(is_local) = filters.is_local {
        builder.push(" AND is_local = ").push_bind(is_local);
    }
    if !filters.exclude_app_instance_ids.is_empty() {
        builder.push(" AND app_instance_id NOT IN (");
        let mut separated = builder.separated(", ");
        for id in &filters.exclude_app_instance_ids {
            separated.push_bind(id);
        }
        builder.push(")");
    }

    builder.push(" ORDER BY created_at, ser_instance_id");

    let records = builder
        .build_query_as::<ServiceRecord>()
        .fetch_all(pool)
        .await?;

    Ok(records)
}

pub async fn delete(pool: &Db, ser_instance_id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM services WHERE ser_instance_id = ?1")
        .bind(ser_instance_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_many(pool: &Db, ser_instance_ids: &[String]) -> Result<u64> {
    if ser_instance_ids.is_empty() {
        return Ok(0);
    }

    let mut builder = QueryBuilder::new("DELETE FROM services WHERE ser_instance_id IN (");
    let mut separated = builder.separated(", ");
    for id in ser_instance_ids {
        separated.push_bind(id);
    }
    builder.push(")");

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}
