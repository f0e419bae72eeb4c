use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use mep_common::api::{LifecycleOperationType, OperationStatus};

use super::Db;
use crate::Result;

/// Lifecycle operation kind as stored in the `lcm_operations` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum OperationKind {
    Starting,
    Stopping,
    Terminating,
}

impl From<OperationKind> for LifecycleOperationType {
    fn from(value: OperationKind) -> Self {
        match value {
            OperationKind::Starting => LifecycleOperationType::Starting,
            OperationKind::Stopping => LifecycleOperationType::Stopping,
            OperationKind::Terminating => LifecycleOperationType::Terminating,
        }
    }
}

/// Operation status as stored in the `lcm_operations` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DbOperationStatus {
    Processing,
    SuccessfullyDone,
    Failed,
}

impl From<DbOperationStatus> for OperationStatus {
    fn from(value: DbOperationStatus) -> Self {
        match value {
            DbOperationStatus::Processing => OperationStatus::Processing,
            DbOperationStatus::SuccessfullyDone => OperationStatus::SuccessfullyDone,
            DbOperationStatus::Failed => OperationStatus::Failed,
        }
    }
}

/// Append-only audit row; only `operation_status` moves after insert.
#[derive(Debug, Clone, FromRow)]
pub struct LcmOperationRecord {
    pub lcm_operation_id: Uuid,
    pub app_instance_id: String,
    pub operation: OperationKind,
    pub operation_status: DbOperationStatus,
    pub state_entered_time: DateTime<Utc>,
}

impl LcmOperationRecord {
    pub fn to_api(&self) -> mep_common::api::LcmOperation {
        mep_common::api::LcmOperation {
            lifecycle_operation_occurrence_id: self.lcm_operation_id,
            app_instance_id: self.app_instance_id.clone(),
            operation: self.operation.into(),
            operation_status: self.operation_status.into(),
            state_entered_time: self.state_entered_time,
        }
    }
}

const LCM_COLUMNS: &str = r#"
    lcm_operation_id,
    app_instance_id,
    operation,
    operation_status,
    state_entered_time
"#;

pub async fn create(
    pool: &Db,
    app_instance_id: &str,
    operation: OperationKind,
) -> Result<LcmOperationRecord> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO lcm_operations (lcm_operation_id, app_instance_id, operation, operation_status)
        VALUES (?1, ?2, ?3, 'PROCESSING')
        "#,
    )
    .bind(id)
    .bind(app_instance_id)
    .bind(operation)
    .execute(pool)
    .await?;

    get(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("lcm operation insert did not return row"))
}

pub async fn get(pool: &Db, lcm_operation_id: Uuid) -> Result<Option<LcmOperationRecord>> {
    let record = sqlx::query_as::<_, LcmOperationRecord>(&format!(
        "SELECT {LCM_COLUMNS} FROM lcm_operations WHERE lcm_operation_id = ?1"
    ))
    .bind(lcm_operation_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

pub async fn list(pool: &Db) -> Result<Vec<LcmOperationRecord>> {
    let records = sqlx::query_as::<_, LcmOperationRecord>(&format!(
        "SELECT {LCM_COLUMNS} FROM lcm_operations ORDER BY state_entered_time, lcm_operation_id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(records)
}

pub async fn set_status(
    pool: &Db,
    lcm_operation_id: Uuid,
    status: DbOperationStatus,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE lcm_operations
        SET operation_status = ?2, state_entered_time = datetime('now')
        WHERE lcm_operation_id = ?1
        "#,
    )
    .bind(lcm_operation_id)
    .bind(status)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Moves the newest in-flight operation of the given kind to a terminal status.
pub async fn finish_latest(
    pool: &Db,
    app_instance_id: &str,
    operation: OperationKind,
    status: DbOperationStatus,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE lcm_operations
        SET operation_status = ?3, state_entered_time = datetime('now')
        WHERE lcm_operation_id = (
            SELECT lcm_operation_id FROM lcm_operations
            WHERE app_instance_id = ?1
              AND operation = ?2
              AND operation_status = 'PROCESSING'
            ORDER BY state_entered_time DESC
            LIMIT 1
        )
        "#,
    )
    .bind(app_instance_id)
    .bind(operation)
    .bind(status)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::migrations::{init_pool, run_migrations};

    #[tokio::test]
    async fn create_then_finish_latest() {
        let pool = init_pool("sqlite::memory:").await.expect("pool");
        run_migrations(&pool).await.expect("migrations");

        let record = create(&pool, "app-1", OperationKind::Starting)
            .await
            .expect("create");
        assert_eq!(record.operation_status, DbOperationStatus::Processing);

        assert!(
            finish_latest(
                &pool,
                "app-1",
                OperationKind::Starting,
                DbOperationStatus::SuccessfullyDone,
            )
            .await
            .expect("finish")
        );

        let record = get(&pool, record.lcm_operation_id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(record.operation_status, DbOperationStatus::SuccessfullyDone);

        // Nothing left in flight for this kind.
        assert!(
            !finish_latest(
                &pool,
                "app-1",
                OperationKind::Starting,
                DbOperationStatus::SuccessfullyDone,
            )
            .await
            .expect("finish")
        );
    }

    #[tokio::test]
    async fn list_returns_all_operations() {
        let pool = init_pool("sqlite::memory:").await.expect("pool");
        run_migrations(&pool).await.expect("migrations");

        create(&pool, "app-1", OperationKind::Starting)
            .await
            .expect("create");
        create(&pool, "app-2", OperationKind::Terminating)
            .await
            .expect("create");

        assert_eq!(list(&pool).await.expect("list").len(), 2);
    }
}
