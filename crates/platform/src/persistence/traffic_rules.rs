use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::types::Json;

use mep_common::api::TrafficRule;

use super::Db;
use crate::Result;

/// One row per traffic rule, keyed by `(app_instance_id, traffic_rule_id)`.
#[derive(Debug, Clone, FromRow)]
pub struct TrafficRuleRecord {
    pub app_instance_id: String,
    pub traffic_rule_id: String,
    pub rule: Json<TrafficRule>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const TRAFFIC_RULE_COLUMNS: &str = r#"
    app_instance_id,
    traffic_rule_id,
    rule,
    created_at,
    updated_at
"#;

/// Insert or overwrite; re-posting the same rule id replaces the stored rule.
pub async fn upsert(pool: &Db, app_instance_id: &str, rule: &TrafficRule) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO traffic_rules (app_instance_id, traffic_rule_id, rule)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (app_instance_id, traffic_rule_id) DO UPDATE SET
            rule = excluded.rule,
            updated_at = datetime('now')
        "#,
    )
    .bind(app_instance_id)
    .bind(&rule.traffic_rule_id)
    .bind(Json(rule))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get(
    pool: &Db,
    app_instance_id: &str,
    traffic_rule_id: &str,
) -> Result<Option<TrafficRuleRecord>> {
    let record = sqlx::query_as::<_, TrafficRuleRecord>(&format!(
        "SELECT {TRAFFIC_RULE_COLUMNS} FROM traffic_rules \
         WHERE app_instance_id = ?1 AND traffic_rule_id = ?2"
    ))
    .bind(app_instance_id)
    .bind(traffic_rule_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

pub async fn list_for_app(pool: &Db, app_instance_id: &str) -> Result<Vec<TrafficRuleRecord>> {
    let records = sqlx::query_as::<_, TrafficRuleRecord>(&format!(
        "SELECT {TRAFFIC_RULE_COLUMNS} FROM traffic_rules \
         WHERE app_instance_id = ?1 ORDER BY traffic_rule_id"
    ))
    .bind(app_instance_id)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

pub async fn delete_for_app(pool: &Db, app_instance_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM traffic_rules WHERE app_instance_id = ?1")
        .bind(app_instance_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::migrations::{init_pool, run_migrations};
    use mep_common::api::{FilterType, RuleState, TrafficRuleAction};

    fn rule(id: &str, priority: u32) -> TrafficRule {
        TrafficRule {
            traffic_rule_id: id.to_string(),
            filter_type: FilterType::Flow,
            priority,
            traffic_filter: vec![],
            action: TrafficRuleAction::Passthrough,
            dst_interface: None,
            state: RuleState::Active,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_rule_for_same_id() {
        let pool = init_pool("sqlite::memory:").await.expect("pool");
        run_migrations(&pool).await.expect("migrations");

        upsert(&pool, "app-1", &rule("tr-1", 1)).await.expect("insert");
        upsert(&pool, "app-1", &rule("tr-1", 7)).await.expect("overwrite");

        let record = get(&pool, "app-1", "tr-1")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(record.rule.0.priority, 7);

        assert_eq!(list_for_app(&pool, "app-1").await.expect("list").len(), 1);
        assert_eq!(delete_for_app(&pool, "app-1").await.expect("delete"), 1);
    }
}
