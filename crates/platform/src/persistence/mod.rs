use sqlx::SqlitePool;

pub mod app_status;
pub mod dns_rules;
pub mod lcm_operations;
pub mod migrations;
pub mod services;
pub mod subscriptions;
pub mod traffic_rules;

pub type Db = SqlitePool;

pub use app_status::{AppStatusRecord, Indication, LivenessInfo, ServiceSummary, SummaryTimeStamp};
pub use dns_rules::{DnsRuleRecord, DnsRuleState};
pub use lcm_operations::{DbOperationStatus, LcmOperationRecord, OperationKind};
pub use services::{ServiceFilters, ServiceRecord};
pub use subscriptions::SubscriptionRecord;
pub use traffic_rules::TrafficRuleRecord;
