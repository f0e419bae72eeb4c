use metrics_exporter_prometheus::PrometheusHandle;

use crate::clients::{DnsServiceRef, OAuthServiceRef};
use crate::config::{NotificationsConfig, PlatformAuthConfig};
use crate::notify::NotificationDispatcher;
use crate::persistence::Db;
use crate::rate_limit::AttemptLimiterRef;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub oauth: OAuthServiceRef,
    pub dns: DnsServiceRef,
    pub dispatcher: NotificationDispatcher,
    /// Guards ConfirmReady attempts, keyed by app instance id.
    pub ready_attempts: AttemptLimiterRef,
    /// Guards ConfirmTermination attempts, keyed by app instance id.
    pub termination_attempts: AttemptLimiterRef,
    pub platform_auth: PlatformAuthConfig,
    pub notifications: NotificationsConfig,
    pub metrics: PrometheusHandle,
}

fn _assert_app_state_bounds() {
    fn assert_bounds<T: Clone + Send + Sync + 'static>() {}
    assert_bounds::<AppState>();
}
