use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::app_state::AppState;
use crate::clients::{ClientRegistration, DnsService, OAuthService};
use crate::config::{NotificationsConfig, PlatformAuthConfig};
use crate::notify::NotificationDispatcher;
use crate::persistence::migrations::{init_pool, run_migrations};
use crate::rate_limit::{AttemptLimiter, AttemptLimiterRef, NoopAttemptLimiter};
use crate::Result;

/// Recording OAuth collaborator for tests.
pub(crate) struct MockOAuth {
    pub fail_register: AtomicBool,
    pub fail_revoke: AtomicBool,
    pub issued: Mutex<Vec<String>>,
    pub revoked: Mutex<Vec<String>>,
    next_id: AtomicU32,
}

impl MockOAuth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_register: AtomicBool::new(false),
            fail_revoke: AtomicBool::new(false),
            issued: Mutex::new(Vec::new()),
            revoked: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
        })
    }
}

#[async_trait]
impl OAuthService for MockOAuth {
    async fn register_client(&self) -> Result<ClientRegistration> {
        if self.fail_register.load(Ordering::SeqCst) {
            anyhow::bail!("oauth registration failed: 503");
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(ClientRegistration {
            client_id: format!("client-{n}"),
            client_secret: format!("secret-{n}"),
        })
    }

    async fn issue_token(&self, client_id: &str, _client_secret: &str) -> Result<String> {
        let token = format!("token-for-{client_id}");
        self.issued
            .lock()
            .expect("issued mutex")
            .push(client_id.to_string());
        Ok(token)
    }

    async fn revoke_client(&self, client_id: &str, _client_secret: &str) -> Result<()> {
        if self.fail_revoke.load(Ordering::SeqCst) {
            anyhow::bail!("oauth revocation failed: 503");
        }
        self.revoked
            .lock()
            .expect("revoked mutex")
            .push(client_id.to_string());
        Ok(())
    }

    async fn validate_token(&self, _access_token: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Recording DNS collaborator for tests.
pub(crate) struct MockDns {
    pub fail: AtomicBool,
    pub created: Mutex<Vec<(String, String, u32)>>,
    pub deleted: Mutex<Vec<String>>,
}

impl MockDns {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.created.lock().expect("created mutex").len()
            + self.deleted.lock().expect("deleted mutex").len()
    }
}

#[async_trait]
impl DnsService for MockDns {
    async fn create_record(&self, domain: &str, ip: &str, ttl: u32) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("dns record creation failed: 500");
        }
        self.created
            .lock()
            .expect("created mutex")
            .push((domain.to_string(), ip.to_string(), ttl));
        Ok(())
    }

    async fn delete_record(&self, domain: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("dns record deletion failed: 500");
        }
        self.deleted
            .lock()
            .expect("deleted mutex")
            .push(domain.to_string());
        Ok(())
    }
}

pub(crate) struct TestPlatform {
    pub state: AppState,
    pub oauth: Arc<MockOAuth>,
    pub dns: Arc<MockDns>,
}

pub(crate) fn limiter(inner: impl AttemptLimiter) -> AttemptLimiterRef {
    Arc::new(tokio::sync::Mutex::new(inner))
}

/// Fresh in-memory platform with recording collaborators and no limiting.
pub(crate) async fn platform() -> TestPlatform {
    let pool = init_pool("sqlite::memory:").await.expect("pool");
    run_migrations(&pool).await.expect("migrations");

    let oauth = MockOAuth::new();
    let dns = MockDns::new();
    let recorder = PrometheusBuilder::new().build_recorder();

    let state = AppState {
        db: pool,
        oauth: oauth.clone(),
        dns: dns.clone(),
        dispatcher: NotificationDispatcher::new().expect("dispatcher"),
        ready_attempts: limiter(NoopAttemptLimiter),
        termination_attempts: limiter(NoopAttemptLimiter),
        platform_auth: PlatformAuthConfig {
            tokens: vec!["test-platform-token".to_string()],
            header_name: "authorization".to_string(),
        },
        notifications: NotificationsConfig {
            termination_delay_secs: 0,
        },
        metrics: recorder.handle(),
    };

    TestPlatform { state, oauth, dns }
}
