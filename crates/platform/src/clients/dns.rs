use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::Result;
use crate::config::DnsConfig;

/// External DNS record service keeping ACTIVE rules resolvable.
#[async_trait]
pub trait DnsService: Send + Sync + 'static {
    async fn create_record(&self, domain: &str, ip: &str, ttl: u32) -> Result<()>;
    async fn delete_record(&self, domain: &str) -> Result<()>;
}

pub type DnsServiceRef = Arc<dyn DnsService>;

#[derive(Debug, Serialize)]
struct RecordRequest<'a> {
    ip: &'a str,
    ttl: u32,
}

/// HTTP implementation talking to the configured DNS service.
#[derive(Clone)]
pub struct HttpDnsClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDnsClient {
    pub fn new(cfg: &DnsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn record_url(&self, domain: &str) -> String {
        format!("{}/records/{domain}", self.base_url)
    }
}

#[async_trait]
impl DnsService for HttpDnsClient {
    async fn create_record(&self, domain: &str, ip: &str, ttl: u32) -> Result<()> {
        let res = self
            .client
            .put(self.record_url(domain))
            .json(&RecordRequest { ip, ttl })
            .send()
            .await
            .map_err(|err| {
                warn!(?err, domain, "dns record creation request failed");
                err
            })?;

        let status = res.status();
        if !status.is_success() {
            warn!(%status, domain, "dns record creation returned error");
            anyhow::bail!("dns record creation failed: {status}");
        }

        Ok(())
    }

    async fn delete_record(&self, domain: &str) -> Result<()> {
        let res = self
            .client
            .delete(self.record_url(domain))
            .send()
            .await
            .map_err(|err| {
                warn!(?err, domain, "dns record deletion request failed");
                err
            })?;

        let status = res.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            warn!(%status, domain, "dns record deletion returned error");
            anyhow::bail!("dns record deletion failed: {status}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::DELETE, Method::PUT, MockServer};

    fn config(base_url: String) -> DnsConfig {
        DnsConfig {
            base_url,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn create_record_puts_ip_and_ttl() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/records/app.edge.example")
                .json_body(serde_json::json!({"ip": "10.0.0.7", "ttl": 300}));
            then.status(200);
        });

        let client = HttpDnsClient::new(&config(server.url(""))).expect("client");
        client
            .create_record("app.edge.example", "10.0.0.7", 300)
            .await
            .expect("create");
        mock.assert();
    }

    #[tokio::test]
    async fn delete_record_tolerates_missing_record() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(DELETE).path("/records/gone.example");
            then.status(404);
        });

        let client = HttpDnsClient::new(&config(server.url(""))).expect("client");
        client.delete_record("gone.example").await.expect("delete");
    }

    #[tokio::test]
    async fn create_record_reports_error_status() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(PUT).path("/records/app.edge.example");
            then.status(500);
        });

        let client = HttpDnsClient::new(&config(server.url(""))).expect("client");
        let err = client
            .create_record("app.edge.example", "10.0.0.7", 60)
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("dns record creation failed"));
    }
}
