use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;
use crate::config::OAuthConfig;

/// Credentials returned by the OAuth collaborator on registration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
}

/// External OAuth credential-issuing service.
#[async_trait]
pub trait OAuthService: Send + Sync + 'static {
    async fn register_client(&self) -> Result<ClientRegistration>;
    async fn issue_token(&self, client_id: &str, client_secret: &str) -> Result<String>;
    async fn revoke_client(&self, client_id: &str, client_secret: &str) -> Result<()>;
    async fn validate_token(&self, access_token: &str) -> Result<bool>;
}

pub type OAuthServiceRef = Arc<dyn OAuthService>;

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    access_token: &'a str,
}

/// HTTP implementation talking to the configured OAuth service.
#[derive(Clone)]
pub struct HttpOAuthClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpOAuthClient {
    pub fn new(cfg: &OAuthConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl OAuthService for HttpOAuthClient {
    async fn register_client(&self) -> Result<ClientRegistration> {
        let res = self
            .client
            .post(self.url("/register"))
            .send()
            .await
            .map_err(|err| {
                warn!(?err, "oauth client registration request failed");
                err
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "oauth client registration returned error");
            anyhow::bail!("oauth registration failed: {status}, body: {body}");
        }

        Ok(res.json::<ClientRegistration>().await?)
    }

    async fn issue_token(&self, client_id: &str, client_secret: &str) -> Result<String> {
        let res = self
            .client
            .post(self.url("/token"))
            .json(&TokenRequest {
                client_id,
                client_secret,
            })
            .send()
            .await
            .map_err(|err| {
                warn!(?err, "oauth token request failed");
                err
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "oauth token request returned error");
            anyhow::bail!("oauth token request failed: {status}, body: {body}");
        }

        Ok(res.json::<TokenResponse>().await?.access_token)
    }

    async fn revoke_client(&self, client_id: &str, client_secret: &str) -> Result<()> {
        let res = self
            .client
            .post(self.url("/revoke"))
            .json(&TokenRequest {
                client_id,
                client_secret,
            })
            .send()
            .await
            .map_err(|err| {
                warn!(?err, "oauth revocation request failed");
                err
            })?;

        let status = res.status();
        if !status.is_success() {
            warn!(%status, "oauth revocation returned error");
            anyhow::bail!("oauth revocation failed: {status}");
        }

        Ok(())
    }

    async fn validate_token(&self, access_token: &str) -> Result<bool> {
        let res = self
            .client
            .post(self.url("/validate"))
            .json(&ValidateRequest { access_token })
            .send()
            .await
            .map_err(|err| {
                warn!(?err, "oauth validation request failed");
                err
            })?;

        match res.status() {
            status if status.is_success() => Ok(true),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => Ok(false),
            status => {
                warn!(%status, "oauth validation returned error");
                anyhow::bail!("oauth validation failed: {status}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn config(base_url: String) -> OAuthConfig {
        OAuthConfig {
            base_url,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn register_client_parses_credentials() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(POST).path("/register");
            then.status(201)
                .json_body(serde_json::json!({"client_id": "c", "client_secret": "s"}));
        });

        let client = HttpOAuthClient::new(&config(server.url(""))).expect("client");
        let creds = client.register_client().await.expect("register");
        assert_eq!(creds.client_id, "c");
        assert_eq!(creds.client_secret, "s");
    }

    #[tokio::test]
    async fn issue_token_sends_credentials() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(POST)
                .path("/token")
                .json_body(serde_json::json!({"client_id": "c", "client_secret": "s"}));
            then.status(200)
                .json_body(serde_json::json!({"access_token": "tok"}));
        });

        let client = HttpOAuthClient::new(&config(server.url(""))).expect("client");
        let token = client.issue_token("c", "s").await.expect("token");
        assert_eq!(token, "tok");
    }

    #[tokio::test]
    async fn register_client_reports_error_status() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(POST).path("/register");
            then.status(503).body("unavailable");
        });

        let client = HttpOAuthClient::new(&config(server.url(""))).expect("client");
        let err = client.register_client().await.expect_err("should fail");
        assert!(err.to_string().contains("oauth registration failed"));
    }

    #[tokio::test]
    async fn validate_token_maps_unauthorized_to_false() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(POST).path("/validate");
            then.status(401);
        });

        let client = HttpOAuthClient::new(&config(server.url(""))).expect("client");
        assert!(!client.validate_token("bad").await.expect("validate"));
    }
}
