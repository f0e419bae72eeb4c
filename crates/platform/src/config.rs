use serde::{Deserialize, Deserializer};

pub const ENV_PREFIX: &str = "MEP";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub platform_auth: PlatformAuthConfig,
    pub oauth: OAuthConfig,
    pub dns: DnsConfig,
    pub attempts: AttemptsConfig,
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Bearer tokens accepted on the management (Mm5) surface.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformAuthConfig {
    #[serde(deserialize_with = "deserialize_string_or_vec")]
    pub tokens: Vec<String>,
    pub header_name: String,
}

fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::String(value) => Ok(value.split(',').map(|s| s.to_string()).collect()),
        StringOrVec::Vec(values) => Ok(values),
    }
}

/// External OAuth credential service.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub base_url: String,
    #[serde(default = "default_collaborator_timeout_secs")]
    pub timeout_secs: u64,
}

/// External DNS record service.
#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    pub base_url: String,
    #[serde(default = "default_collaborator_timeout_secs")]
    pub timeout_secs: u64,
}

/// Sliding-window limiter guarding readiness/termination confirmations.
#[derive(Debug, Clone, Deserialize)]
pub struct AttemptsConfig {
    /// Attempts tolerated per window and instance; 0 disables limiting.
    pub limit: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// Delay before delivering a termination notification, so the triggering
    /// HTTP response reaches the caller first.
    pub termination_delay_secs: u64,
}

fn default_collaborator_timeout_secs() -> u64 {
    10
}

impl OAuthConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_url.trim().is_empty() {
            anyhow::bail!("oauth.base_url cannot be empty");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("oauth.timeout_secs must be > 0");
        }
        Ok(())
    }
}

impl DnsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_url.trim().is_empty() {
            anyhow::bail!("dns.base_url cannot be empty");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("dns.timeout_secs must be > 0");
        }
        Ok(())
    }
}

impl AttemptsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window_secs == 0 {
            anyhow::bail!("attempts.window_secs must be > 0");
        }
        Ok(())
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    let env = config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        // Keep try_parsing disabled so numeric token strings are not coerced.
        .try_parsing(false);

    let builder = config::Config::builder()
        .add_source(config::File::with_name("config").required(false))
        .add_source(env)
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("database.url", "sqlite://data/mep-platform.db")?
        .set_default("platform_auth.tokens", vec!["dev-platform-token"])?
        .set_default("platform_auth.header_name", "authorization")?
        .set_default("oauth.base_url", "http://127.0.0.1:5001")?
        .set_default("oauth.timeout_secs", default_collaborator_timeout_secs())?
        .set_default("dns.base_url", "http://127.0.0.1:5002")?
        .set_default("dns.timeout_secs", default_collaborator_timeout_secs())?
        .set_default("attempts.limit", 1u32)?
        .set_default("attempts.window_secs", 5u64)?
        .set_default("notifications.termination_delay_secs", 10u64)?;

    let cfg = builder.build()?;
    let mut app: AppConfig = cfg.try_deserialize()?;
    app.oauth.base_url = app.oauth.base_url.trim_end_matches('/').to_string();
    app.dns.base_url = app.dns.base_url.trim_end_matches('/').to_string();
    app.oauth.validate()?;
    app.dns.validate()?;
    app.attempts.validate()?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, panic, sync::Mutex};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_platform_env(vars: &[(&str, &str)], test: impl FnOnce() + panic::UnwindSafe) {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        let prefix = format!("{}__", ENV_PREFIX);

        let existing: Vec<(String, String)> = env::vars()
            .filter(|(key, _)| key.starts_with(&prefix))
            .collect();

        for (key, _) in &existing {
            unsafe { env::remove_var(key) };
        }

        for (key, value) in vars {
            unsafe { env::set_var(key, value) };
        }

        let result = panic::catch_unwind(test);

        for (key, _) in vars {
            unsafe { env::remove_var(key) };
        }

        for (key, value) in existing {
            unsafe { env::set_var(key, value) };
        }

        result.unwrap();
    }

    #[test]
    fn defaults_load_and_validate() {
        with_platform_env(&[], || {
            let cfg = load().expect("config loads");
            assert_eq!(cfg.server.port, 8080);
            assert_eq!(cfg.attempts.limit, 1);
            assert_eq!(cfg.attempts.window_secs, 5);
            assert_eq!(cfg.notifications.termination_delay_secs, 10);
        });
    }

    #[test]
    fn numeric_tokens_remain_strings() {
        with_platform_env(&[("MEP__PLATFORM_AUTH__TOKENS", "1111,2222")], || {
            let cfg = load().expect("config loads");
            assert_eq!(
                cfg.platform_auth.tokens,
                vec!["1111".to_string(), "2222".to_string()]
            );
        });
    }

    #[test]
    fn numeric_env_values_still_parse() {
        with_platform_env(
            &[
                ("MEP__SERVER__PORT", "9090"),
                ("MEP__ATTEMPTS__WINDOW_SECS", "30"),
            ],
            || {
                let cfg = load().expect("config loads");
                assert_eq!(cfg.server.port, 9090);
                assert_eq!(cfg.attempts.window_secs, 30);
            },
        );
    }

    #[test]
    fn collaborator_urls_are_normalized() {
        with_platform_env(&[("MEP__DNS__BASE_URL", "http://dns.internal/")], || {
            let cfg = load().expect("config loads");
            assert_eq!(cfg.dns.base_url, "http://dns.internal");
        });
    }
}
