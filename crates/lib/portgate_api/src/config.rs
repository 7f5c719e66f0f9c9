//! Portal and gateway configuration.

use std::str::FromStr;
use std::time::Duration;

use portgate_core::auth::access_tokens::MAX_ACCESS_TOKEN_TTL;
use url::Url;

/// Configuration shared by the portal and gateway routers.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Portal listener address.
    pub portal_bind_addr: String,
    /// Gateway listener address.
    pub gateway_bind_addr: String,
    /// SQLite connection URL.
    pub database_url: String,
    /// Base URL browsers use to reach the gateway.
    pub gateway_public_url: String,
    /// Base URL browsers use to reach the portal.
    pub portal_public_url: String,
    /// Host the registered applications listen on.
    pub app_host: String,
    /// Set the `Secure` attribute on cookies.
    pub cookie_secure: bool,
    pub portal_session_ttl: Duration,
    pub access_token_ttl: Duration,
    pub gateway_session_ttl: Duration,
    pub iframe_token_ttl: Duration,
    /// Budget for every session or token check against the store.
    pub validation_timeout: Duration,
    pub probe_timeout: Duration,
    pub probe_concurrency: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            portal_bind_addr: "127.0.0.1:8501".into(),
            gateway_bind_addr: "127.0.0.1:8000".into(),
            database_url: "sqlite://portgate.db?mode=rwc".into(),
            gateway_public_url: "http://localhost:8000".into(),
            portal_public_url: "http://localhost:8501".into(),
            app_host: "localhost".into(),
            cookie_secure: false,
            portal_session_ttl: Duration::from_secs(24 * 60 * 60),
            access_token_ttl: Duration::from_secs(60 * 60),
            gateway_session_ttl: Duration::from_secs(2 * 60 * 60),
            iframe_token_ttl: Duration::from_secs(60),
            validation_timeout: Duration::from_millis(2000),
            probe_timeout: Duration::from_millis(500),
            probe_concurrency: 50,
        }
    }
}

fn var_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

/// Oversized values saturate rather than wrap.
fn hours(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60 * 60))
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60))
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                      | Default                        |
    /// |-------------------------------|--------------------------------|
    /// | `PORTAL_BIND_ADDR`            | `127.0.0.1:8501`               |
    /// | `GATEWAY_BIND_ADDR`           | `127.0.0.1:8000`               |
    /// | `DATABASE_URL`                | `sqlite://portgate.db?mode=rwc` |
    /// | `GATEWAY_PUBLIC_URL`          | `http://localhost:8000`        |
    /// | `PORTAL_PUBLIC_URL`           | `http://localhost:8501`        |
    /// | `APP_HOST`                    | `localhost`                    |
    /// | `COOKIE_SECURE`               | `false`                        |
    /// | `PORTAL_SESSION_TTL_HOURS`    | `24`                           |
    /// | `ACCESS_TOKEN_TTL_MINUTES`    | `60`                           |
    /// | `GATEWAY_SESSION_TTL_MINUTES` | `120`                          |
    /// | `IFRAME_TOKEN_TTL_SECS`       | `60`                           |
    /// | `VALIDATION_TIMEOUT_MS`       | `2000`                         |
    /// | `PROBE_TIMEOUT_MS`            | `500`                          |
    /// | `PROBE_CONCURRENCY`           | `50`                           |
    ///
    /// Unparseable numbers fall back to the default.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            portal_bind_addr: var_or("PORTAL_BIND_ADDR", d.portal_bind_addr),
            gateway_bind_addr: var_or("GATEWAY_BIND_ADDR", d.gateway_bind_addr),
            database_url: var_or("DATABASE_URL", d.database_url),
            gateway_public_url: var_or("GATEWAY_PUBLIC_URL", d.gateway_public_url),
            portal_public_url: var_or("PORTAL_PUBLIC_URL", d.portal_public_url),
            app_host: var_or("APP_HOST", d.app_host),
            cookie_secure: parsed_or("COOKIE_SECURE", d.cookie_secure),
            portal_session_ttl: hours(parsed_or("PORTAL_SESSION_TTL_HOURS", 24)),
            access_token_ttl: minutes(parsed_or("ACCESS_TOKEN_TTL_MINUTES", 60)),
            gateway_session_ttl: minutes(parsed_or("GATEWAY_SESSION_TTL_MINUTES", 120)),
            iframe_token_ttl: Duration::from_secs(parsed_or("IFRAME_TOKEN_TTL_SECS", 60u64)),
            validation_timeout: Duration::from_millis(parsed_or("VALIDATION_TIMEOUT_MS", 2000u64)),
            probe_timeout: Duration::from_millis(parsed_or("PROBE_TIMEOUT_MS", 500u64)),
            probe_concurrency: parsed_or("PROBE_CONCURRENCY", d.probe_concurrency),
        }
    }

    /// Check the lifetime ordering and the public URLs.
    pub fn validate(&self) -> Result<(), String> {
        if self.access_token_ttl.is_zero() || self.access_token_ttl > MAX_ACCESS_TOKEN_TTL {
            return Err(format!(
                "access token lifetime must be between 1s and {}s",
                MAX_ACCESS_TOKEN_TTL.as_secs()
            ));
        }
        if self.access_token_ttl >= self.portal_session_ttl {
            return Err("access token lifetime must be shorter than the portal session".into());
        }
        if self.gateway_session_ttl.is_zero() || self.iframe_token_ttl.is_zero() {
            return Err("gateway lifetimes must be non-zero".into());
        }
        for (name, value) in [
            ("GATEWAY_PUBLIC_URL", &self.gateway_public_url),
            ("PORTAL_PUBLIC_URL", &self.portal_public_url),
        ] {
            Url::parse(value).map_err(|e| format!("{name} is not a valid URL: {e}"))?;
        }
        Ok(())
    }

    /// Gateway base URL without a trailing slash.
    pub fn gateway_base(&self) -> &str {
        self.gateway_public_url.trim_end_matches('/')
    }

    /// Portal base URL without a trailing slash.
    pub fn portal_base(&self) -> &str {
        self.portal_public_url.trim_end_matches('/')
    }
}
