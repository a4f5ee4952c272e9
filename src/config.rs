use std::env;
use std::net::SocketAddr;

use anyhow::{bail, Context};

/// Process-wide configuration, read from the environment exactly once at
/// startup and shared read-only afterwards. The session secret is handed
/// to the session codec as an explicit value, never via global state, so
/// tests can run with a secret of their own.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub session: SessionConfig,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Signing key for the session cookie MAC.
    pub secret: String,
    pub cookie_name: String,
    /// Session lifetime in seconds.
    pub lifetime_secs: i64,
    /// Adds the `Secure` cookie attribute. Set when APP_ENV=production.
    pub secure: bool,
}

const DEFAULT_COOKIE_NAME: &str = "__session";
const DEFAULT_LIFETIME_SECS: i64 = 60 * 60 * 24 * 7;

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR is not a valid socket address")?;

        let secret = env::var("SESSION_SECRET").context("SESSION_SECRET must be set")?;
        if secret.len() < 16 {
            bail!("SESSION_SECRET must be at least 16 characters");
        }
        let cookie_name =
            env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| DEFAULT_COOKIE_NAME.to_string());
        let lifetime_secs = match env::var("SESSION_LIFETIME_SECS") {
            Ok(raw) => raw
                .parse::<i64>()
                .context("SESSION_LIFETIME_SECS is not a valid number of seconds")?,
            Err(_) => DEFAULT_LIFETIME_SECS,
        };
        if lifetime_secs <= 0 {
            bail!("SESSION_LIFETIME_SECS must be positive");
        }
        let secure = env::var("APP_ENV").map(|e| e == "production").unwrap_or(false);

        Ok(Config {
            database_url,
            bind_addr,
            session: SessionConfig {
                secret,
                cookie_name,
                lifetime_secs,
                secure,
            },
        })
    }
}

#[cfg(test)]
impl SessionConfig {
    /// Fixed configuration for tests, distinct from anything the
    /// environment could supply.
    pub fn for_tests() -> SessionConfig {
        SessionConfig {
            secret: "test-secret-0123456789abcdef".to_string(),
            cookie_name: "__session".to_string(),
            lifetime_secs: 3600,
            secure: false,
        }
    }
}
