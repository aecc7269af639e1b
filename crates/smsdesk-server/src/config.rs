use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

/// Server settings read from `SMSDESK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub send_delay: Duration,
    pub admin_users: Vec<String>,
    pub seed_demo_user: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = var("SMSDESK_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("SMSDESK_JWT_SECRET is unset or still a placeholder");
        }

        let host = var("SMSDESK_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("SMSDESK_PORT")
            .unwrap_or_else(|| "3100".into())
            .parse()
            .context("SMSDESK_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let db_path = PathBuf::from(var("SMSDESK_DB_PATH").unwrap_or_else(|| "smsdesk.db".into()));

        let send_delay_ms: u64 = var("SMSDESK_SEND_DELAY_MS")
            .unwrap_or_else(|| "1000".into())
            .parse()
            .context("SMSDESK_SEND_DELAY_MS must be a whole number of milliseconds")?;

        let admin_users = var("SMSDESK_ADMIN_USERS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();

        let seed_demo_user = var("SMSDESK_SEED_DEMO_USER")
            .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

        Ok(Self {
            addr,
            db_path,
            jwt_secret,
            send_delay: Duration::from_millis(send_delay_ms),
            admin_users,
            seed_demo_user,
        })
    }
}
