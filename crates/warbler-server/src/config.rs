use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub const DEV_SESSION_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub session_secret: String,
    pub session_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let port = get("WARBLER_PORT", "5000")
            .parse()
            .context("WARBLER_PORT must be a port number")?;
        let session_days = get("WARBLER_SESSION_DAYS", "7")
            .parse()
            .context("WARBLER_SESSION_DAYS must be a whole number of days")?;

        Ok(Self {
            host: get("WARBLER_HOST", "0.0.0.0"),
            port,
            db_path: PathBuf::from(get("WARBLER_DB_PATH", "warbler.db")),
            session_secret: get("WARBLER_SESSION_SECRET", DEV_SESSION_SECRET),
            session_days,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.session_secret == DEV_SESSION_SECRET
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.db_path, PathBuf::from("warbler.db"));
        assert_eq!(cfg.session_days, 7);
        assert!(cfg.uses_dev_secret());
        assert_eq!(cfg.addr().unwrap().to_string(), "0.0.0.0:5000");
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("WARBLER_HOST", "127.0.0.1"),
            ("WARBLER_PORT", "8080"),
            ("WARBLER_SESSION_SECRET", "s3cret"),
            ("WARBLER_SESSION_DAYS", "1"),
        ])
        .unwrap();
        assert_eq!(cfg.addr().unwrap().to_string(), "127.0.0.1:8080");
        assert!(!cfg.uses_dev_secret());
        assert_eq!(cfg.session_days, 1);
    }

    #[test]
    fn bad_port() {
        assert!(config(&[("WARBLER_PORT", "http")]).is_err());
    }
}
