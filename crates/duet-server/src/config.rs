use std::path::PathBuf;

use anyhow::{Context, Result};

/// Secret used when `DUET_JWT_SECRET` is unset. Fine for local runs only.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Server settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub seed_demo: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = get("DUET_PORT", "5000")
            .parse()
            .context("DUET_PORT must be a port number")?;
        let max_upload_mb: usize = get("DUET_MAX_UPLOAD_MB", "50")
            .parse()
            .context("DUET_MAX_UPLOAD_MB must be a whole number")?;
        let seed_demo = matches!(
            get("DUET_SEED_DEMO", "false").to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        );

        Ok(Self {
            host: get("DUET_HOST", "0.0.0.0"),
            port,
            db_path: get("DUET_DB_PATH", "duet.db").into(),
            jwt_secret: get("DUET_JWT_SECRET", DEV_JWT_SECRET),
            upload_dir: get("DUET_UPLOAD_DIR", "./uploads").into(),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            seed_demo,
        })
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.max_upload_bytes, 50 * 1024 * 1024);
        assert!(cfg.uses_dev_secret());
        assert!(!cfg.seed_demo);
    }

    #[test]
    fn overrides_are_read() {
        let cfg = config(&[
            ("DUET_PORT", "8080"),
            ("DUET_JWT_SECRET", "prod"),
            ("DUET_SEED_DEMO", "TRUE"),
            ("DUET_MAX_UPLOAD_MB", "2"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert!(!cfg.uses_dev_secret());
        assert!(cfg.seed_demo);
        assert_eq!(cfg.max_upload_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(config(&[("DUET_PORT", "http")]).is_err());
    }
}
