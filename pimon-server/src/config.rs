/**
 * CONFIGURATION - Fichier YAML + surcharges d'environnement
 *
 * ROLE: one `pimon.yaml` (path from PIMON_CONFIG) describing the listen
 * address, collector intervals, modem, docker binary and SMTP account.
 * Every section is optional; a missing or invalid file means defaults.
 *
 * SURCHARGES: MODEM_IP, PIMON_API_KEY, PIMON_BIND win over the file.
 */

use anyhow::{Context, Result};
use pimon_core::collectors::Intervals;
use pimon_core::forwarding::SmtpSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "PIMON_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "pimon.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConf,
    pub intervals: Intervals,
    pub modem: ModemConf,
    pub docker: DockerConf,
    pub smtp: SmtpSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
    /// When set, every `/api` route except `/api/health` needs `x-api-key`.
    pub api_key: Option<String>,
}

impl Default for HttpConf {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8001".into(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConf {
    pub enabled: bool,
    /// IP, hostname or base URL of the HiLink web UI.
    pub host: String,
}

impl Default for ModemConf {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "192.168.8.1".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConf {
    pub program: String,
}

impl Default for DockerConf {
    fn default() -> Self {
        Self {
            program: "docker".into(),
        }
    }
}

impl Config {
    pub fn parse(txt: &str) -> Result<Self> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(txt).context("invalid YAML configuration")
    }

    /// Applies environment overrides through `lookup` (`std::env::var` in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(host) = set("MODEM_IP") {
            self.modem.host = host;
        }
        if let Some(key) = set("PIMON_API_KEY") {
            self.http.api_key = Some(key);
        }
        if let Some(bind) = set("PIMON_BIND") {
            self.http.bind = bind;
        }
    }
}

/// Reads the file at `path`, falling back to defaults with a warning.
pub async fn load_from(path: &Path) -> Config {
    if !path.exists() {
        warn!("No config at {}, using defaults", path.display());
        return Config::default();
    }
    let txt = match fs::read_to_string(path).await {
        Ok(txt) => txt,
        Err(e) => {
            warn!("Cannot read {}: {}, using defaults", path.display(), e);
            return Config::default();
        }
    };
    match Config::parse(&txt) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{:#}, using defaults", e);
            Config::default()
        }
    }
}

pub async fn load_config() -> Config {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut config = load_from(Path::new(&path)).await;
    config.apply_overrides(|name| std::env::var(name).ok());
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[tokio::test]
    async fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "intervals:\n  fast: 1\nsmtp:\n  username: pi@example.com\n  secure: starttls\n  port: 587\nmodem:\n  enabled: false"
        )
        .unwrap();

        let config = load_from(file.path()).await;
        assert_eq!(config.intervals.fast, 1.0);
        assert_eq!(config.intervals.disk, 10.0);
        assert_eq!(config.smtp.server, "smtp.gmail.com");
        assert_eq!(config.smtp.port, 587);
        assert!(!config.smtp.uses_implicit_tls());
        assert!(!config.modem.enabled);
        assert_eq!(config.http.bind, "0.0.0.0:8001");
    }

    #[tokio::test]
    async fn invalid_or_missing_file_means_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "intervals: [not, a, map]").unwrap();
        let config = load_from(file.path()).await;
        assert_eq!(config.intervals, Intervals::default());

        let dir = tempfile::tempdir().unwrap();
        let config = load_from(&dir.path().join("absent.yaml")).await;
        assert!(config.modem.enabled);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [("MODEM_IP", "10.0.0.1"), ("PIMON_API_KEY", "s3cret"), ("PIMON_BIND", "")]
            .into_iter()
            .collect();
        let mut config = Config::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.modem.host, "10.0.0.1");
        assert_eq!(config.http.api_key.as_deref(), Some("s3cret"));
        // empty values are ignored
        assert_eq!(config.http.bind, "0.0.0.0:8001");
    }
}
