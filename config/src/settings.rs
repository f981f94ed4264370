//! Typed settings parsed from `config.toml`: gateway pool, dashboard tuning,
//! identity path. Env vars override the file for the single-gateway case.

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::xdg_toml::config_file_path;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("read config: {0}")]
    Read(std::io::Error),
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// One gateway endpoint: name, websocket URL, optional bearer token.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct GatewaySettings {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
}

fn default_addr() -> String {
    "127.0.0.1:4173".to_string()
}

fn default_max_runs() -> usize {
    50
}

/// Dashboard server tuning.
#[derive(Clone, Debug, Deserialize)]
pub struct DashboardSettings {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_max_runs")]
    pub max_runs: usize,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            max_runs: default_max_runs(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct IdentitySettings {
    path: Option<PathBuf>,
}

/// All typed settings for one process.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default, rename = "gateway")]
    pub gateways: Vec<GatewaySettings>,
    #[serde(default)]
    pub dashboard: DashboardSettings,
    #[serde(default)]
    identity: IdentitySettings,
}

impl Settings {
    /// Loads settings from `<config home>/<app_name>/config.toml`, then applies
    /// env-var overrides (`MAESTRO_GATEWAY_URL`, `MAESTRO_GATEWAY_TOKEN`,
    /// `MAESTRO_GATEWAY_NAME`, `MAESTRO_DASHBOARD_ADDR`,
    /// `MAESTRO_IDENTITY_PATH`). A missing file yields defaults.
    pub fn load(app_name: &str) -> Result<Self, SettingsError> {
        let mut settings = match config_file_path(app_name).filter(|p| p.exists()) {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(SettingsError::Read)?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    /// Device identity file path; `None` means the built-in default location.
    pub fn identity_path(&self) -> Option<&PathBuf> {
        self.identity.path.as_ref()
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("MAESTRO_GATEWAY_URL") {
            if !url.trim().is_empty() {
                let name = std::env::var("MAESTRO_GATEWAY_NAME")
                    .ok()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| "default".to_string());
                let token = std::env::var("MAESTRO_GATEWAY_TOKEN")
                    .ok()
                    .filter(|t| !t.is_empty());
                // Env gateway replaces a same-named file entry, else is appended.
                match self.gateways.iter_mut().find(|g| g.name == name) {
                    Some(existing) => {
                        existing.url = url;
                        if token.is_some() {
                            existing.token = token;
                        }
                    }
                    None => self.gateways.push(GatewaySettings { name, url, token }),
                }
            }
        }
        if let Ok(addr) = std::env::var("MAESTRO_DASHBOARD_ADDR") {
            if !addr.trim().is_empty() {
                self.dashboard.addr = addr;
            }
        }
        if let Ok(path) = std::env::var("MAESTRO_IDENTITY_PATH") {
            if !path.trim().is_empty() {
                self.identity.path = Some(PathBuf::from(path));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    // Env-var tests share process state; serialize them.
    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn clear_overrides() {
        for key in [
            "MAESTRO_GATEWAY_URL",
            "MAESTRO_GATEWAY_TOKEN",
            "MAESTRO_GATEWAY_NAME",
            "MAESTRO_DASHBOARD_ADDR",
            "MAESTRO_IDENTITY_PATH",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn parses_gateway_tables() {
        let settings: Settings = toml::from_str(
            r#"
[[gateway]]
name = "main"
url = "wss://gw.example/ws"
token = "secret"

[[gateway]]
name = "backup"
url = "ws://127.0.0.1:9001"

[dashboard]
addr = "0.0.0.0:8088"
max_runs = 10
"#,
        )
        .unwrap();
        assert_eq!(settings.gateways.len(), 2);
        assert_eq!(settings.gateways[0].name, "main");
        assert_eq!(settings.gateways[0].token.as_deref(), Some("secret"));
        assert_eq!(settings.gateways[1].token, None);
        assert_eq!(settings.dashboard.addr, "0.0.0.0:8088");
        assert_eq!(settings.dashboard.max_runs, 10);
    }

    #[test]
    fn defaults_when_sections_missing() {
        let settings: Settings = toml::from_str("").unwrap();
        assert!(settings.gateways.is_empty());
        assert_eq!(settings.dashboard.addr, "127.0.0.1:4173");
        assert_eq!(settings.dashboard.max_runs, 50);
        assert!(settings.identity_path().is_none());
    }

    #[test]
    fn env_gateway_appended() {
        let _guard = env_lock();
        clear_overrides();
        env::set_var("MAESTRO_GATEWAY_URL", "ws://localhost:7000");
        env::set_var("MAESTRO_GATEWAY_TOKEN", "tok");
        let mut settings = Settings::default();
        settings.apply_env();
        clear_overrides();

        assert_eq!(settings.gateways.len(), 1);
        assert_eq!(settings.gateways[0].name, "default");
        assert_eq!(settings.gateways[0].url, "ws://localhost:7000");
        assert_eq!(settings.gateways[0].token.as_deref(), Some("tok"));
    }

    #[test]
    fn env_gateway_replaces_same_name() {
        let _guard = env_lock();
        clear_overrides();
        env::set_var("MAESTRO_GATEWAY_URL", "ws://override:1");
        env::set_var("MAESTRO_GATEWAY_NAME", "main");
        let mut settings: Settings = toml::from_str(
            "[[gateway]]\nname = \"main\"\nurl = \"ws://original:1\"\ntoken = \"keep\"\n",
        )
        .unwrap();
        settings.apply_env();
        clear_overrides();

        assert_eq!(settings.gateways.len(), 1);
        assert_eq!(settings.gateways[0].url, "ws://override:1");
        assert_eq!(settings.gateways[0].token.as_deref(), Some("keep"));
    }
}
