//! Configuration loading and the persisted server-port preference.
//!
//! Two files, deliberately separate: `textlink.toml` is hand-edited
//! configuration (tolerantly parsed: unknown fields are ignored and a
//! parse error falls back to defaults rather than refusing to start), while
//! `prefs.toml` is program-written state holding the one value that
//! survives restarts: the discovery-probe TCP port, stored under the
//! versioned key [`PORT_PREF_KEY`] so a future format change gets a new key
//! instead of colliding with older stored values.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::{info, warn};

/// Probe port used when neither configuration nor preference supplies one.
pub const DEFAULT_SERVER_PORT: u16 = 4001;

/// Versioned preference key for the server port.
pub const PORT_PREF_KEY: &str = "server-port-v1";

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ServerConfig {
    /// Discovery-probe TCP port. A stored preference takes priority.
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
struct PrefsFile {
    #[serde(rename = "server-port-v1", skip_serializing_if = "Option::is_none")]
    server_port: Option<u16>,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>, // original file string (optional)
    pub file: ConfigFile,    // parsed (or default) data
    prefs: PrefsFile,
    prefs_path: Option<PathBuf>,
}

/// Best-effort config path following platform conventions: prefer a local
/// `textlink.toml`, then the platform config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("textlink.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("textlink").join("textlink.toml");
    }
    PathBuf::from("textlink.toml")
}

/// Default location of the program-written preference file.
pub fn prefs_discover() -> PathBuf {
    if let Some(dir) = dirs::config_dir() {
        return dir.join("textlink").join("prefs.toml");
    }
    PathBuf::from("prefs.toml")
}

pub fn load_from(path: Option<PathBuf>, prefs_path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let prefs_path = prefs_path.unwrap_or_else(prefs_discover);
    let prefs = load_prefs(&prefs_path);

    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => Ok(Config {
                raw: Some(content),
                file,
                prefs,
                prefs_path: Some(prefs_path),
            }),
            Err(err) => {
                // Fall back to defaults rather than refusing to start.
                warn!(target: "config", %err, "config_parse_failed_using_defaults");
                Ok(Config {
                    prefs,
                    prefs_path: Some(prefs_path),
                    ..Config::default()
                })
            }
        }
    } else {
        Ok(Config {
            prefs,
            prefs_path: Some(prefs_path),
            ..Config::default()
        })
    }
}

fn load_prefs(path: &PathBuf) -> PrefsFile {
    match fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|err| {
            warn!(target: "config", %err, "prefs_parse_failed_using_defaults");
            PrefsFile::default()
        }),
        Err(_) => PrefsFile::default(),
    }
}

impl Config {
    /// Effective probe port: stored preference, else config file, else
    /// [`DEFAULT_SERVER_PORT`].
    pub fn server_port(&self) -> u16 {
        self.prefs
            .server_port
            .or(self.file.server.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    /// Persist a new port preference under [`PORT_PREF_KEY`].
    pub fn set_server_port(&mut self, port: u16) -> Result<()> {
        self.prefs.server_port = Some(port);
        let Some(path) = &self.prefs_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string(&self.prefs)?)?;
        info!(target: "config", port, "server_port_preference_saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths(dir: &TempDir) -> (Option<PathBuf>, Option<PathBuf>) {
        (
            Some(dir.path().join("textlink.toml")),
            Some(dir.path().join("prefs.toml")),
        )
    }

    #[test]
    fn default_port_when_nothing_configured() {
        let dir = TempDir::new().unwrap();
        let (cfg_path, prefs_path) = paths(&dir);
        let cfg = load_from(cfg_path, prefs_path).unwrap();
        assert_eq!(cfg.server_port(), DEFAULT_SERVER_PORT);
    }

    #[test]
    fn config_file_port_is_used() {
        let dir = TempDir::new().unwrap();
        let (cfg_path, prefs_path) = paths(&dir);
        fs::write(cfg_path.as_ref().unwrap(), "[server]\nport = 4100\n").unwrap();
        let cfg = load_from(cfg_path, prefs_path).unwrap();
        assert_eq!(cfg.server_port(), 4100);
    }

    #[test]
    fn preference_overrides_config_file() {
        let dir = TempDir::new().unwrap();
        let (cfg_path, prefs_path) = paths(&dir);
        fs::write(cfg_path.as_ref().unwrap(), "[server]\nport = 4100\n").unwrap();
        fs::write(
            prefs_path.as_ref().unwrap(),
            "\"server-port-v1\" = 4200\n",
        )
        .unwrap();
        let cfg = load_from(cfg_path, prefs_path).unwrap();
        assert_eq!(cfg.server_port(), 4200);
    }

    #[test]
    fn set_server_port_persists_under_versioned_key() {
        let dir = TempDir::new().unwrap();
        let (cfg_path, prefs_path) = paths(&dir);
        let mut cfg = load_from(cfg_path.clone(), prefs_path.clone()).unwrap();
        cfg.set_server_port(4300).unwrap();

        let written = fs::read_to_string(prefs_path.as_ref().unwrap()).unwrap();
        assert!(written.contains(PORT_PREF_KEY), "key must be versioned");

        let reloaded = load_from(cfg_path, prefs_path).unwrap();
        assert_eq!(reloaded.server_port(), 4300);
    }

    #[test]
    fn malformed_config_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let (cfg_path, prefs_path) = paths(&dir);
        fs::write(cfg_path.as_ref().unwrap(), "[server\nport=").unwrap();
        let cfg = load_from(cfg_path, prefs_path).unwrap();
        assert_eq!(cfg.server_port(), DEFAULT_SERVER_PORT);
    }
}
