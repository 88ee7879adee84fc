//! CLI configuration.
//!
//! Handles the handful of host-side settings the tool needs: where the
//! VPNKit program directory lives, and overrides for the external binaries
//! it shells out to.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "wslforge", "wslforge")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// Get the config directory path.
fn config_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

/// Default VPNKit program directory when none is configured.
pub fn default_program_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().join("vpnkit"))
}

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// VPNKit program directory (downloaded binaries + generated scripts).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_dir: Option<PathBuf>,

    /// Override path to the WSL launcher binary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wsl_exe: Option<PathBuf>,

    /// Override path to the external 7-Zip binary used for archive formats
    /// the native extractor cannot handle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seven_zip: Option<PathBuf>,
}

impl Config {
    /// Load config from disk, or return default.
    pub fn load() -> Result<Self> {
        let path = config_dir()?.join(CONFIG_FILE);

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<()> {
        let dir = config_dir()?;
        fs::create_dir_all(&dir)?;

        let path = dir.join(CONFIG_FILE);
        let contents = serde_json::to_string_pretty(self)?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        // Unset options are omitted entirely.
        assert_eq!(json, "{}");

        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert!(parsed.program_dir.is_none());
        assert!(parsed.wsl_exe.is_none());
    }
}
