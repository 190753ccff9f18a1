use std::{
    env::var,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "formsync.toml";

/// What a scheduled pass does for a project.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormUpdateMode {
    #[default]
    Manual,
    PreviouslyDownloadedOnly,
    MatchExactly,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectSettings {
    #[serde(default)]
    pub form_update_mode: FormUpdateMode,
    /// Download updates to already downloaded forms without asking.
    #[serde(default)]
    pub automatic_update: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProjectConfig {
    pub id: String,
    pub name: String,
    pub server_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Holds `forms/`, `.cache/` and `formsync.db`.
    pub directory: String,
    #[serde(flatten)]
    pub settings: ProjectSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

impl ClientConfig {
    /// `FORMSYNC_CONFIG_PATH`, falling back to `formsync.toml`.
    pub fn path() -> PathBuf {
        PathBuf::from(var("FORMSYNC_CONFIG_PATH").unwrap_or(DEFAULT_CONFIG_PATH.to_string()))
    }

    pub fn load<P>(path: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let config_string = std::fs::read_to_string(path.as_ref()).map_err(|_| {
            anyhow::anyhow!("No config found at {}", path.as_ref().to_string_lossy())
        })?;
        Ok(toml::from_str(&config_string)?)
    }
}
