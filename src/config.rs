//! Optional TOML settings for ellu-dl.
//!
//! Looked up in `./ellu-dl.toml`, then in `ellu-dl/config.toml` under the platform
//! config directory (`$XDG_CONFIG_HOME` or `~/.config` on Linux). The first file that
//! exists is used; the rest are ignored.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOCAL_FILE: &str = "ellu-dl.toml";
const APP_DIR: &str = "ellu-dl";
const APP_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot determine current directory")]
    CurrentDir(#[source] std::io::Error),

    #[error("Cannot read config {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Keys that may appear in the file. Absent keys fall through to CLI defaults.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for the default output file name. Relative to the working directory.
    pub output_dir: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub request_delay_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    /// Visible table-of-contents page before the chapters.
    pub toc_page: Option<bool>,
    /// `dc:language` of the package.
    pub language: Option<String>,
}

/// Candidate files, most specific first.
pub fn config_paths(cwd: &Path) -> Vec<PathBuf> {
    let mut paths = vec![cwd.join(LOCAL_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join(APP_DIR).join(APP_FILE));
    }
    paths
}

/// Load the first existing config file. `Ok(None)` when there is none.
pub fn load_config() -> Result<Option<Config>, ConfigError> {
    let cwd = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
    config_paths(&cwd)
        .iter()
        .find(|p| p.is_file())
        .map(|p| load_config_file(p))
        .transpose()
}

pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}
