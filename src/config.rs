use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::display::{DEFAULT_SCALE, DisplayParams, OpenOrdering, PipelineOptions};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pdf-display";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_scale")]
    pub scale: f64,

    #[serde(default)]
    pub rotation: i32,

    #[serde(default = "default_device_pixel_ratio")]
    pub device_pixel_ratio: f64,

    #[serde(default)]
    pub with_credentials: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmap_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmap_packed: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_src: Option<String>,

    #[serde(default)]
    pub open_ordering: OpenOrdering,

    /// How long the CLI waits for the pipeline to settle
    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_scale() -> f64 {
    DEFAULT_SCALE
}

fn default_device_pixel_ratio() -> f64 {
    1.0
}

fn default_settle_timeout_ms() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            scale: default_scale(),
            rotation: 0,
            device_pixel_ratio: default_device_pixel_ratio(),
            with_credentials: false,
            cmap_url: None,
            cmap_packed: None,
            worker_src: None,
            open_ordering: OpenOrdering::default(),
            settle_timeout_ms: default_settle_timeout_ms(),
        }
    }
}

impl Config {
    /// Display parameters seeded from this configuration (no source yet)
    #[must_use]
    pub fn display_params(&self) -> DisplayParams {
        DisplayParams {
            scale: self.scale,
            rotation: self.rotation,
            with_credentials: self.with_credentials,
            cmap_url: self.cmap_url.clone(),
            cmap_packed: self.cmap_packed,
            worker_src: self.worker_src.clone(),
            ..DisplayParams::default()
        }
    }

    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            open_ordering: self.open_ordering,
        }
    }
}

/// `<config dir>/pdf-display/config.yaml`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load the configuration at `path`, falling back to the default location.
///
/// A missing file yields defaults; an unreadable or malformed one is logged
/// and also yields defaults.
#[must_use]
pub fn load(path: Option<&Path>) -> Config {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => {
                warn!("Could not determine config directory, using default settings");
                return Config::default();
            }
        },
    };

    if !path.exists() {
        info!("No config at {path:?}, using defaults");
        return Config::default();
    }

    match load_from_path(&path) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            Config::default()
        }
    }
}

pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loaded config from {path:?}");

    if config.version < CURRENT_VERSION {
        migrate(&mut config);
    }
    Ok(config)
}

/// Parse a YAML document; every field is optional
pub fn parse(content: &str) -> Result<Config, serde_yaml::Error> {
    if content.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(content)
}

fn migrate(config: &mut Config) {
    info!(
        "Migrating config from v{} to v{}",
        config.version, CURRENT_VERSION
    );
    config.version = CURRENT_VERSION;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(parse("").unwrap(), Config::default());
        assert_eq!(parse("\n  \n").unwrap(), Config::default());
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config = parse("scale: 1.5\nopen_ordering: request_order\n").unwrap();
        assert_eq!(config.scale, 1.5);
        assert_eq!(config.open_ordering, OpenOrdering::RequestOrder);
        assert_eq!(config.rotation, 0);
        assert_eq!(config.device_pixel_ratio, 1.0);
        assert_eq!(config.version, CURRENT_VERSION);
    }

    #[test]
    fn display_params_carry_open_options() {
        let config = parse(
            "with_credentials: true\ncmap_url: /cmaps/\ncmap_packed: true\nrotation: 90\n",
        )
        .unwrap();
        let params = config.display_params();

        assert!(params.source.is_none());
        assert_eq!(params.page, 1);
        assert_eq!(params.rotation, 90);
        let options = params.open_options();
        assert!(options.with_credentials);
        assert_eq!(options.cmap_packed, Some(true));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scale: [not, a, number]").unwrap();

        assert!(matches!(
            load_from_path(file.path()),
            Err(ConfigError::Parse { .. })
        ));
        assert_eq!(load(Some(file.path())), Config::default());
    }

    #[test]
    fn old_version_is_migrated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "version: 0\nscale: 2.0").unwrap();

        let config = load_from_path(file.path()).unwrap();
        assert_eq!(config.version, CURRENT_VERSION);
        assert_eq!(config.scale, 2.0);
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            load(Some(&dir.path().join("absent.yaml"))),
            Config::default()
        );
    }
}
