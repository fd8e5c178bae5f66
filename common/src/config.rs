//! TOML configuration loading for the mock node.

use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("user directories for {0:?} cannot be determined")]
    NoUserDirs(String),
    #[error("cannot read config file: {0}")]
    CannotRead(std::io::Error),
    #[error("cannot create config file with defaults: {0}")]
    CannotCreateDefault(std::io::Error),
    #[error("cannot parse TOML config: {0}")]
    CannotParseToml(toml::de::Error),
}

/// Program configuration loader.
///
/// ```ignore
/// // uses ~/.config/eth1-mock-node dir
/// let loader = eth1_mock_common::config::Loader::new("eth1-mock-node")?;
///
/// // loads ~/.config/eth1-mock-node/eth1-mock-node.toml, writing the defaults first if missing
/// let config = loader.load_or_create(include_str!("../config.toml"))?;
/// ```
pub struct Loader {
    program_name: String,
    config_dir: PathBuf,
}

impl Loader {
    /// Creates a loader for the given program.
    /// Uses the XDG user directory layout,
    /// e.g. `~/.config/<program-name>`, `~/Library/Application Support/com.eth1-mock.<program-name>`
    /// or `C:\Users\name\AppData\Roaming\eth1-mock\<program-name>\config`
    pub fn new(program_name: &str) -> Result<Self, LoadError> {
        use LoadError::*;
        let dirs = directories::ProjectDirs::from("com", "eth1-mock", program_name)
            .ok_or(NoUserDirs(program_name.into()))?;
        Self::new_with_dir(program_name, dirs.config_dir())
    }

    /// Creates a loader with a specific config directory.
    pub fn new_with_dir(program_name: &str, config_dir: &Path) -> Result<Self, LoadError> {
        Ok(Self { program_name: program_name.to_string(), config_dir: config_dir.into() })
    }

    /// Loads a TOML config file from an explicit path.
    pub fn load_path<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
        use LoadError::*;
        let content = std::fs::read_to_string(path).map_err(CannotRead)?;
        toml::from_str::<T>(&content).map_err(CannotParseToml)
    }

    /// Loads the TOML config file named after the program; if not found, creates it with
    /// the given default config.
    pub fn load_or_create<T: DeserializeOwned>(&self, default: &str) -> Result<T, LoadError> {
        use LoadError::*;
        let path = self.config_dir.join(PathBuf::from(&self.program_name).with_extension("toml"));
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = ?path, "creating config with default contents");
                std::fs::create_dir_all(&self.config_dir).map_err(CannotCreateDefault)?;
                std::fs::write(&path, default).map_err(CannotCreateDefault)?;
                default.into()
            },
            Err(err) => return Err(CannotRead(err)),
        };
        toml::from_str::<T>(&content).map_err(CannotParseToml)
    }
}
