//! Configuration file parsing and discovery

use crate::config::types::Config;
use crate::error::{ConfigError, ConfigResult, PipeworkError};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file names to search for
const CONFIG_FILE_NAMES: &[&str] = &["pipework.yml", "pipework.yaml"];

/// A loaded configuration and the project root it applies to
#[derive(Debug, Clone)]
pub struct Project {
    pub config: Config,

    /// Directory all configured paths are relative to
    pub root: PathBuf,

    /// Config file, if one was found
    pub config_path: Option<PathBuf>,
}

/// Find the configuration file starting from a specific directory
pub fn find_config_file_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        for file_name in CONFIG_FILE_NAMES {
            let config_path = current_dir.join(file_name);
            searched_paths.push(config_path.display().to_string());

            if config_path.is_file() {
                return Ok(config_path);
            }
        }

        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

/// Parse a configuration file from a path
pub fn parse_config_file(path: &Path) -> Result<Config, PipeworkError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read file: {}", e)))?;

    parse_config(&contents)
}

/// Parse configuration from a string
pub fn parse_config(yaml: &str) -> Result<Config, PipeworkError> {
    // An empty file is a valid "all defaults" config
    if yaml.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(yaml)?;
    Ok(config)
}

/// Load a project from an explicit config file
pub fn load_project_file(path: &Path) -> Result<Project, PipeworkError> {
    let config = parse_config_file(path)?;
    let root = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok(Project {
        config,
        root,
        config_path: Some(path.to_path_buf()),
    })
}

/// Load a project starting from `start_dir`, falling back to defaults rooted
/// at `start_dir` when no config file exists
pub fn load_project_from(start_dir: PathBuf) -> Result<Project, PipeworkError> {
    match find_config_file_from(start_dir.clone()) {
        Ok(path) => load_project_file(&path),
        Err(ConfigError::NotFound(_)) => Ok(Project {
            config: Config::default(),
            root: start_dir,
            config_path: None,
        }),
        Err(e) => Err(e.into()),
    }
}

/// Load a project with automatic file discovery
pub fn load_project_auto() -> Result<Project, PipeworkError> {
    let cwd = env::current_dir()?;
    load_project_from(cwd)
}
