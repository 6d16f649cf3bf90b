//! # Config Loader
//!
//! Reads a deployment description (`kargo.toml`) from disk.

use crate::models::Config;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("Could not read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from '{path}': {source}")]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Loads and parses the description at `path`.
///
/// An empty `name` defaults to the basename of the directory containing the file.
///
/// # Arguments
///
/// * `path` - The `kargo.toml` to read.
pub fn load(path: &Path) -> Result<Config, ConfigLoadError> {
    log::debug!("Loading deployment description from {}", path.display());

    let content = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: Config =
        toml::from_str(&content).map_err(|source| ConfigLoadError::TomlParse {
            path: path.to_path_buf(),
            source,
        })?;

    if config.name.is_empty() {
        config.name = default_name(path);
        log::trace!("Defaulted application name to '{}'", config.name);
    }

    Ok(config)
}

/// The basename of the directory holding `path`, resolved through symlinks and `..`.
fn default_name(path: &Path) -> String {
    let absolute = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    absolute
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CONFIG_FILENAME;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_defaults_name_to_directory() {
        let dir = tempdir().unwrap();
        let app_dir = dir.path().join("shop-frontend");
        fs::create_dir(&app_dir).unwrap();
        let file = app_dir.join(CONFIG_FILENAME);
        fs::write(&file, "path = \"k8s\"\n").unwrap();

        let config = load(&file).unwrap();
        assert_eq!(config.name, "shop-frontend");
        assert_eq!(config.path, "k8s");
    }

    #[test]
    fn test_load_keeps_explicit_name() {
        let dir = tempdir().unwrap();
        let file = dir.path().join(CONFIG_FILENAME);
        fs::write(
            &file,
            "name = \"web\"\n\n[helm]\nrepo = \"https://charts.example.com/stable\"\nchart = \"nginx\"\n",
        )
        .unwrap();

        let config = load(&file).unwrap();
        assert_eq!(config.name, "web");
        assert_eq!(config.helm.map(|h| h.chart), Some("nginx".to_string()));
    }

    #[test]
    fn test_load_reports_parse_and_io_errors() {
        let dir = tempdir().unwrap();
        let file = dir.path().join(CONFIG_FILENAME);
        fs::write(&file, "name = [").unwrap();
        assert!(matches!(load(&file), Err(ConfigLoadError::TomlParse { .. })));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(load(&missing), Err(ConfigLoadError::Io { .. })));
    }
}
