use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use voxreg_core::DataConfig;

/// Returns the ~/.voxreg directory, creating it if needed.
/// Falls back to a local `.voxreg` directory if the home directory cannot be
/// determined or created.
pub fn voxreg_data_dir() -> PathBuf {
    let home = dirs::home_dir().map(|home| home.join(".voxreg"));
    match home.as_deref().map(|path| fs::create_dir_all(path).map(|_| path)) {
        Some(Ok(path)) => return path.to_path_buf(),
        Some(Err(e)) => warn!(error = %e, "Could not create ~/.voxreg, falling back to local .voxreg"),
        None => warn!("Could not determine home directory, falling back to local .voxreg"),
    }
    let fallback = PathBuf::from(".voxreg");
    let _ = fs::create_dir_all(&fallback);
    fallback
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub data: DataConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let root = voxreg_data_dir();
        Self {
            data: DataConfig {
                data_dir: root.join("data"),
                runs_dir: root.join("runs"),
                ..DataConfig::default()
            },
        }
    }
}

impl AppConfig {
    pub fn get_config_path() -> PathBuf {
        let mut path = voxreg_data_dir();
        path.push("config.toml");
        path
    }

    /// Load `path`, or the default location when `None`. A missing default
    /// config is created; a missing explicit one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let path = Self::get_config_path();
                if !path.exists() {
                    let config = AppConfig::default();
                    config.save(&path)?;
                    info!(path = %path.display(), "created default config");
                    return Ok(config);
                }
                path
            }
        };

        let content = fs::read_to_string(&path).with_context(|| format!("reading config {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml).with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }
}

/// Story names from `{data_dir}/features/envelope/*.npy`, sorted.
///
/// Used when the config does not list stories explicitly.
pub fn discover_stories(data_dir: &Path) -> Result<Vec<String>> {
    let dir = data_dir.join("features").join("envelope");
    let mut stories = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("listing stories in {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("npy") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stories.push(stem.to_string());
            }
        }
    }
    stories.sort();
    Ok(stories)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = std::env::temp_dir().join(format!("voxreg_cli_config_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let mut config = AppConfig::default();
        config.data.stories = vec!["alternateithicatom".into(), "souls".into()];
        config.save(&path).unwrap();

        let back = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(back.data.stories, config.data.stories);
        assert_eq!(back.data.roster, config.data.roster);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_data_dir_exists() {
        let dir = voxreg_data_dir();
        assert!(dir.is_dir());
        assert!(dir.ends_with(".voxreg"));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let path = std::env::temp_dir().join("voxreg_definitely_missing").join("config.toml");
        assert!(AppConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_discover_stories_sorted() {
        let dir = std::env::temp_dir().join(format!("voxreg_cli_discover_{}", std::process::id()));
        let envelope = dir.join("features").join("envelope");
        fs::create_dir_all(&envelope).unwrap();
        for name in ["souls.npy", "avatar.npy", "notes.txt"] {
            fs::write(envelope.join(name), b"").unwrap();
        }

        assert_eq!(discover_stories(&dir).unwrap(), vec!["avatar".to_string(), "souls".to_string()]);

        let _ = fs::remove_dir_all(&dir);
    }
}
