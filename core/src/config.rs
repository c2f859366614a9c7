/// Configuration for the localization toolkit
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// Data-file kinds a run can process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    Jar,
    Csv,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolkitConfig {
    /// Root of the untouched game files.
    pub original_dir: PathBuf,
    /// Root of the game files that receive translations.
    pub translation_dir: PathBuf,
    /// Directory of entry snapshot files exchanged with the platform.
    pub platform_dir: PathBuf,
    pub mapping_path: PathBuf,
    pub enabled_loaders: Vec<LoaderKind>,

    /// Ignore stages carried by a previous snapshot on export.
    pub override_string_status: bool,
    /// First line of every exported context.
    pub context_prefix: String,
    /// Skip imported class entries whose context starts with another prefix.
    pub ignore_context_prefix_mismatch: bool,
    pub max_key_length: usize,

    pub min_class_version: u16,
    pub max_class_version: u16,
    /// Trim spaces and tabs before comparing against include/exclude filters.
    pub ignore_surrounding_whitespace: bool,
    pub allow_empty_translation: bool,

    /// Clear a table translation whose original cell became empty.
    pub remove_translation_when_original_empty: bool,

    pub fuzzy_match_threshold: f64,
    pub keep_backups: bool,

    #[serde(skip)]
    pub(crate) project_dir: PathBuf,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            original_dir: PathBuf::from("original"),
            translation_dir: PathBuf::from("localization"),
            platform_dir: PathBuf::from("para_tranz/output"),
            mapping_path: PathBuf::from("para_tranz/para_tranz_map.json"),
            enabled_loaders: vec![LoaderKind::Jar, LoaderKind::Csv],
            override_string_status: false,
            context_prefix: "Version: 0.98-RC8 Entry format: v2".to_string(),
            ignore_context_prefix_mismatch: true,
            max_key_length: 256,
            min_class_version: 0x31,
            max_class_version: 0x3D,
            ignore_surrounding_whitespace: true,
            allow_empty_translation: true,
            remove_translation_when_original_empty: true,
            fuzzy_match_threshold: 0.5,
            keep_backups: false,
            project_dir: PathBuf::new(),
        }
    }
}

impl ToolkitConfig {
    /// Anchor relative paths at `dir`.
    pub fn with_project_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Load configuration from a JSON file; relative paths resolve against
    /// the file's directory.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json(&content)?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config.with_project_dir(dir))
    }

    /// Save configuration to a JSON file
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_json()?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    pub fn original_root(&self) -> PathBuf {
        self.resolve(&self.original_dir)
    }

    pub fn translation_root(&self) -> PathBuf {
        self.resolve(&self.translation_dir)
    }

    pub fn platform_root(&self) -> PathBuf {
        self.resolve(&self.platform_dir)
    }

    pub fn mapping_file(&self) -> PathBuf {
        self.resolve(&self.mapping_path)
    }

    pub fn loader_enabled(&self, kind: LoaderKind) -> bool {
        self.enabled_loaders.contains(&kind)
    }

    /// Prefix line as it appears at the head of every context.
    pub fn context_header(&self) -> String {
        format!("{}\n", self.context_prefix)
    }

    /// Class-file major versions the JAR loader accepts.
    pub fn class_versions(&self) -> RangeInclusive<u16> {
        self.min_class_version..=self.max_class_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ToolkitConfig::default();
        assert_eq!(config.max_key_length, 256);
        assert!(config.class_versions().contains(&0x34));
        assert!(!config.class_versions().contains(&0x3E));
        assert!(config.loader_enabled(LoaderKind::Csv));
        assert_eq!(config.context_header(), "Version: 0.98-RC8 Entry format: v2\n");
    }

    #[test]
    fn test_json_serialization() {
        let config = ToolkitConfig::default();
        let json = config.to_json().unwrap();
        assert!(json.contains("\"enabledLoaders\""));
        assert!(json.contains("\"jar\""));

        let deserialized = ToolkitConfig::from_json(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            ToolkitConfig::from_json(r#"{"enabledLoaders":["csv"],"maxKeyLength":64}"#).unwrap();
        assert_eq!(config.enabled_loaders, vec![LoaderKind::Csv]);
        assert_eq!(config.max_key_length, 64);
        assert_eq!(config.original_dir, PathBuf::from("original"));
    }

    #[test]
    fn paths_resolve_against_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("toolkit.json");
        fs::write(&path, r#"{"translationDir":"out"}"#).unwrap();

        let config = ToolkitConfig::from_json_file(&path).unwrap();
        assert_eq!(config.translation_root(), dir.path().join("out"));
        assert_eq!(
            config.mapping_file(),
            dir.path().join("para_tranz/para_tranz_map.json")
        );
    }
}
