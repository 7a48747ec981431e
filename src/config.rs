//! Service configuration.
//!
//! Loaded once from a JSON file (environment-variable override, then a
//! default path). Holds the template store location and, optionally, the
//! expected top-level keys per document identifier used to validate request
//! shape before any resource is touched.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::request::{CompositionRequest, TemplateKey};
use crate::resolver::{FileResolver, DEFAULT_TEMPLATE_EXTENSION};

/// Environment variable naming the configuration file path.
pub const CONFIG_PATH_ENV: &str = "REPORT_FORGE_CONFIG";

/// Path tried when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/report_forge.json";

/// Report service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory holding template resources.
    pub template_root: PathBuf,

    /// Filename extension of template resources (without the dot).
    pub template_extension: String,

    /// Expected top-level request keys per document identifier.
    ///
    /// When an identifier has an entry here, every listed key must appear
    /// in the request (as a dataset or a field) or the request is rejected
    /// before resolution. Identifiers without an entry are not validated.
    pub expected_keys: IndexMap<String, Vec<String>>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            template_root: PathBuf::from("templates"),
            template_extension: DEFAULT_TEMPLATE_EXTENSION.to_string(),
            expected_keys: IndexMap::new(),
        }
    }
}

impl ReportConfig {
    /// Load configuration from the environment-selected path, falling back
    /// to [`DEFAULT_CONFIG_PATH`].
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self::from_path(Path::new(&path))
    }

    /// Load configuration from an explicit file path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::InvalidConfiguration(format!(
                    "configuration file not found at {}",
                    path.display()
                ))
            } else {
                Error::Io(err)
            }
        })?;
        let config: ReportConfig = serde_json::from_str(&text)?;
        log::info!(
            "report configuration loaded from {} (template root: {})",
            path.display(),
            config.template_root.display()
        );
        Ok(config)
    }

    /// Build the file resolver described by this configuration.
    pub fn resolver(&self) -> FileResolver {
        FileResolver::new(&self.template_root).with_extension(&self.template_extension)
    }

    /// Validate request shape for `identifier` against the expected keys.
    pub fn validate_request(&self, identifier: &str, request: &CompositionRequest) -> Result<()> {
        let Some(expected) = self.expected_keys.get(identifier) else {
            return Ok(());
        };
        for name in expected {
            let as_key = TemplateKey::new(name);
            let present =
                request.datasets().contains_key(&as_key) || request.fields().contains_key(name);
            if !present {
                return Err(Error::InvalidRequest(format!(
                    "request for '{}' is missing expected key '{}'",
                    identifier, name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write as _;

    #[test]
    fn test_defaults() {
        let config = ReportConfig::default();
        assert_eq!(config.template_root, PathBuf::from("templates"));
        assert_eq!(config.template_extension, "tpl");
        assert!(config.expected_keys.is_empty());
    }

    #[test]
    fn test_from_path_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            br#"{"template_root": "/srv/templates", "expected_keys": {"anketa": ["master", "relative"]}}"#,
        )
        .unwrap();

        let config = ReportConfig::from_path(&path).unwrap();
        assert_eq!(config.template_root, PathBuf::from("/srv/templates"));
        // Unlisted fields keep their defaults.
        assert_eq!(config.template_extension, "tpl");
        assert_eq!(config.expected_keys["anketa"], vec!["master", "relative"]);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = ReportConfig::from_path(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_validate_request() {
        let mut config = ReportConfig::default();
        config
            .expected_keys
            .insert("anketa".to_string(), vec!["master".to_string(), "title".to_string()]);

        let ok = CompositionRequest::from_value(&json!({
            "master": [{"a": 1}],
            "title": "Anketa"
        }))
        .unwrap();
        assert!(config.validate_request("anketa", &ok).is_ok());

        let missing = CompositionRequest::from_value(&json!({"master": []})).unwrap();
        let err = config.validate_request("anketa", &missing).unwrap_err();
        assert!(err.to_string().contains("title"));

        // Identifiers without an expectation are not validated.
        assert!(config.validate_request("other", &missing).is_ok());
    }
}
