//! Interpreter configuration and its TOML loader.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Where the interpreter runs relative to the target it controls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Location {
    /// Next to the input widget.
    Client,
    /// Next to the target.
    #[default]
    Server,
}

/// Interpreter settings.
///
/// ```toml
/// location = "client"
/// max-predictions = 10
/// display-type = "view"
/// custom-props = ["buttonId", "buttonClass", "tooltipText"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SystemConfig {
    /// Reported to executors through their context.
    pub location: Location,
    /// Upper bound on predictions returned in state snapshots; unlimited when absent.
    pub max_predictions: Option<usize>,
    /// Output type that execution results are converted to; results stay raw when absent.
    pub display_type: Option<String>,
    /// Custom command properties requested when fetching remote specs.
    pub custom_props: Vec<String>,
}

impl SystemConfig {
    /// Client-side configuration.
    pub fn client() -> Self {
        Self {
            location: Location::Client,
            ..Self::default()
        }
    }

    /// Server-side configuration.
    pub fn server() -> Self {
        Self::default()
    }

    /// Parses configuration text.
    pub fn from_toml_str(body: &str) -> Result<Self, ConfigError> {
        toml::from_str(body).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })
    }

    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let body = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&body).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_test_root() -> PathBuf {
        std::env::temp_dir().join(format!(
            "cmdline-config-test-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("time")
                .as_nanos()
        ))
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = SystemConfig::from_toml_str("").expect("parse");
        assert_eq!(config, SystemConfig::server());
        assert_eq!(config.location, Location::Server);
    }

    #[test]
    fn load_reads_kebab_case_keys() {
        let root = unique_test_root();
        fs::create_dir_all(&root).expect("create temp root");
        let path = root.join("cmdline.toml");
        fs::write(
            &path,
            "location = \"client\"\nmax-predictions = 5\ndisplay-type = \"view\"\ncustom-props = [\"buttonId\"]\n",
        )
        .expect("write config");

        let config = SystemConfig::load(&path).expect("load config");
        assert_eq!(
            config,
            SystemConfig {
                location: Location::Client,
                max_predictions: Some(5),
                display_type: Some("view".into()),
                custom_props: vec!["buttonId".into()],
            }
        );

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn load_reports_missing_and_broken_files_with_path() {
        let root = unique_test_root();
        fs::create_dir_all(&root).expect("create temp root");

        let missing = SystemConfig::load(&root.join("missing.toml")).expect_err("missing");
        assert!(matches!(missing, ConfigError::Read { .. }));
        assert!(missing.to_string().contains("missing.toml"));

        let broken_path = root.join("broken.toml");
        fs::write(&broken_path, "location = [").expect("write broken config");
        let broken = SystemConfig::load(&broken_path).expect_err("broken");
        assert!(matches!(broken, ConfigError::Parse { .. }));
        assert!(broken.to_string().contains("broken.toml"));

        let _ = fs::remove_dir_all(root);
    }
}
