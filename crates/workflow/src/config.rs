//! Workflow configuration.
//!
//! Loaded from a TOML file passed via `nfa --config nfa.toml`. Every field
//! has a default, so an empty file (or no file at all) is valid.
//!
//! # Example
//!
//! ```toml
//! [numbering]
//! prefix = "NFA"
//! width = 4
//! max_retries = 5
//!
//! [documents]
//! output_dir = "documents"
//!
//! [logging]
//! filter = "nfa_workflow=info"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub numbering: NumberingConfig,
    pub documents: DocumentsConfig,
    pub logging: LoggingConfig,
}

/// `[numbering]`: shape of the final `<prefix>/<year>/<seq>` number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberingConfig {
    pub prefix: String,
    /// Minimum digits of the sequence part; shorter values are zero-padded.
    pub width: usize,
    /// How many times finalize recomputes the number after losing a race.
    pub max_retries: u32,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            prefix: "NFA".to_string(),
            width: 4,
            max_retries: 5,
        }
    }
}

/// `[documents]`: where generated documents are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    pub output_dir: PathBuf,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("documents"),
        }
    }
}

/// `[logging]`: default tracing filter, overridden by `RUST_LOG`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "nfa_workflow=info,nfa_cli=info".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Functions ─────────────────────────────────────────────────────────────────

impl WorkflowConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: WorkflowConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.numbering.prefix;
        if prefix.is_empty() || prefix.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "numbering.prefix must be non-empty and must not contain '/', got '{prefix}'"
            )));
        }
        if self.numbering.width == 0 {
            return Err(ConfigError::Invalid(
                "numbering.width must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = WorkflowConfig::from_toml("").unwrap();
        assert_eq!(config, WorkflowConfig::default());
        assert_eq!(config.numbering.prefix, "NFA");
        assert_eq!(config.numbering.width, 4);
        assert_eq!(config.documents.output_dir, PathBuf::from("documents"));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = WorkflowConfig::from_toml(
            r#"
[numbering]
width = 6

[documents]
output_dir = "/tmp/nfa-docs"
"#,
        )
        .unwrap();
        assert_eq!(config.numbering.width, 6);
        assert_eq!(config.numbering.prefix, "NFA");
        assert_eq!(config.numbering.max_retries, 5);
        assert_eq!(config.documents.output_dir, PathBuf::from("/tmp/nfa-docs"));
    }

    #[test]
    fn slash_in_prefix_rejected() {
        let err = WorkflowConfig::from_toml("[numbering]\nprefix = \"A/B\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_width_rejected() {
        let err = WorkflowConfig::from_toml("[numbering]\nwidth = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nfa.toml");
        std::fs::write(&path, "[numbering\nprefix = 1").unwrap();
        let err = WorkflowConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("nfa.toml"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = WorkflowConfig::load(Path::new("/nonexistent/nfa.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
