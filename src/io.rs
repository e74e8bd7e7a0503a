//! Counts and config loading
//!
//! Loading input is not part of the diagram core, which only accepts an
//! already parsed [`Value`]. This module is what the command-line harness
//! uses to get there: a [`CountsReader`] per file format and a registry
//! that picks one by extension.

use std::fs;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use crate::config::FlowConfig;

/// Errors that can occur while loading counts or config
#[derive(Error, Debug)]
pub enum IoError {
    /// The file format is not supported
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The file extension could not be determined
    #[error("could not determine file format from path: {0}")]
    UnknownExtension(String),

    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A parsing error occurred
    #[error("parse error: {0}")]
    Parse(String),
}

/// Result type for loading operations
pub type IoResult<T> = Result<T, IoError>;

/// Parses a counts file into a nested [`Value`]
///
/// Field order in the file is preserved, since it decides sibling order
/// in the diagram.
pub trait CountsReader {
    /// Parse the input file
    fn read(&self, input: &Path) -> IoResult<Value> {
        let content = fs::read_to_string(input)?;
        self.parse(&content)
    }

    /// Parse file contents
    fn parse(&self, content: &str) -> IoResult<Value>;

    /// File extensions this reader can handle (e.g., ["yaml", "yml"])
    fn supported_extensions(&self) -> &[&str];

    /// Check if this reader can handle the given file extension
    fn supports_extension(&self, ext: &str) -> bool {
        self.supported_extensions()
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Reader for JSON counts
#[derive(Debug, Default)]
pub struct JsonCountsReader;

impl JsonCountsReader {
    pub fn new() -> Self {
        Self
    }
}

impl CountsReader for JsonCountsReader {
    fn parse(&self, content: &str) -> IoResult<Value> {
        serde_json::from_str(content).map_err(|e| IoError::Parse(e.to_string()))
    }

    fn supported_extensions(&self) -> &[&str] {
        &["json"]
    }
}

/// Reader for YAML counts
#[derive(Debug, Default)]
pub struct YamlCountsReader;

impl YamlCountsReader {
    pub fn new() -> Self {
        Self
    }
}

impl CountsReader for YamlCountsReader {
    fn parse(&self, content: &str) -> IoResult<Value> {
        serde_yaml::from_str(content).map_err(|e| IoError::Parse(e.to_string()))
    }

    fn supported_extensions(&self) -> &[&str] {
        &["yaml", "yml"]
    }
}

/// Registry of available counts readers
pub struct FormatRegistry {
    readers: Vec<Box<dyn CountsReader>>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            readers: Vec::new(),
        }
    }

    /// Create a registry with the JSON and YAML readers registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_reader(Box::new(JsonCountsReader::new()));
        registry.register_reader(Box::new(YamlCountsReader::new()));
        registry
    }

    /// Register a reader
    pub fn register_reader(&mut self, reader: Box<dyn CountsReader>) {
        self.readers.push(reader);
    }

    /// Find a reader for the given file extension
    pub fn reader_for_extension(&self, ext: &str) -> Option<&dyn CountsReader> {
        self.readers
            .iter()
            .find(|r| r.supports_extension(ext))
            .map(|r| r.as_ref())
    }

    /// Get file extension from a path
    pub fn extension_from_path(path: &Path) -> Option<&str> {
        path.extension().and_then(|e| e.to_str())
    }

    /// Find a reader for the given path based on its extension
    pub fn reader_for_path(&self, path: &Path) -> IoResult<&dyn CountsReader> {
        let ext = Self::extension_from_path(path)
            .ok_or_else(|| IoError::UnknownExtension(path.display().to_string()))?;

        self.reader_for_extension(ext)
            .ok_or_else(|| IoError::UnsupportedFormat(ext.to_string()))
    }

    /// Read a counts file, picking the reader by extension
    pub fn read_counts(&self, path: &Path) -> IoResult<Value> {
        self.reader_for_path(path)?.read(path)
    }
}

/// Load a [`FlowConfig`] from a JSON or YAML file
pub fn load_config(path: &Path) -> IoResult<FlowConfig> {
    let ext = FormatRegistry::extension_from_path(path)
        .ok_or_else(|| IoError::UnknownExtension(path.display().to_string()))?;
    let content = fs::read_to_string(path)?;

    if ext.eq_ignore_ascii_case("json") {
        serde_json::from_str(&content).map_err(|e| IoError::Parse(e.to_string()))
    } else if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
        serde_yaml::from_str(&content).map_err(|e| IoError::Parse(e.to_string()))
    } else {
        Err(IoError::UnsupportedFormat(ext.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    // Mock reader for testing
    struct MockReader {
        extensions: Vec<&'static str>,
    }

    impl CountsReader for MockReader {
        fn parse(&self, _content: &str) -> IoResult<Value> {
            Ok(Value::Null)
        }

        fn supported_extensions(&self) -> &[&str] {
            &self.extensions
        }
    }

    #[test]
    fn reader_supports_extension_case_insensitive() {
        let reader = MockReader {
            extensions: vec!["yaml", "yml"],
        };
        assert!(reader.supports_extension("yaml"));
        assert!(reader.supports_extension("YML"));
        assert!(!reader.supports_extension("json"));
    }

    #[test]
    fn registry_reader_for_path_extracts_extension() {
        let mut registry = FormatRegistry::new();
        registry.register_reader(Box::new(MockReader {
            extensions: vec!["json"],
        }));

        assert!(registry.reader_for_path(&PathBuf::from("/data/counts.json")).is_ok());
        assert!(matches!(
            registry.reader_for_path(&PathBuf::from("/data/counts.csv")),
            Err(IoError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            registry.reader_for_path(&PathBuf::from("/data/counts")),
            Err(IoError::UnknownExtension(_))
        ));
    }

    #[test]
    fn json_reader_keeps_field_order() {
        let value = JsonCountsReader::new()
            .parse(r#"{"zeta": {"failed": 1}, "alpha": {"failed": 2}}"#)
            .unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn yaml_reader_keeps_field_order() {
        let value = YamlCountsReader::new()
            .parse("zeta:\n  failed: 1\nalpha:\n  failed: 2\n  success: 3\n")
            .unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
        assert_eq!(value["alpha"]["success"], 3);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = JsonCountsReader::new().parse("{not json").unwrap_err();
        assert!(matches!(err, IoError::Parse(_)));
    }

    #[test]
    fn with_defaults_reads_both_formats() {
        let registry = FormatRegistry::with_defaults();
        assert!(registry.reader_for_extension("json").is_some());
        assert!(registry.reader_for_extension("YAML").is_some());
        assert!(registry.reader_for_extension("yml").is_some());
        assert!(registry.reader_for_extension("toml").is_none());
    }

    #[test]
    fn read_counts_from_disk() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("counts.yaml");
        fs::write(&path, "A:\n  failed: 3\n  success: 7\n").unwrap();

        let value = FormatRegistry::with_defaults()
            .read_counts(&path)
            .expect("Failed to read counts");
        assert_eq!(value["A"]["failed"], 3);
    }

    #[test]
    fn load_config_by_extension() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let yaml = temp_dir.path().join("flow.yml");
        fs::write(&yaml, "density: 12\n").unwrap();
        let json = temp_dir.path().join("flow.json");
        fs::write(&json, r#"{"curvature": 0.25}"#).unwrap();
        let toml = temp_dir.path().join("flow.toml");
        fs::write(&toml, "density = 1").unwrap();

        assert_eq!(load_config(&yaml).unwrap().density, 12);
        assert_eq!(load_config(&json).unwrap().curvature, 0.25);
        assert!(matches!(
            load_config(&toml),
            Err(IoError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn io_error_display() {
        let err = IoError::UnsupportedFormat("xyz".to_string());
        assert_eq!(err.to_string(), "unsupported format: xyz");

        let err = IoError::Parse("invalid syntax".to_string());
        assert_eq!(err.to_string(), "parse error: invalid syntax");
    }
}
