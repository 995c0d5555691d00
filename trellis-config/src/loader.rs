// Configuration file loaders

use crate::{ConfigError, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Supported configuration file formats, in lookup order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Toml,
    Json,
}

impl FileFormat {
    pub const ALL: [FileFormat; 2] = [FileFormat::Toml, FileFormat::Json];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(FileFormat::Toml),
            "json" => Some(FileFormat::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Toml => "toml",
            FileFormat::Json => "json",
        }
    }
}

/// Configuration file loader
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Auto-detect format from file extension
    pub fn auto(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::LoadError("No file extension found".to_string()))?;

        let format = FileFormat::from_extension(ext)
            .ok_or_else(|| ConfigError::UnsupportedFormat(ext.to_string()))?;

        Ok(Self::new(format))
    }

    /// Find `<name>.toml` or `<name>.json` inside `dir`.
    pub fn locate(dir: &Path, name: &str) -> Option<PathBuf> {
        FileFormat::ALL
            .iter()
            .map(|format| dir.join(format!("{}.{}", name, format.extension())))
            .find(|candidate| candidate.is_file())
    }

    pub fn load_file(&self, path: &Path) -> Result<Value> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        self.parse(&content)
    }

    pub fn parse(&self, content: &str) -> Result<Value> {
        match self.format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::ParseError(format!("JSON parse error: {}", e))),
            FileFormat::Toml => {
                let toml_value: toml::Value = toml::from_str(content)
                    .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;
                serde_json::to_value(toml_value)
                    .map_err(|e| ConfigError::SerializationError(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_numeric_keys() {
        let loader = ConfigLoader::new(FileFormat::Toml);
        let value = loader
            .parse(
                r#"
                [beforeMiddleware]
                0 = "Profiler:init"
                10 = "Session:start"
            "#,
            )
            .unwrap();

        assert_eq!(value["beforeMiddleware"]["10"], "Session:start");
    }

    #[test]
    fn test_parse_json() {
        let loader = ConfigLoader::new(FileFormat::Json);
        let value = loader.parse(r#"{"404": "Core\\E404:index"}"#).unwrap();
        assert_eq!(value["404"], "Core\\E404:index");
    }

    #[test]
    fn test_malformed_is_parse_error() {
        let loader = ConfigLoader::new(FileFormat::Toml);
        assert!(matches!(
            loader.parse("this is = = not toml"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_locate_prefers_toml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.json"), "{}").unwrap();
        fs::write(dir.path().join("app.toml"), "").unwrap();

        let found = ConfigLoader::locate(dir.path(), "app").unwrap();
        assert_eq!(found.extension().unwrap(), "toml");
        assert!(ConfigLoader::locate(dir.path(), "routes").is_none());
    }

    #[test]
    fn test_auto_detects_format() {
        assert!(ConfigLoader::auto(Path::new("db.json")).is_ok());
        assert!(matches!(
            ConfigLoader::auto(Path::new("db.yaml")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
