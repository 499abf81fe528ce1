//! Turn YAML or JSON text into the untyped value tree the decoder reads.

use std::fmt;
use std::path::Path;

use serde_json::Value;
use sluice_types::{ConfigError, Result};

/// Document syntax of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Pick the format from a file extension. Unknown extensions yield `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(DocumentFormat::Yaml),
            "json" => Some(DocumentFormat::Json),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DocumentFormat::Yaml => "YAML",
            DocumentFormat::Json => "JSON",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse `text` into a value tree.
///
/// YAML goes through `serde_yaml` and is converted to a `serde_json::Value`, so
/// non-string mapping keys are rejected here rather than in the decoder.
pub fn parse_str(text: &str, format: DocumentFormat) -> Result<Value> {
    let parsed = match format {
        DocumentFormat::Json => serde_json::from_str::<Value>(text).map_err(|e| e.to_string()),
        DocumentFormat::Yaml => serde_yaml::from_str::<Value>(text).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| ConfigError::Parse {
        format: format.name().to_string(),
        message,
    })
}

/// Read and parse a configuration file. Files without a recognized extension
/// are read as YAML, which also accepts JSON documents.
pub fn load_file(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let format = DocumentFormat::from_path(path).unwrap_or(DocumentFormat::Yaml);
    tracing::debug!(path = %path.display(), format = %format, "Loading configuration");
    let text = std::fs::read_to_string(path)?;
    parse_str(&text, format)
}
