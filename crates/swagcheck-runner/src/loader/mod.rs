//! Schema loading: fetch or read a Swagger 2.0 / OpenAPI 3.x document and
//! reduce it to an [`ApiSchema`]

mod extract;

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use tracing::{debug, info};

use swagcheck_core::ApiSchema;

pub use extract::extract_schema;

/// Where the schema document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    Url(Url),
    File(PathBuf),
}

impl SchemaSource {
    /// `http(s)://` locations are URLs, anything else is a local path.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Fetch`] for an `http(s)` location that is not a valid URL.
    pub fn parse(location: &str) -> Result<Self, LoadError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            Url::parse(location)
                .map(Self::Url)
                .map_err(|e| LoadError::Fetch(format!("{location}: {e}")))
        } else {
            Ok(Self::File(PathBuf::from(location)))
        }
    }

    fn url(&self) -> Option<&Url> {
        match self {
            Self::Url(url) => Some(url),
            Self::File(_) => None,
        }
    }
}

impl std::fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Read or fetch `source` and extract its operations.
///
/// # Errors
///
/// Returns error if the document cannot be read, fetched or parsed, or is
/// not a Swagger 2.0 / OpenAPI 3.x document.
pub fn load(source: &SchemaSource, timeout: Duration) -> Result<ApiSchema, LoadError> {
    let (hint, content) = match source {
        SchemaSource::File(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| LoadError::Io(format!("{}: {e}", path.display())))?;
            (path.clone(), content)
        }
        SchemaSource::Url(url) => (PathBuf::from(url.path()), fetch(url, timeout)?),
    };
    debug!(source = %source, bytes = content.len(), "schema document read");

    let document = parse_document(&hint, &content)?;
    let schema = extract_schema(&document, source.url())?;
    info!(
        source = %source,
        operations = schema.operations.len(),
        base_url = schema.base_url.as_deref().unwrap_or("-"),
        "schema loaded"
    );
    Ok(schema)
}

fn fetch(url: &Url, timeout: Duration) -> Result<String, LoadError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LoadError::Fetch(e.to_string()))?;
    let resp = client
        .get(url.clone())
        .send()
        .map_err(|e| LoadError::Fetch(format!("{url}: {e}")))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(LoadError::Fetch(format!("{url}: HTTP {}", status.as_u16())));
    }
    resp.text()
        .map_err(|e| LoadError::Fetch(format!("{url}: {e}")))
}

/// Parse a schema document from JSON or YAML.
///
/// Detection strategy: try extension first (`.yaml`/`.yml`/`.json`), then
/// fall back to content sniffing (leading `{` → JSON, otherwise YAML).
///
/// # Errors
///
/// Returns [`LoadError::Parse`] when the content is not valid in the chosen format.
pub fn parse_document(path: &Path, content: &str) -> Result<serde_json::Value, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "yaml" | "yml" => parse_yaml(content),
        "json" => parse_json(content),
        _ => {
            // Content sniffing: trimmed first char
            if content.trim_start().starts_with('{') {
                parse_json(content)
            } else {
                parse_yaml(content)
            }
        }
    }
}

fn parse_json(content: &str) -> Result<serde_json::Value, LoadError> {
    serde_json::from_str(content).map_err(|e| LoadError::Parse(format!("Invalid JSON: {e}")))
}

fn parse_yaml(content: &str) -> Result<serde_json::Value, LoadError> {
    serde_yml::from_str(content).map_err(|e| LoadError::Parse(format!("Invalid YAML: {e}")))
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Fetch error: {0}")]
    Fetch(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Unsupported document: {0}")]
    Unsupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_document_json_by_extension() {
        let json = r#"{"swagger": "2.0", "info": {"title": "T", "version": "1"}}"#;
        let v = parse_document(Path::new("swagger.json"), json).unwrap();
        assert_eq!(v["swagger"], "2.0");
    }

    #[test]
    fn parse_document_yaml_by_extension() {
        let yaml = "openapi: '3.0.3'\ninfo:\n  title: T\n  version: '1'\n";
        let v = parse_document(Path::new("spec.yaml"), yaml).unwrap();
        assert_eq!(v["openapi"], "3.0.3");
    }

    #[test]
    fn parse_document_yml_by_extension() {
        let yaml = "openapi: '3.0.3'\n";
        let v = parse_document(Path::new("spec.YML"), yaml).unwrap();
        assert_eq!(v["openapi"], "3.0.3");
    }

    #[test]
    fn parse_document_sniff_json() {
        let json = r#"  {"swagger": "2.0"}"#;
        let v = parse_document(Path::new("/api/docs"), json).unwrap();
        assert_eq!(v["swagger"], "2.0");
    }

    #[test]
    fn parse_document_sniff_yaml() {
        let yaml = "swagger: '2.0'\n";
        let v = parse_document(Path::new("spec.txt"), yaml).unwrap();
        assert_eq!(v["swagger"], "2.0");
    }

    #[test]
    fn parse_document_invalid_json_error() {
        let err = parse_document(Path::new("spec.json"), "{ invalid json").unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[test]
    fn parse_document_invalid_yaml_error() {
        let err = parse_document(Path::new("spec.yaml"), ":\n  :\n    - [invalid").unwrap_err();
        assert!(err.to_string().contains("Invalid YAML"));
    }

    #[test]
    fn source_kinds() {
        assert!(matches!(
            SchemaSource::parse("http://localhost:8080/swagger.json").unwrap(),
            SchemaSource::Url(_)
        ));
        assert_eq!(
            SchemaSource::parse("api/swagger.yaml").unwrap(),
            SchemaSource::File(PathBuf::from("api/swagger.yaml"))
        );
        assert!(SchemaSource::parse("http://").is_err());
    }

    #[test]
    fn load_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swagger.yaml");
        std::fs::write(
            &path,
            "swagger: '2.0'\nhost: api.example.com\npaths:\n  /ping:\n    get:\n      responses:\n        '200': {description: ok}\n",
        )
        .unwrap();
        let schema = load(&SchemaSource::File(path), Duration::from_secs(1)).unwrap();
        assert_eq!(schema.operations.len(), 1);
        assert_eq!(schema.base_url.as_deref(), Some("http://api.example.com/"));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = load(
            &SchemaSource::File(PathBuf::from("/nonexistent/swagger.json")),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }
}
