use crate::domain::model::ServiceEndpoint;
use crate::domain::ports::CatalogSource;
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use url::Url;

/// TOML service catalog, an offline substitute for the remote registry:
///
/// ```toml
/// [[service]]
/// name = "IntAct"
/// url = "https://www.ebi.ac.uk/Tools/webservices/psicquic/intact/webservices/current/search/"
/// ```
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub service: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub url: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_active() -> bool {
    true
}

fn default_format() -> String {
    "tab25".to_string()
}

impl CatalogFile {
    pub fn into_endpoints(self) -> Vec<ServiceEndpoint> {
        let mut endpoints = Vec::new();
        for entry in self.service {
            if entry.name.trim().is_empty() || Url::parse(&entry.url).is_err() {
                tracing::warn!("skipping catalog entry with bad name or URL: {:?}", entry);
                continue;
            }
            let mut endpoint = ServiceEndpoint::new(entry.name, entry.url);
            endpoint.active = entry.active;
            endpoint.format_tag = entry.format;
            endpoints.push(endpoint);
        }
        endpoints
    }
}

/// Catalog source reading a local TOML file.
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    async fn load(&self) -> Result<Vec<ServiceEndpoint>> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let file: CatalogFile = toml::from_str(&text)?;
        Ok(file.into_endpoints())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CATALOG: &str = r#"
[[service]]
name = "IntAct"
url = "http://example.org/intact/search/"

[[service]]
name = "MINT"
url = "http://example.org/mint/search/"
active = false
format = "tab27"

[[service]]
name = "Broken"
url = "not a url"
"#;

    #[test]
    fn test_catalog_parsing() {
        let file: CatalogFile = toml::from_str(CATALOG).unwrap();
        let endpoints = file.into_endpoints();

        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].name, "IntAct");
        assert!(endpoints[0].active);
        assert_eq!(endpoints[0].format_tag, "tab25");
        assert!(!endpoints[1].active);
        assert_eq!(endpoints[1].format_tag, "tab27");
    }

    #[tokio::test]
    async fn test_file_catalog_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let source = FileCatalogSource::new(file.path());
        let endpoints = source.load().await.unwrap();
        assert_eq!(endpoints.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let source = FileCatalogSource::new("/nonexistent/catalog.toml");
        assert!(source.load().await.is_err());
    }
}
