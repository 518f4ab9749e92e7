use crate::domain::model::{ServiceEndpoint, ServiceStatus};
use crate::domain::ports::CatalogSource;
use crate::utils::error::{PsicquicError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;
use url::Url;

/// Well-known PSICQUIC registry endpoint, plain-text active-service listing.
pub const DEFAULT_REGISTRY_URL: &str =
    "http://www.ebi.ac.uk/Tools/webservices/psicquic/registry/registry?action=ACTIVE&format=txt";

/// Catalog source backed by the remote registry service.
pub struct HttpCatalogSource {
    client: reqwest::Client,
    url: String,
}

impl HttpCatalogSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn load(&self) -> Result<Vec<ServiceEndpoint>> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(PsicquicError::RegistryUnavailable {
                reason: format!("registry returned HTTP {}", response.status()),
            });
        }
        let body = response.text().await?;
        Ok(parse_catalog_text(&body))
    }
}

/// Parses the registry's `format=txt` listing: one `Name=URL` pair per line.
pub fn parse_catalog_text(body: &str) -> Vec<ServiceEndpoint> {
    let mut services = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, url)) = line.split_once('=') else {
            tracing::warn!("skipping malformed registry line: {}", line);
            continue;
        };
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() || Url::parse(url).is_err() {
            tracing::warn!("skipping registry entry with bad URL: {}", line);
            continue;
        }
        services.push(ServiceEndpoint::new(name, url));
    }
    services
}

/// Owned directory of known services, keyed by endpoint URL.
///
/// Reads are safe concurrently with running count/fetch stages; writes
/// (refresh, toggling a service) are serialized by the internal lock.
pub struct RegistryDirectory {
    source: Box<dyn CatalogSource>,
    services: RwLock<BTreeMap<String, ServiceEndpoint>>,
}

impl RegistryDirectory {
    pub fn new(source: Box<dyn CatalogSource>) -> Self {
        Self {
            source,
            services: RwLock::new(BTreeMap::new()),
        }
    }

    /// Directory backed by the remote registry at `registry_url`.
    pub fn with_registry_url(registry_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::new(Box::new(HttpCatalogSource::new(
            client,
            registry_url,
        ))))
    }

    /// Retrieves the master service list from the catalog source.
    ///
    /// Fails soft: when the refresh fails but a previously loaded list
    /// exists, the old list is kept and a warning is logged. Only a failure
    /// with no prior list is an error.
    pub async fn load_or_refresh(&self) -> Result<Vec<ServiceEndpoint>> {
        match self.source.load().await {
            Ok(catalog) if !catalog.is_empty() => {
                self.install(catalog);
                tracing::info!("registry loaded: {} services", self.len());
                Ok(self.endpoints())
            }
            Ok(_) => self.fall_back("registry returned an empty catalog"),
            Err(e) => self.fall_back(&e.to_string()),
        }
    }

    fn fall_back(&self, reason: &str) -> Result<Vec<ServiceEndpoint>> {
        let snapshot = self.endpoints();
        if snapshot.is_empty() {
            Err(PsicquicError::RegistryUnavailable {
                reason: reason.to_string(),
            })
        } else {
            tracing::warn!(
                "registry refresh failed ({}); keeping {} previously known services",
                reason,
                snapshot.len()
            );
            Ok(snapshot)
        }
    }

    /// Replaces the catalog, carrying over active flags and last-known
    /// status for endpoints that were already present.
    pub fn install(&self, catalog: Vec<ServiceEndpoint>) {
        let mut services = self.services.write().expect("registry lock poisoned");
        let previous = std::mem::take(&mut *services);
        for mut endpoint in catalog {
            if let Some(known) = previous.get(&endpoint.url) {
                endpoint.active = known.active;
                endpoint.status = known.status;
            }
            services.insert(endpoint.url.clone(), endpoint);
        }
    }

    /// Name → URL map of the currently active services.
    pub fn active_services(&self) -> BTreeMap<String, String> {
        let services = self.services.read().expect("registry lock poisoned");
        services
            .values()
            .filter(|s| s.active)
            .map(|s| (s.name.clone(), s.url.clone()))
            .collect()
    }

    /// Toggles a single entry. Returns false when the URL is unknown.
    pub fn set_active(&self, url: &str, active: bool) -> bool {
        let mut services = self.services.write().expect("registry lock poisoned");
        match services.get_mut(url) {
            Some(endpoint) => {
                endpoint.active = active;
                true
            }
            None => false,
        }
    }

    /// Records a status-check result for one endpoint.
    pub fn mark_status(&self, url: &str, status: ServiceStatus) -> bool {
        let mut services = self.services.write().expect("registry lock poisoned");
        match services.get_mut(url) {
            Some(endpoint) => {
                endpoint.status = status;
                true
            }
            None => false,
        }
    }

    pub fn endpoints(&self) -> Vec<ServiceEndpoint> {
        let services = self.services.read().expect("registry lock poisoned");
        services.values().cloned().collect()
    }

    /// Active endpoints only, the default target set for a search.
    pub fn active_endpoints(&self) -> Vec<ServiceEndpoint> {
        let services = self.services.read().expect("registry lock poisoned");
        services.values().filter(|s| s.active).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.services.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn directory_for(server: &MockServer) -> RegistryDirectory {
        RegistryDirectory::with_registry_url(&server.url("/registry")).unwrap()
    }

    #[test]
    fn test_parse_catalog_text() {
        let body = "IntAct=http://example.org/intact/search/\n\
                    # comment line\n\
                    MINT=http://example.org/mint/search/\n\
                    broken line without separator\n\
                    BadUrl=not a url\n";
        let services = parse_catalog_text(body);

        assert_eq!(services.len(), 2);
        assert_eq!(services[0].name, "IntAct");
        assert_eq!(services[1].url, "http://example.org/mint/search/");
        assert!(services.iter().all(|s| s.active));
        assert!(services
            .iter()
            .all(|s| s.status == ServiceStatus::Unknown));
    }

    #[tokio::test]
    async fn test_load_or_refresh_success() {
        let server = MockServer::start();
        let registry_mock = server.mock(|when, then| {
            when.method(GET).path("/registry");
            then.status(200)
                .body("IntAct=http://example.org/intact/\nMINT=http://example.org/mint/\n");
        });

        let directory = directory_for(&server);
        let services = directory.load_or_refresh().await.unwrap();

        registry_mock.assert();
        assert_eq!(services.len(), 2);
        assert_eq!(directory.active_services().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_list() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/registry");
            then.status(500);
        });

        let directory = directory_for(&server);
        directory.install(vec![ServiceEndpoint::new(
            "IntAct",
            "http://example.org/intact/",
        )]);

        let services = directory.load_or_refresh().await.unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "IntAct");
    }

    #[tokio::test]
    async fn test_refresh_failure_with_no_previous_list_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/registry");
            then.status(503);
        });

        let directory = directory_for(&server);
        let result = directory.load_or_refresh().await;
        assert!(matches!(
            result,
            Err(PsicquicError::RegistryUnavailable { .. })
        ));
    }

    #[test]
    fn test_set_active_filters_active_services() {
        let server = MockServer::start();
        let directory = directory_for(&server);
        directory.install(vec![
            ServiceEndpoint::new("IntAct", "http://example.org/intact/"),
            ServiceEndpoint::new("MINT", "http://example.org/mint/"),
        ]);

        assert!(directory.set_active("http://example.org/mint/", false));
        assert!(!directory.set_active("http://example.org/unknown/", false));

        let active = directory.active_services();
        assert_eq!(active.len(), 1);
        assert!(active.contains_key("IntAct"));
        assert_eq!(directory.active_endpoints().len(), 1);
        assert_eq!(directory.len(), 2);
    }

    #[test]
    fn test_install_preserves_user_toggles() {
        let server = MockServer::start();
        let directory = directory_for(&server);
        directory.install(vec![ServiceEndpoint::new(
            "IntAct",
            "http://example.org/intact/",
        )]);
        directory.set_active("http://example.org/intact/", false);
        directory.mark_status("http://example.org/intact/", ServiceStatus::Reachable);

        // Simulated refresh delivering the same endpoint again.
        directory.install(vec![ServiceEndpoint::new(
            "IntAct",
            "http://example.org/intact/",
        )]);

        let endpoints = directory.endpoints();
        assert!(!endpoints[0].active);
        assert_eq!(endpoints[0].status, ServiceStatus::Reachable);
    }
}
