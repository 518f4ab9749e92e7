pub mod catalog;

use crate::core::registry::DEFAULT_REGISTRY_URL;
use crate::domain::model::Query;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{PsicquicError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_range, validate_url, Validate,
};
use clap::Parser;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum QueryModeArg {
    /// MIQL query text, passed through as-is.
    Miql,
    /// Whitespace- or comma-separated interactor identifiers.
    Interactors,
    /// Two comma-separated taxonomy identifiers.
    Species,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "psicquic-search")]
#[command(about = "Search PSICQUIC interaction services and build interaction graphs")]
pub struct CliConfig {
    /// Query text; interpretation depends on --mode
    #[arg(long)]
    pub query: String,

    #[arg(long, value_enum, default_value = "miql")]
    pub mode: QueryModeArg,

    #[arg(long, default_value = DEFAULT_REGISTRY_URL)]
    pub registry_url: String,

    /// Local TOML service catalog, used instead of the remote registry
    #[arg(long)]
    pub catalog_file: Option<String>,

    /// Merge all services' records into one graph
    #[arg(long)]
    pub merge: bool,

    #[arg(long, default_value = "5")]
    pub max_in_flight: usize,

    #[arg(long, default_value = "30")]
    pub timeout_secs: u64,

    /// Graphs below this node+edge count get a view materialized by the
    /// consumer
    #[arg(long, default_value = "3000")]
    pub view_threshold: usize,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl CliConfig {
    /// Builds the typed query from the raw CLI text and mode flag.
    pub fn to_query(&self) -> Result<Query> {
        match self.mode {
            QueryModeArg::Miql => Ok(Query::Miql(self.query.clone())),
            QueryModeArg::Interactors => Ok(Query::Interactors(
                self.query
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            QueryModeArg::Species => {
                let taxons: Vec<&str> = self
                    .query
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                if taxons.len() != 2 {
                    return Err(PsicquicError::InvalidQuery {
                        reason: format!(
                            "species mode expects two comma-separated taxonomy ids, got '{}'",
                            self.query
                        ),
                    });
                }
                Ok(Query::SpeciesPair {
                    taxon_a: taxons[0].to_string(),
                    taxon_b: taxons[1].to_string(),
                })
            }
        }
    }
}

impl ConfigProvider for CliConfig {
    fn registry_url(&self) -> &str {
        &self.registry_url
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn view_threshold(&self) -> usize {
        self.view_threshold
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("query", &self.query)?;
        validate_url("registry_url", &self.registry_url)?;
        validate_range("max_in_flight", self.max_in_flight, 1, 100)?;
        validate_range("timeout_secs", self.timeout_secs, 1, 600)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(query: &str, mode: QueryModeArg) -> CliConfig {
        CliConfig {
            query: query.to_string(),
            mode,
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            catalog_file: None,
            merge: false,
            max_in_flight: 5,
            timeout_secs: 30,
            view_threshold: 3000,
            verbose: false,
        }
    }

    #[test]
    fn test_to_query_miql() {
        let query = config("brca1 AND species:9606", QueryModeArg::Miql)
            .to_query()
            .unwrap();
        assert_eq!(query, Query::Miql("brca1 AND species:9606".to_string()));
    }

    #[test]
    fn test_to_query_interactors_splits_separators() {
        let query = config("P12345, Q67890 O11111", QueryModeArg::Interactors)
            .to_query()
            .unwrap();
        assert_eq!(
            query,
            Query::Interactors(vec![
                "P12345".to_string(),
                "Q67890".to_string(),
                "O11111".to_string()
            ])
        );
    }

    #[test]
    fn test_to_query_species_pair() {
        let query = config("9606, 10090", QueryModeArg::Species)
            .to_query()
            .unwrap();
        assert_eq!(
            query,
            Query::SpeciesPair {
                taxon_a: "9606".to_string(),
                taxon_b: "10090".to_string()
            }
        );
        assert!(config("9606", QueryModeArg::Species).to_query().is_err());
    }

    #[test]
    fn test_validate() {
        assert!(config("brca1", QueryModeArg::Miql).validate().is_ok());

        let mut bad = config("  ", QueryModeArg::Miql);
        assert!(bad.validate().is_err());
        bad.query = "brca1".to_string();
        bad.max_in_flight = 0;
        assert!(bad.validate().is_err());
    }
}
