pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::{catalog::FileCatalogSource, CliConfig};
pub use crate::core::count::CountExecutor;
pub use crate::core::fetch::FetchEngine;
pub use crate::core::graph::{Graph, GraphBuilder};
pub use crate::core::orchestrator::{PendingImport, SearchOutcome, SearchPipeline, SearchStage};
pub use crate::core::registry::RegistryDirectory;
pub use domain::model::{
    ClusterMode, CountReport, InteractionCluster, InteractionRecord, Query, ServiceEndpoint,
};
pub use utils::error::{PsicquicError, Result};
