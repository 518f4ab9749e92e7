pub mod count;
pub mod fetch;
pub mod graph;
pub mod mitab;
pub mod orchestrator;
pub mod registry;
pub mod rest;

pub use crate::domain::model::{
    ClusterMode, CountReport, FetchOutcome, InteractionCluster, InteractionRecord, Query,
    ServiceEndpoint,
};
pub use crate::domain::ports::{CatalogSource, ConfigProvider, ProgressSink};
pub use crate::utils::error::Result;
