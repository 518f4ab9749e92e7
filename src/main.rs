use clap::Parser;
use psicquic_client::domain::ports::{ConfigProvider, LogProgress};
use psicquic_client::utils::{logger, validation::Validate};
use psicquic_client::{
    ClusterMode, CliConfig, FileCatalogSource, RegistryDirectory, SearchPipeline,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();

    logger::init_cli_logger(config.verbose);

    tracing::info!("Starting psicquic-search");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    let query = config.to_query()?;

    let registry = match &config.catalog_file {
        Some(path) => RegistryDirectory::new(Box::new(FileCatalogSource::new(path))),
        None => RegistryDirectory::with_registry_url(&config.registry_url)?,
    };
    registry.load_or_refresh().await?;

    let targets = registry.active_endpoints();
    tracing::info!("Querying {} active services", targets.len());

    // Ctrl-C requests cooperative cancellation; partial results are kept.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Cancellation requested");
                cancel.cancel();
            }
        });
    }

    let pipeline = SearchPipeline::new(&config, Arc::new(LogProgress))?;
    let mode = if config.merge {
        ClusterMode::Merged
    } else {
        ClusterMode::Separate
    };

    let outcome = pipeline.quick_import(query, targets, mode, &cancel).await?;

    for (url, failure) in &outcome.failures {
        tracing::warn!("{}: {}", url, failure.detail);
    }
    if outcome.skipped_records > 0 {
        tracing::warn!("Skipped {} malformed records", outcome.skipped_records);
    }

    let summary = serde_json::json!({
        "canceled": outcome.canceled,
        "total_matches": outcome.counts.total_hits(),
        "failed_services": outcome.failures.len(),
        "graphs": outcome.graphs.iter().map(|g| serde_json::json!({
            "name": g.name,
            "nodes": g.node_count(),
            "edges": g.edge_count(),
            "create_view": g.object_count() < config.view_threshold(),
        })).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if outcome.canceled {
        tracing::warn!("Search canceled; partial results shown above");
    } else {
        tracing::info!("✅ Imported {} graphs", outcome.graphs.len());
    }

    Ok(())
}
