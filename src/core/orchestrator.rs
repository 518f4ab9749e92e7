use crate::core::count::CountExecutor;
use crate::core::fetch::{FetchEngine, MERGED_TAG};
use crate::core::graph::{Graph, GraphBuilder};
use crate::domain::model::{
    ClusterMode, CountReport, Query, ServiceEndpoint, ServiceFailure,
};
use crate::domain::ports::{ConfigProvider, ProgressSink};
use crate::utils::error::Result;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Progress checkpoints, reported through a monotone clamp.
const PROGRESS_START: f64 = 0.01;
const PROGRESS_POST_COUNT: f64 = 0.2;
const PROGRESS_POST_FETCH: f64 = 0.8;
const PROGRESS_POST_BUILD: f64 = 0.95;
const PROGRESS_DONE: f64 = 1.0;

/// Stage of one search invocation. `Canceled` absorbs from `Counting` and
/// `Fetching`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStage {
    Idle,
    Counting,
    CountsReady,
    Fetching,
    Building,
    Done,
    Canceled,
}

/// Pause point between the count and fetch stages: counts are in, the
/// caller picks the targets to import before the pipeline resumes.
#[derive(Debug)]
pub struct PendingImport {
    query: Query,
    report: CountReport,
    targets: Vec<ServiceEndpoint>,
}

impl PendingImport {
    pub fn report(&self) -> &CountReport {
        &self.report
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Default selection: the counted targets that reported matches.
    pub fn default_selection(&self) -> Vec<ServiceEndpoint> {
        let with_hits = self.report.targets_with_hits();
        self.targets
            .iter()
            .filter(|t| with_hits.contains(&t.url))
            .cloned()
            .collect()
    }

    /// Explicit selection by endpoint URL, restricted to counted targets.
    pub fn select(&self, urls: &[String]) -> Vec<ServiceEndpoint> {
        self.targets
            .iter()
            .filter(|t| urls.contains(&t.url))
            .cloned()
            .collect()
    }
}

/// Final result of one search invocation. Partial results are always
/// usable; `canceled` marks an invocation cut short by the user.
#[derive(Debug)]
pub struct SearchOutcome {
    pub graphs: Vec<Graph>,
    pub counts: CountReport,
    pub failures: BTreeMap<String, ServiceFailure>,
    pub skipped_records: usize,
    pub canceled: bool,
}

/// Sequences count → fetch → build, threading one cancellation token
/// through all stages and reporting monotone progress.
pub struct SearchPipeline {
    counter: CountExecutor,
    fetcher: FetchEngine,
    builder: GraphBuilder,
    progress: Arc<dyn ProgressSink>,
    last_progress: Mutex<f64>,
    stage: RwLock<SearchStage>,
}

impl SearchPipeline {
    pub fn new(config: &dyn ConfigProvider, progress: Arc<dyn ProgressSink>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("psicquic-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            counter: CountExecutor::new(
                client.clone(),
                config.max_in_flight(),
                config.request_timeout(),
            ),
            fetcher: FetchEngine::new(client, config.max_in_flight(), config.request_timeout()),
            builder: GraphBuilder::new(),
            progress,
            last_progress: Mutex::new(-1.0),
            stage: RwLock::new(SearchStage::Idle),
        })
    }

    pub fn stage(&self) -> SearchStage {
        *self.stage.read().expect("stage lock poisoned")
    }

    fn set_stage(&self, stage: SearchStage) {
        tracing::debug!("pipeline stage: {:?}", stage);
        *self.stage.write().expect("stage lock poisoned") = stage;
    }

    /// Clamped, monotone progress: never moves backward within one
    /// invocation.
    fn report_progress(&self, fraction: f64) {
        let mut last = self.last_progress.lock().expect("progress lock poisoned");
        let clamped = fraction.clamp(0.0, 1.0);
        if clamped > *last {
            *last = clamped;
            self.progress.progress(clamped);
        }
    }

    /// Phase one: counts matches across the targets, then pauses. The
    /// returned [`PendingImport`] resumes the pipeline once the caller has
    /// confirmed a target selection.
    pub async fn count(
        &self,
        query: Query,
        targets: Vec<ServiceEndpoint>,
        cancel: &CancellationToken,
    ) -> Result<PendingImport> {
        // New invocation: reset the monotone clamp.
        *self.last_progress.lock().expect("progress lock poisoned") = -1.0;
        self.set_stage(SearchStage::Counting);
        self.progress
            .status(&format!("Searching {} services...", targets.len()));
        self.report_progress(PROGRESS_START);

        let report = self.counter.count_across(&query, &targets, cancel).await?;

        if report.canceled {
            self.set_stage(SearchStage::Canceled);
            self.progress.status("Search canceled");
        } else {
            self.set_stage(SearchStage::CountsReady);
            self.progress.status(&format!(
                "{} matching interactions across {} services",
                report.total_hits(),
                report.counts.len()
            ));
            self.report_progress(PROGRESS_POST_COUNT);
        }

        Ok(PendingImport {
            query,
            report,
            targets,
        })
    }

    /// Phase two: fetches records from the selected targets, clusters them
    /// and builds graphs.
    pub async fn import(
        &self,
        pending: PendingImport,
        selection: Vec<ServiceEndpoint>,
        mode: ClusterMode,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome> {
        if pending.report.canceled {
            return Ok(SearchOutcome {
                graphs: Vec::new(),
                counts: pending.report,
                failures: BTreeMap::new(),
                skipped_records: 0,
                canceled: true,
            });
        }

        self.set_stage(SearchStage::Fetching);
        self.progress.status(&format!(
            "Loading interactions from {} services...",
            selection.len()
        ));

        let fetched = self
            .fetcher
            .fetch(&pending.query, &selection, mode, cancel)
            .await?;

        if !fetched.canceled {
            self.report_progress(PROGRESS_POST_FETCH);
        }

        self.set_stage(SearchStage::Building);
        self.progress.status("Building interaction graphs...");

        let graphs: Vec<Graph> = fetched
            .clusters
            .iter()
            .map(|(tag, cluster)| self.builder.build(&display_label(tag), cluster))
            .collect();

        if fetched.canceled {
            self.set_stage(SearchStage::Canceled);
            self.progress.status("Import canceled; partial results kept");
        } else {
            self.report_progress(PROGRESS_POST_BUILD);
            self.set_stage(SearchStage::Done);
            self.report_progress(PROGRESS_DONE);
            self.progress.status(&format!(
                "Imported {} graphs ({} interactions)",
                graphs.len(),
                fetched.record_total()
            ));
        }

        Ok(SearchOutcome {
            graphs,
            counts: pending.report,
            failures: fetched.failures,
            skipped_records: fetched.skipped_records,
            canceled: fetched.canceled,
        })
    }

    /// Quick-expand flow: count, then automatically import from every
    /// target that reported matches.
    pub async fn quick_import(
        &self,
        query: Query,
        targets: Vec<ServiceEndpoint>,
        mode: ClusterMode,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome> {
        let pending = self.count(query, targets, cancel).await?;

        if pending.report.canceled {
            return Ok(SearchOutcome {
                graphs: Vec::new(),
                counts: pending.report,
                failures: BTreeMap::new(),
                skipped_records: 0,
                canceled: true,
            });
        }

        let selection = pending.default_selection();
        if selection.is_empty() {
            self.progress.status("No services returned matches");
            self.set_stage(SearchStage::Done);
            self.report_progress(PROGRESS_DONE);
            return Ok(SearchOutcome {
                graphs: Vec::new(),
                counts: pending.report,
                failures: BTreeMap::new(),
                skipped_records: 0,
                canceled: false,
            });
        }

        self.import(pending, selection, mode, cancel).await
    }
}

fn display_label(tag: &str) -> String {
    if tag == MERGED_TAG {
        "Merged Network".to_string()
    } else {
        tag.to_string()
    }
}
