use crate::core::mitab;
use crate::core::rest::query_url;
use crate::domain::model::{
    ClusterMode, FailureKind, FetchOutcome, InteractionCluster, Query, ServiceEndpoint,
    ServiceFailure,
};
use crate::utils::error::{PsicquicError, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Tag of the single cluster produced in merged mode.
pub const MERGED_TAG: &str = "merged";

/// Retrieves full interaction records from a set of services and
/// accumulates them into clusters.
///
/// Bodies are streamed and parsed line by line; the cancellation token is
/// observed between records, so a cancel stops each target within one
/// record's processing. In merged mode all targets append into one shared
/// cluster behind an async mutex; in separate mode each target owns its
/// cluster exclusively.
pub struct FetchEngine {
    client: reqwest::Client,
    max_in_flight: usize,
    request_timeout: Duration,
}

struct TargetOutcome {
    name: String,
    url: String,
    /// Populated in separate mode only; merged mode appends to the shared
    /// cluster instead.
    cluster: Option<InteractionCluster>,
    failure: Option<ServiceFailure>,
    skipped: usize,
}

impl FetchEngine {
    pub fn new(client: reqwest::Client, max_in_flight: usize, request_timeout: Duration) -> Self {
        Self {
            client,
            max_in_flight: max_in_flight.max(1),
            request_timeout,
        }
    }

    pub async fn fetch(
        &self,
        query: &Query,
        targets: &[ServiceEndpoint],
        mode: ClusterMode,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        if targets.is_empty() {
            return Err(PsicquicError::EmptyTargetSet);
        }
        // Fatal before any network call.
        let expression = query.to_expression()?;

        let shared = match mode {
            ClusterMode::Merged => Some(Arc::new(Mutex::new(InteractionCluster::new()))),
            ClusterMode::Separate => None,
        };

        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut join_set = JoinSet::new();

        for target in targets {
            let client = self.client.clone();
            let endpoint = target.clone();
            let expression = expression.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let shared = shared.clone();
            let timeout = self.request_timeout;

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return canceled_outcome(endpoint, "engine shut down");
                    }
                };
                // No new requests once canceled.
                if cancel.is_cancelled() {
                    return canceled_outcome(endpoint, "canceled before dispatch");
                }
                stream_target(client, endpoint, expression, timeout, cancel, shared).await
            });
        }

        let mut outcome = FetchOutcome::default();
        let mut separate: Vec<(String, InteractionCluster)> = Vec::new();
        let mut any_success = false;

        while let Some(joined) = join_set.join_next().await {
            let target = match joined {
                Ok(target) => target,
                Err(e) => {
                    tracing::error!("fetch task panicked: {}", e);
                    continue;
                }
            };

            outcome.skipped_records += target.skipped;
            let failed = target.failure.is_some();
            if let Some(failure) = target.failure {
                tracing::warn!(service = %target.name, "fetch failed: {}", failure.detail);
                outcome.failures.insert(target.url.clone(), failure);
            } else {
                any_success = true;
            }

            if let Some(cluster) = target.cluster {
                // A cleanly fetched (possibly empty) cluster is a valid
                // result; a failed target contributes records only when it
                // got some through before dying mid-stream.
                if !failed || !cluster.is_empty() {
                    separate.push((target.name, cluster));
                }
            }
        }

        match shared {
            Some(cluster) => {
                let cluster = match Arc::try_unwrap(cluster) {
                    Ok(mutex) => mutex.into_inner(),
                    Err(arc) => arc.lock().await.clone(),
                };
                if any_success || !cluster.is_empty() {
                    outcome.clusters.push((MERGED_TAG.to_string(), cluster));
                }
            }
            None => {
                separate.sort_by(|(a, _), (b, _)| a.cmp(b));
                outcome.clusters = separate;
            }
        }

        outcome.canceled = cancel.is_cancelled();
        Ok(outcome)
    }
}

fn canceled_outcome(endpoint: ServiceEndpoint, detail: &str) -> TargetOutcome {
    TargetOutcome {
        failure: Some(ServiceFailure::new(
            &endpoint.url,
            FailureKind::Canceled,
            detail,
        )),
        name: endpoint.name,
        url: endpoint.url,
        cluster: None,
        skipped: 0,
    }
}

async fn stream_target(
    client: reqwest::Client,
    endpoint: ServiceEndpoint,
    expression: String,
    timeout: Duration,
    cancel: CancellationToken,
    shared: Option<Arc<Mutex<InteractionCluster>>>,
) -> TargetOutcome {
    let url = endpoint.url.clone();
    let mut local = match shared {
        Some(_) => None,
        None => Some(InteractionCluster::new()),
    };
    let mut skipped = 0usize;
    let mut failure: Option<ServiceFailure> = None;

    let fail = |kind, detail: String, local, skipped| TargetOutcome {
        failure: Some(ServiceFailure::new(&endpoint.url, kind, detail)),
        name: endpoint.name.clone(),
        url: endpoint.url.clone(),
        cluster: local,
        skipped,
    };

    let target_url = match query_url(&endpoint.url, &expression, &endpoint.format_tag) {
        Ok(target_url) => target_url,
        Err(e) => return fail(FailureKind::Transport, e, local, skipped),
    };

    tracing::debug!(service = %endpoint.name, "fetching records from {}", target_url);

    // The timeout bounds time-to-headers here and each chunk read below, so
    // a large result set that keeps flowing is never cut off, but a stalled
    // peer cannot hold the join alive.
    let response = match tokio::time::timeout(timeout, client.get(target_url).send()).await {
        Err(_) => {
            return fail(
                FailureKind::Timeout,
                format!("no response within {:?}", timeout),
                local,
                skipped,
            )
        }
        Ok(Err(e)) => return fail(FailureKind::Transport, e.to_string(), local, skipped),
        Ok(Ok(response)) => response,
    };

    let status = response.status();
    if !status.is_success() {
        return fail(
            FailureKind::Http {
                status: status.as_u16(),
            },
            format!("record endpoint returned HTTP {}", status),
            local,
            skipped,
        );
    }

    let mut stream = response.bytes_stream();
    let mut buf: Vec<u8> = Vec::new();

    'streaming: loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break 'streaming,
            next = tokio::time::timeout(timeout, stream.next()) => match next {
                // Idle timeout: the body stalled between chunks. Already
                // parsed records are preserved below.
                Err(_) => {
                    failure = Some(ServiceFailure::new(
                        &url,
                        FailureKind::Timeout,
                        format!("record stream stalled for {:?}", timeout),
                    ));
                    break 'streaming;
                }
                Ok(None) => break 'streaming,
                Ok(Some(Ok(bytes))) => bytes,
                Ok(Some(Err(e))) => {
                    failure = Some(ServiceFailure::new(
                        &url,
                        FailureKind::StreamCorrupt,
                        e.to_string(),
                    ));
                    break 'streaming;
                }
            },
        };

        buf.extend_from_slice(&chunk);
        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = buf.drain(..=pos).collect();
            // Cancellation observed between records, not just per chunk.
            if cancel.is_cancelled() {
                break 'streaming;
            }
            let line = String::from_utf8_lossy(&line_bytes);
            if !append_line(
                line.trim(),
                &endpoint.name,
                &url,
                &shared,
                &mut local,
                &mut skipped,
                &mut failure,
            )
            .await
            {
                break 'streaming;
            }
        }
    }

    // A final record without a trailing newline.
    if failure.is_none() && !cancel.is_cancelled() && !buf.is_empty() {
        let line = String::from_utf8_lossy(&buf);
        append_line(
            line.trim(),
            &endpoint.name,
            &url,
            &shared,
            &mut local,
            &mut skipped,
            &mut failure,
        )
        .await;
    }

    TargetOutcome {
        name: endpoint.name,
        url,
        cluster: local,
        failure,
        skipped,
    }
}

/// Parses one line and appends it to the owning cluster. Returns false when
/// the stream must stop (structural corruption).
async fn append_line(
    line: &str,
    source_tag: &str,
    url: &str,
    shared: &Option<Arc<Mutex<InteractionCluster>>>,
    local: &mut Option<InteractionCluster>,
    skipped: &mut usize,
    failure: &mut Option<ServiceFailure>,
) -> bool {
    if line.is_empty() || line.starts_with('#') {
        return true;
    }
    match mitab::parse_line(line, source_tag) {
        Ok(record) => {
            match shared {
                // Single-writer critical section for merged mode.
                Some(cluster) => cluster.lock().await.append(record),
                None => {
                    if let Some(cluster) = local.as_mut() {
                        cluster.append(record);
                    }
                }
            }
            true
        }
        Err(e) if e.is_terminal() => {
            *failure = Some(ServiceFailure::new(
                url,
                FailureKind::StreamCorrupt,
                e.to_string(),
            ));
            false
        }
        Err(e) => {
            *skipped += 1;
            tracing::warn!(service = %source_tag, "skipping malformed record: {}", e);
            true
        }
    }
}
