use crate::core::rest::{query_url, FORMAT_COUNT};
use crate::domain::model::{
    CountReport, FailureKind, Query, ServiceEndpoint, ServiceFailure,
};
use crate::utils::error::{PsicquicError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Fans a count query out to a set of services, bounded by a semaphore.
///
/// One target failing never aborts the others; every requested target ends
/// up with exactly one entry in the report, either a count or a failure.
pub struct CountExecutor {
    client: reqwest::Client,
    max_in_flight: usize,
    request_timeout: Duration,
}

impl CountExecutor {
    pub fn new(client: reqwest::Client, max_in_flight: usize, request_timeout: Duration) -> Self {
        Self {
            client,
            max_in_flight: max_in_flight.max(1),
            request_timeout,
        }
    }

    pub async fn count_across(
        &self,
        query: &Query,
        targets: &[ServiceEndpoint],
        cancel: &CancellationToken,
    ) -> Result<CountReport> {
        if targets.is_empty() {
            return Err(PsicquicError::EmptyTargetSet);
        }
        // Fatal before any network call.
        let expression = query.to_expression()?;

        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut join_set = JoinSet::new();

        for target in targets {
            let client = self.client.clone();
            let expression = expression.clone();
            let url = target.url.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let timeout = self.request_timeout;

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            url.clone(),
                            Err(ServiceFailure::new(
                                &url,
                                FailureKind::Canceled,
                                "executor shut down",
                            )),
                        )
                    }
                };

                // Checked before dispatch: no new requests after cancellation.
                if cancel.is_cancelled() {
                    return (
                        url.clone(),
                        Err(ServiceFailure::new(
                            &url,
                            FailureKind::Canceled,
                            "canceled before dispatch",
                        )),
                    );
                }

                let result = tokio::select! {
                    _ = cancel.cancelled() => Err(ServiceFailure::new(
                        &url,
                        FailureKind::Canceled,
                        "canceled in flight",
                    )),
                    counted = fetch_count(&client, &url, &expression, timeout) => counted,
                };
                (url, result)
            });
        }

        let mut report = CountReport::default();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((url, Ok(count))) => {
                    tracing::debug!(service = %url, count, "count result");
                    report.counts.insert(url, count);
                }
                Ok((url, Err(failure))) => {
                    tracing::warn!(service = %url, "count failed: {}", failure.detail);
                    report.failures.insert(url, failure);
                }
                Err(e) => {
                    tracing::error!("count task panicked: {}", e);
                }
            }
        }
        report.canceled = cancel.is_cancelled();
        Ok(report)
    }
}

async fn fetch_count(
    client: &reqwest::Client,
    base_url: &str,
    expression: &str,
    timeout: Duration,
) -> std::result::Result<u64, ServiceFailure> {
    let url = query_url(base_url, expression, FORMAT_COUNT)
        .map_err(|e| ServiceFailure::new(base_url, FailureKind::Transport, e))?;

    let response = match tokio::time::timeout(timeout, client.get(url).send()).await {
        Err(_) => {
            return Err(ServiceFailure::new(
                base_url,
                FailureKind::Timeout,
                format!("no response within {:?}", timeout),
            ))
        }
        Ok(Err(e)) => {
            return Err(ServiceFailure::new(
                base_url,
                FailureKind::Transport,
                e.to_string(),
            ))
        }
        Ok(Ok(response)) => response,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(ServiceFailure::new(
            base_url,
            FailureKind::Http {
                status: status.as_u16(),
            },
            format!("count endpoint returned HTTP {}", status),
        ));
    }

    let body = match tokio::time::timeout(timeout, response.text()).await {
        Err(_) => {
            return Err(ServiceFailure::new(
                base_url,
                FailureKind::Timeout,
                "count body read timed out",
            ))
        }
        Ok(Err(e)) => {
            return Err(ServiceFailure::new(
                base_url,
                FailureKind::Transport,
                e.to_string(),
            ))
        }
        Ok(Ok(body)) => body,
    };

    body.trim().parse::<u64>().map_err(|_| {
        ServiceFailure::new(
            base_url,
            FailureKind::MalformedCount,
            format!("expected an integer count, got '{}'", body.trim()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn executor() -> CountExecutor {
        CountExecutor::new(reqwest::Client::new(), 5, Duration::from_secs(5))
    }

    fn endpoint(server: &MockServer, name: &str, path: &str) -> ServiceEndpoint {
        ServiceEndpoint::new(name, server.url(path))
    }

    #[tokio::test]
    async fn test_count_across_reports_every_target() {
        let server = MockServer::start();
        let hit = server.mock(|when, then| {
            when.method(GET).path("/svc-a/query/brca1");
            then.status(200).body("5");
        });
        let miss = server.mock(|when, then| {
            when.method(GET).path("/svc-b/query/brca1");
            then.status(200).body("0");
        });

        let targets = vec![
            endpoint(&server, "svc-a", "/svc-a"),
            endpoint(&server, "svc-b", "/svc-b"),
        ];
        let report = executor()
            .count_across(
                &Query::Miql("brca1".to_string()),
                &targets,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        hit.assert();
        miss.assert();
        assert_eq!(report.entry_count(), 2);
        assert_eq!(report.counts[&targets[0].url], 5);
        assert_eq!(report.counts[&targets[1].url], 0);
        assert!(!report.canceled);
        assert_eq!(report.targets_with_hits(), vec![targets[0].url.clone()]);
    }

    #[tokio::test]
    async fn test_single_failure_does_not_abort_siblings() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/ok/query/brca1");
            then.status(200).body("12");
        });
        server.mock(|when, then| {
            when.method(GET).path("/http-error/query/brca1");
            then.status(500);
        });
        server.mock(|when, then| {
            when.method(GET).path("/garbled/query/brca1");
            then.status(200).body("not-a-number");
        });

        let targets = vec![
            endpoint(&server, "ok", "/ok"),
            endpoint(&server, "http-error", "/http-error"),
            endpoint(&server, "garbled", "/garbled"),
        ];
        let report = executor()
            .count_across(
                &Query::Miql("brca1".to_string()),
                &targets,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.entry_count(), 3);
        assert_eq!(report.counts.len(), 1);
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(
            report.failures[&targets[1].url].kind,
            FailureKind::Http { status: 500 }
        ));
        assert!(matches!(
            report.failures[&targets[2].url].kind,
            FailureKind::MalformedCount
        ));
    }

    #[tokio::test]
    async fn test_empty_target_set_is_fatal() {
        let result = executor()
            .count_across(
                &Query::Miql("brca1".to_string()),
                &[],
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(PsicquicError::EmptyTargetSet)));
    }

    #[tokio::test]
    async fn test_invalid_query_is_fatal_before_dispatch() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path_contains("/query/");
            then.status(200).body("1");
        });

        let targets = vec![endpoint(&server, "svc", "/svc")];
        let result = executor()
            .count_across(
                &Query::Miql("   ".to_string()),
                &targets,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(PsicquicError::InvalidQuery { .. })));
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn test_cancellation_prevents_dispatch() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path_contains("/query/");
            then.status(200).body("7");
        });

        let cancel = CancellationToken::new();
        cancel.cancel();

        let targets = vec![
            endpoint(&server, "svc-a", "/svc-a"),
            endpoint(&server, "svc-b", "/svc-b"),
        ];
        let report = executor()
            .count_across(&Query::Miql("brca1".to_string()), &targets, &cancel)
            .await
            .unwrap();

        mock.assert_hits(0);
        assert!(report.canceled);
        assert_eq!(report.counts.len(), 0);
        // Entry-per-target still holds on the cancel path.
        assert_eq!(report.entry_count(), 2);
        assert!(report
            .failures
            .values()
            .all(|f| f.kind == FailureKind::Canceled));
    }
}
