//! Mirror Orchestrator.
//!
//! Every claimed URL runs as its own task on a [`TaskTracker`]. A task fetches
//! its resource, extracts references from HTML/CSS and claims each new one,
//! spawning a sibling task per successful claim before it finishes. The
//! tracker is closed once the seeds are spawned, so `wait()` returns exactly
//! when the outstanding work drops to zero.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{BoxFuture, FutureExt};
use mirror_logging::{mirror_debug, mirror_info, mirror_warn};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use url::Url;

use crate::batch::DownloadRequest;
use crate::config::EngineConfig;
use crate::extract::{DocumentKind, ExtractionError, ReferenceExtractor};
use crate::fetch::{Fetcher, ProgressSink, ReqwestFetcher};
use crate::filename::{DestinationRegistry, OutputLayout};
use crate::filter::ReferenceFilter;
use crate::rate::RateLimiter;
use crate::visited::VisitedSet;
use crate::{
    EngineEvent, ExtractionFailure, Extraction, FailedFetch, FailureKind, FetchError, FetchResult,
    JobId, JobOutcome, JobProgress, SessionReport, Stage,
};

/// One recursive mirroring (or batch download) run.
pub struct MirrorSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn ProgressSink>,
    extractor: ReferenceExtractor,
    layout: OutputLayout,
    filters: ReferenceFilter,
    visited: VisitedSet,
    destinations: DestinationRegistry,
    permits: Semaphore,
    tracker: TaskTracker,
    cancel: CancellationToken,
    next_job_id: AtomicU64,
    report: Mutex<SessionReport>,
}

struct Job {
    id: JobId,
    url: Url,
    file_name: Option<String>,
    recurse: bool,
}

impl MirrorSession {
    pub fn new(
        config: EngineConfig,
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let inner = SessionInner {
            fetcher,
            sink,
            extractor: ReferenceExtractor::new(),
            layout: config.output,
            filters: config.filters,
            visited: VisitedSet::new(),
            destinations: DestinationRegistry::new(),
            permits: Semaphore::new(config.max_concurrent_fetches.max(1)),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            next_job_id: AtomicU64::new(1),
            report: Mutex::new(SessionReport::default()),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Session over the reqwest transport, sharing one rate limiter across all fetches.
    pub fn with_reqwest(
        config: EngineConfig,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Self, FetchError> {
        let limiter = config.rate_limit.map(|spec| Arc::new(RateLimiter::new(spec)));
        let fetcher = ReqwestFetcher::new(&config.fetch, limiter)?;
        Ok(Self::new(config, Arc::new(fetcher), sink))
    }

    /// Token that stops in-flight fetches and further claims when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Mirror everything reachable from `seed`. An empty seed is a no-op.
    pub async fn mirror(self, seed: &str) -> SessionReport {
        mirror_info!("mirroring from {}", seed);
        if !seed.trim().is_empty() {
            self.inner.schedule_root(seed, None, true);
        }
        self.finish().await
    }

    /// Download each request once, without following references.
    pub async fn download_all(self, requests: Vec<DownloadRequest>) -> SessionReport {
        mirror_info!("downloading {} url(s)", requests.len());
        for request in requests {
            if request.url.trim().is_empty() {
                continue;
            }
            self.inner
                .schedule_root(&request.url, request.file_name, false);
        }
        self.finish().await
    }

    async fn finish(self) -> SessionReport {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;

        let mut report = std::mem::take(
            &mut *self
                .inner
                .report
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        report.sort();
        mirror_info!(
            "session finished: {} fetched, {} failed, {} extraction error(s)",
            report.fetched_count(),
            report.failure_count(),
            report.extraction_failures.len()
        );
        report
    }
}

impl SessionInner {
    fn schedule_root(self: &Arc<Self>, raw: &str, file_name: Option<String>, recurse: bool) {
        let mut url = match Url::parse(raw.trim()) {
            Ok(url) => url,
            Err(err) => {
                mirror_warn!("skipping {}: {}", raw, err);
                self.record_failure(
                    raw,
                    FetchError::new(FailureKind::InvalidUrl, err.to_string()),
                );
                return;
            }
        };
        // Same claim key as discovered references, which never carry a fragment.
        url.set_fragment(None);
        if self.visited.try_claim(url.as_str()) {
            self.spawn_job(url, file_name, recurse);
        } else {
            mirror_debug!("{} already claimed", url);
        }
    }

    /// Claim a discovered reference; returns whether a new task was spawned.
    fn schedule_reference(self: &Arc<Self>, raw: &str) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let Ok(url) = Url::parse(raw) else {
            return false;
        };
        if !self.filters.allows(&url) {
            mirror_debug!("filtered out {}", url);
            return false;
        }
        if !self.visited.try_claim(url.as_str()) {
            return false;
        }
        self.spawn_job(url, None, true);
        true
    }

    fn spawn_job(self: &Arc<Self>, url: Url, file_name: Option<String>, recurse: bool) {
        let job = Job {
            id: self.next_job_id.fetch_add(1, Ordering::Relaxed),
            url,
            file_name,
            recurse,
        };
        mirror_debug!("job {} claimed {}", job.id, job.url);
        self.tracker.spawn(Arc::clone(self).run_job(job));
    }

    fn run_job(self: Arc<Self>, job: Job) -> BoxFuture<'static, ()> {
        async move {
            let url = job.url.to_string();
            let preferred = self.layout.destination_for(&job.url, job.file_name.as_deref());
            let destination = self.destinations.reserve(&url, preferred);
            self.sink.emit(EngineEvent::Claimed {
                job_id: job.id,
                url: url.clone(),
                destination: destination.clone(),
            });

            let result = match self.fetch(job.id, &url, destination).await {
                Ok(fetch) => {
                    let extraction = if job.recurse {
                        self.extract_and_schedule(job.id, &fetch).await
                    } else {
                        Extraction::NotApplicable
                    };
                    self.record_success(&fetch, &extraction);
                    Ok(JobOutcome { fetch, extraction })
                }
                Err(error) => {
                    mirror_warn!("job {} failed {}: {}", job.id, url, error);
                    self.record_failure(&url, error.clone());
                    Err(error)
                }
            };

            self.sink.emit(EngineEvent::JobCompleted {
                job_id: job.id,
                url,
                result,
            });
        }
        .boxed()
    }

    async fn fetch(
        &self,
        job_id: JobId,
        url: &str,
        destination: PathBuf,
    ) -> Result<FetchResult, FetchError> {
        let cancelled = || FetchError::new(FailureKind::Cancelled, "session cancelled");
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(cancelled()),
            result = async {
                let _permit = self.permits.acquire().await.map_err(|_| cancelled())?;
                self.fetcher
                    .fetch(job_id, url, &destination, self.sink.as_ref())
                    .await
            } => result,
        }
    }

    async fn extract_and_schedule(
        self: &Arc<Self>,
        job_id: JobId,
        fetch: &FetchResult,
    ) -> Extraction {
        let Some(kind) = DocumentKind::from_content_type(fetch.content_type.as_deref()) else {
            return Extraction::NotApplicable;
        };
        self.sink.emit(EngineEvent::Progress(JobProgress {
            job_id,
            stage: Stage::Extracting,
            bytes: fetch.bytes_written,
            total_bytes: fetch.total_bytes,
        }));

        match self.extract(kind, fetch).await {
            Ok(references) => {
                let scheduled = references
                    .iter()
                    .filter(|reference| self.schedule_reference(reference))
                    .count();
                mirror_debug!(
                    "job {} found {} reference(s), scheduled {}",
                    job_id,
                    references.len(),
                    scheduled
                );
                Extraction::Extracted {
                    references: references.len(),
                    scheduled,
                }
            }
            Err(err) => {
                mirror_warn!("job {} could not extract {}: {}", job_id, fetch.url, err);
                Extraction::Failed {
                    message: err.to_string(),
                }
            }
        }
    }

    /// Parsing is CPU-bound, so it runs on the blocking pool instead of a runtime worker.
    async fn extract(
        &self,
        kind: DocumentKind,
        fetch: &FetchResult,
    ) -> Result<Vec<String>, ExtractionError> {
        let bytes = tokio::fs::read(&fetch.path).await?;
        let extractor = self.extractor;
        let content_type = fetch.content_type.clone();
        let base_url = fetch.url.clone();
        tokio::task::spawn_blocking(move || {
            extractor.extract(kind, &bytes, content_type.as_deref(), &base_url)
        })
        .await
        .map_err(|err| ExtractionError::Worker(err.to_string()))?
    }

    fn record_success(&self, fetch: &FetchResult, extraction: &Extraction) {
        let mut report = self.report.lock().unwrap_or_else(PoisonError::into_inner);
        report.fetched.push(fetch.clone());
        if let Extraction::Failed { message } = extraction {
            report.extraction_failures.push(ExtractionFailure {
                url: fetch.url.clone(),
                message: message.clone(),
            });
        }
    }

    fn record_failure(&self, url: &str, error: FetchError) {
        let mut report = self.report.lock().unwrap_or_else(PoisonError::into_inner);
        report.failures.push(FailedFetch {
            url: url.to_string(),
            error,
        });
    }
}
