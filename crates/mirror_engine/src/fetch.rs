use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use mirror_logging::{mirror_debug, mirror_info};
use reqwest::header::CONTENT_TYPE;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::persist::{PersistError, StagedFile};
use crate::rate::{throttle, RateLimiter};
use crate::{EngineEvent, FailureKind, FetchError, FetchResult, JobId, JobProgress, Stage};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    /// Whole-request limit; `None` lets slow, rate-limited transfers run to completion.
    pub request_timeout: Option<Duration>,
    pub redirect_limit: usize,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
            redirect_limit: 10,
            user_agent: format!("rwget/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelProgressSink {
    tx: std::sync::mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: std::sync::mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Sink for callers that only want the final report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn emit(&self, _event: EngineEvent) {}
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and stream its body into `destination`, replacing any existing file.
    async fn fetch(
        &self,
        job_id: JobId,
        url: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    limiter: Option<Arc<RateLimiter>>,
}

impl ReqwestFetcher {
    pub fn new(
        settings: &FetchSettings,
        limiter: Option<Arc<RateLimiter>>,
    ) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .user_agent(settings.user_agent.clone());
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { client, limiter })
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(
        &self,
        job_id: JobId,
        url: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, FetchError> {
        if url.trim().is_empty() {
            return Ok(FetchResult {
                url: String::new(),
                final_url: String::new(),
                path: destination.to_path_buf(),
                bytes_written: 0,
                total_bytes: None,
                content_type: None,
            });
        }

        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;

        mirror_debug!("job {} sending request to {}", job_id, url);
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let final_url = response.url().to_string();
        let total_bytes = response.content_length();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let staged = StagedFile::create(destination).map_err(filesystem_error)?;
        let file = staged.async_file().map_err(filesystem_error)?;
        let mut writer = BufWriter::new(file);

        sink.emit(EngineEvent::Progress(JobProgress {
            job_id,
            stage: Stage::Downloading,
            bytes: 0,
            total_bytes,
        }));

        let mut bytes_written = 0u64;
        let mut stream = std::pin::pin!(throttle(response.bytes_stream(), self.limiter.clone()));
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            writer.write_all(&chunk).await.map_err(io_error)?;
            bytes_written += chunk.len() as u64;
            sink.emit(EngineEvent::Progress(JobProgress {
                job_id,
                stage: Stage::Downloading,
                bytes: bytes_written,
                total_bytes,
            }));
        }
        writer.flush().await.map_err(io_error)?;
        drop(writer);

        let path = staged.commit().map_err(filesystem_error)?;
        mirror_info!("job {} saved {} ({} bytes)", job_id, path.display(), bytes_written);

        Ok(FetchResult {
            url: url.to_string(),
            final_url,
            path,
            bytes_written,
            total_bytes,
            content_type,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}

fn filesystem_error(err: PersistError) -> FetchError {
    FetchError::new(FailureKind::Filesystem, err.to_string())
}

fn io_error(err: std::io::Error) -> FetchError {
    FetchError::new(FailureKind::Filesystem, err.to_string())
}
