use std::fmt;
use std::path::PathBuf;

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Downloading,
    Extracting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProgress {
    pub job_id: JobId,
    pub stage: Stage,
    pub bytes: u64,
    /// Declared `Content-Length`, when the server sent one.
    pub total_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Claimed {
        job_id: JobId,
        url: String,
        destination: PathBuf,
    },
    Progress(JobProgress),
    JobCompleted {
        job_id: JobId,
        url: String,
        result: Result<JobOutcome, FetchError>,
    },
}

/// Outcome of one Single-Resource Fetcher invocation that succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub url: String,
    pub final_url: String,
    pub path: PathBuf,
    pub bytes_written: u64,
    pub total_bytes: Option<u64>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Content type is neither HTML nor CSS, or the session does not recurse.
    NotApplicable,
    Extracted { references: usize, scheduled: usize },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub fetch: FetchResult,
    pub extraction: Extraction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    Network,
    Filesystem,
    Cancelled,
}

impl FailureKind {
    /// Error family used when reporting failures to the operator.
    pub fn category(&self) -> &'static str {
        match self {
            FailureKind::InvalidUrl
            | FailureKind::Timeout
            | FailureKind::RedirectLimitExceeded
            | FailureKind::Network => "transport error",
            FailureKind::HttpStatus(_) => "http status error",
            FailureKind::Filesystem => "filesystem error",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Filesystem => write!(f, "filesystem error"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFetch {
    pub url: String,
    pub error: FetchError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionFailure {
    pub url: String,
    pub message: String,
}

/// Aggregated result of a whole session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub fetched: Vec<FetchResult>,
    pub failures: Vec<FailedFetch>,
    pub extraction_failures: Vec<ExtractionFailure>,
}

impl SessionReport {
    pub fn fetched_count(&self) -> usize {
        self.fetched.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.fetched.iter().map(|f| f.bytes_written).sum()
    }

    pub fn fetched_urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = self.fetched.iter().map(|f| f.url.as_str()).collect();
        urls.sort_unstable();
        urls
    }

    /// Orders entries by URL so reports compare equal regardless of completion order.
    pub(crate) fn sort(&mut self) {
        self.fetched.sort_by(|a, b| a.url.cmp(&b.url));
        self.failures.sort_by(|a, b| a.url.cmp(&b.url));
        self.extraction_failures.sort_by(|a, b| a.url.cmp(&b.url));
    }
}
