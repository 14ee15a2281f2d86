use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::view_model::{AppViewModel, JobRowView, SummaryView};

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Downloading,
    Extracting,
}

/// Lifecycle of one claimed URL. The last three states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlState {
    Claimed,
    Fetching,
    Extracted,
    FetchFailed,
    ExtractionFailed,
}

impl UrlState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UrlState::Extracted | UrlState::FetchFailed | UrlState::ExtractionFailed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResultKind {
    /// Fetched and, when it was a document, scanned for references.
    Saved { bytes: u64 },
    /// Fetched but its references could not be extracted.
    ExtractionFailed { bytes: u64, message: String },
    FetchFailed { category: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JobRow {
    pub(crate) url: String,
    pub(crate) destination: PathBuf,
    pub(crate) state: UrlState,
    pub(crate) bytes: u64,
    pub(crate) total_bytes: Option<u64>,
    pub(crate) failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    jobs: BTreeMap<JobId, JobRow>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> AppViewModel {
        let jobs: Vec<JobRowView> = self
            .jobs
            .iter()
            .map(|(job_id, row)| JobRowView {
                job_id: *job_id,
                url: row.url.clone(),
                destination: row.destination.clone(),
                state: row.state,
                bytes: row.bytes,
                total_bytes: row.total_bytes,
                failure: row.failure.clone(),
            })
            .collect();
        AppViewModel {
            summary: SummaryView::from_rows(&jobs),
            jobs,
        }
    }

    /// Every claimed row has reached a terminal state.
    pub fn is_settled(&self) -> bool {
        self.jobs.values().all(|row| row.state.is_terminal())
    }

    /// A repeated claim for the same job keeps the first row.
    pub(crate) fn claim(&mut self, job_id: JobId, url: String, destination: PathBuf) {
        self.jobs.entry(job_id).or_insert_with(|| JobRow {
            url,
            destination,
            state: UrlState::Claimed,
            bytes: 0,
            total_bytes: None,
            failure: None,
        });
    }

    pub(crate) fn row_mut(&mut self, job_id: JobId) -> Option<&mut JobRow> {
        let row = self.jobs.get_mut(&job_id)?;
        if row.state.is_terminal() {
            return None;
        }
        Some(row)
    }
}
