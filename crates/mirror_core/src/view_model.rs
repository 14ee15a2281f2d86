use std::path::PathBuf;

use crate::{JobId, UrlState};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub jobs: Vec<JobRowView>,
    pub summary: SummaryView,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRowView {
    pub job_id: JobId,
    pub url: String,
    pub destination: PathBuf,
    pub state: UrlState,
    pub bytes: u64,
    pub total_bytes: Option<u64>,
    pub failure: Option<String>,
}

/// Counts shown in the end-of-session summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SummaryView {
    pub claimed: usize,
    pub in_flight: usize,
    pub saved: usize,
    pub fetch_failed: usize,
    pub extraction_failed: usize,
    pub bytes: u64,
}

impl SummaryView {
    pub(crate) fn from_rows(rows: &[JobRowView]) -> Self {
        rows.iter().fold(Self::default(), |mut summary, row| {
            summary.claimed += 1;
            match row.state {
                UrlState::Claimed | UrlState::Fetching => summary.in_flight += 1,
                UrlState::Extracted => summary.saved += 1,
                UrlState::ExtractionFailed => {
                    summary.saved += 1;
                    summary.extraction_failed += 1;
                }
                UrlState::FetchFailed => summary.fetch_failed += 1,
            }
            if matches!(row.state, UrlState::Extracted | UrlState::ExtractionFailed) {
                summary.bytes += row.bytes;
            }
            summary
        })
    }
}
