use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// First body bytes are about to arrive for a job.
    StartBar {
        job_id: crate::JobId,
        url: String,
        total_bytes: Option<u64>,
    },
    AdvanceBar { job_id: crate::JobId, bytes: u64 },
    /// The job reached a terminal state; `saved_to` is set when a file was written.
    FinishBar {
        job_id: crate::JobId,
        saved_to: Option<PathBuf>,
    },
    ReportFailure {
        url: String,
        category: String,
        message: String,
    },
}
