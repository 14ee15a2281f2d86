use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// A URL won its claim and was assigned a destination.
    JobClaimed {
        job_id: crate::JobId,
        url: String,
        destination: PathBuf,
    },
    /// Engine progress for a job.
    JobProgress {
        job_id: crate::JobId,
        stage: crate::Stage,
        bytes: u64,
        total_bytes: Option<u64>,
    },
    /// Engine completion for a job.
    JobDone {
        job_id: crate::JobId,
        result: crate::JobResultKind,
    },
}
