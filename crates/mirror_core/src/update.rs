use crate::{AppState, Effect, JobResultKind, Msg, Stage, UrlState};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::JobClaimed {
            job_id,
            url,
            destination,
        } => {
            state.claim(job_id, url, destination);
            Vec::new()
        }
        Msg::JobProgress {
            job_id,
            stage,
            bytes,
            total_bytes,
        } => {
            let Some(row) = state.row_mut(job_id) else {
                return (state, Vec::new());
            };
            let mut effects = Vec::new();
            if row.state == UrlState::Claimed {
                row.state = UrlState::Fetching;
                effects.push(Effect::StartBar {
                    job_id,
                    url: row.url.clone(),
                    total_bytes,
                });
            }
            if total_bytes.is_some() {
                row.total_bytes = total_bytes;
            }
            if stage == Stage::Downloading && bytes != row.bytes {
                row.bytes = bytes;
                effects.push(Effect::AdvanceBar { job_id, bytes });
            }
            effects
        }
        Msg::JobDone { job_id, result } => {
            let Some(row) = state.row_mut(job_id) else {
                return (state, Vec::new());
            };
            let had_bar = row.state == UrlState::Fetching;
            let mut effects = Vec::new();
            let saved_to = match result {
                JobResultKind::Saved { bytes } => {
                    row.state = UrlState::Extracted;
                    row.bytes = bytes;
                    Some(row.destination.clone())
                }
                JobResultKind::ExtractionFailed { bytes, message } => {
                    row.state = UrlState::ExtractionFailed;
                    row.bytes = bytes;
                    row.failure = Some(message);
                    Some(row.destination.clone())
                }
                JobResultKind::FetchFailed { category, message } => {
                    row.state = UrlState::FetchFailed;
                    row.failure = Some(message.clone());
                    effects.push(Effect::ReportFailure {
                        url: row.url.clone(),
                        category,
                        message,
                    });
                    None
                }
            };
            if had_bar || saved_to.is_some() {
                effects.insert(0, Effect::FinishBar { job_id, saved_to });
            }
            effects
        }
    };

    (state, effects)
}
