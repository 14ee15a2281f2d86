use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mirror_core::{update, AppState, Effect, JobResultKind, Msg, Stage};
use mirror_engine::{EngineEvent, Extraction};
use mirror_logging::mirror_debug;

use crate::console::Console;

/// Folds engine events into display state on a dedicated thread until every
/// sender is gone, then hands back the final state.
pub fn spawn_event_loop(
    events: mpsc::Receiver<EngineEvent>,
    console: Arc<Console>,
) -> JoinHandle<AppState> {
    thread::spawn(move || {
        let mut state = AppState::new();
        for event in events {
            let (next, effects) = update(state, map_event(event));
            state = next;
            for effect in effects {
                run_effect(&console, effect);
            }
        }
        state
    })
}

fn map_event(event: EngineEvent) -> Msg {
    match event {
        EngineEvent::Claimed {
            job_id,
            url,
            destination,
        } => Msg::JobClaimed {
            job_id,
            url,
            destination,
        },
        EngineEvent::Progress(progress) => Msg::JobProgress {
            job_id: progress.job_id,
            stage: map_stage(progress.stage),
            bytes: progress.bytes,
            total_bytes: progress.total_bytes,
        },
        EngineEvent::JobCompleted { job_id, result, .. } => Msg::JobDone {
            job_id,
            result: match result {
                Ok(outcome) => match outcome.extraction {
                    Extraction::Failed { message } => JobResultKind::ExtractionFailed {
                        bytes: outcome.fetch.bytes_written,
                        message,
                    },
                    Extraction::NotApplicable | Extraction::Extracted { .. } => {
                        JobResultKind::Saved {
                            bytes: outcome.fetch.bytes_written,
                        }
                    }
                },
                Err(error) => JobResultKind::FetchFailed {
                    category: error.kind.category().to_string(),
                    message: error.message,
                },
            },
        },
    }
}

fn map_stage(stage: mirror_engine::Stage) -> Stage {
    match stage {
        mirror_engine::Stage::Downloading => Stage::Downloading,
        mirror_engine::Stage::Extracting => Stage::Extracting,
    }
}

fn run_effect(console: &Console, effect: Effect) {
    match effect {
        Effect::StartBar {
            job_id,
            url,
            total_bytes,
        } => console.start_bar(job_id, &url, total_bytes),
        Effect::AdvanceBar { job_id, bytes } => console.advance_bar(job_id, bytes),
        Effect::FinishBar { job_id, saved_to } => {
            console.finish_bar(job_id);
            if let Some(path) = saved_to {
                console.line(&format!("saving file to: {}", path.display()));
            }
        }
        Effect::ReportFailure {
            url,
            category,
            message,
        } => {
            mirror_debug!("reporting failure for {}", url);
            console.line(&format_failure(&url, &category, &message));
        }
    }
}

pub fn format_failure(url: &str, category: &str, message: &str) -> String {
    format!("{url}: {category}: {message}")
}
