//! User-facing output: progress bars on a terminal, plain lines in background mode.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use mirror_core::JobId;

const BAR_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})";
const SPINNER_TEMPLATE: &str = "{spinner} {msg} {bytes} ({bytes_per_sec})";

pub struct Console {
    bars: MultiProgress,
    active: Mutex<HashMap<JobId, ProgressBar>>,
    log: Option<Mutex<File>>,
}

impl Console {
    pub fn terminal() -> Self {
        Self {
            bars: MultiProgress::new(),
            active: Mutex::new(HashMap::new()),
            log: None,
        }
    }

    /// Append every line to `path`; nothing is drawn.
    pub fn background(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            bars: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            active: Mutex::new(HashMap::new()),
            log: Some(Mutex::new(file)),
        })
    }

    pub fn line(&self, line: &str) {
        match &self.log {
            Some(file) => {
                let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
                let _ = writeln!(file, "{line}");
            }
            None => self.bars.suspend(|| println!("{line}")),
        }
    }

    pub fn start_bar(&self, job_id: JobId, url: &str, total_bytes: Option<u64>) {
        if self.log.is_some() {
            return;
        }
        let bar = match total_bytes {
            Some(total) => styled(ProgressBar::new(total), BAR_TEMPLATE),
            None => styled(ProgressBar::new_spinner(), SPINNER_TEMPLATE),
        };
        bar.set_message(url.to_string());
        let bar = self.bars.add(bar);
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id, bar);
    }

    pub fn advance_bar(&self, job_id: JobId, bytes: u64) {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = active.get(&job_id) {
            bar.set_position(bytes);
        }
    }

    pub fn finish_bar(&self, job_id: JobId) {
        let bar = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
        if let Some(bar) = bar {
            bar.finish_and_clear();
            self.bars.remove(&bar);
        }
    }
}

fn styled(bar: ProgressBar, template: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    bar.with_style(style)
}
