use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::{mpsc, Arc};

use anyhow::Context;
use chrono::Local;
use mirror_core::SummaryView;
use mirror_engine::{read_url_list, ChannelProgressSink, DownloadRequest, MirrorSession};
use mirror_logging::{mirror_error, mirror_info, mirror_warn};

use crate::cli::{Cli, Mode, RunPlan};
use crate::console::Console;
use crate::effects::{format_failure, spawn_event_loop};
use crate::logging::{self, LogDestination};

/// File that receives all output with `--background`.
pub const BACKGROUND_LOG: &str = "wget-log";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How a run ended, mapped onto the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    FetchFailures,
    ConfigError,
}

impl RunStatus {
    pub fn code(self) -> u8 {
        match self {
            RunStatus::Success => 0,
            RunStatus::FetchFailures => 1,
            RunStatus::ConfigError => 2,
        }
    }

    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

/// Entry point used by the binary: plan, set up logging, then execute.
pub async fn run(cli: Cli) -> anyhow::Result<RunStatus> {
    let plan = match cli.plan() {
        Ok(plan) => plan,
        Err(err) => {
            eprintln!("rwget: {err}");
            return Ok(RunStatus::ConfigError);
        }
    };

    let destination = match &plan.background_log {
        Some(path) => LogDestination::File(path.clone()),
        None => LogDestination::Terminal,
    };
    logging::initialize(destination, plan.verbose);

    execute(plan).await
}

/// Run a prepared plan to completion. Logging is left to the caller.
pub async fn execute(plan: RunPlan) -> anyhow::Result<RunStatus> {
    if let Err(err) = plan.config.prepare() {
        eprintln!("rwget: {err}");
        return Ok(RunStatus::ConfigError);
    }

    let console = match &plan.background_log {
        Some(path) => {
            println!("Output will be written to \"{}\".", path.display());
            Console::background(path)
                .with_context(|| format!("opening {}", path.display()))?
        }
        None => Console::terminal(),
    };
    let console = Arc::new(console);

    let requests = match &plan.mode {
        Mode::Batch { list } => Some(
            read_url_list(list).with_context(|| format!("reading {}", list.display()))?,
        ),
        Mode::Single { url, file_name } => {
            Some(vec![DownloadRequest::new(url.clone()).with_file_name(file_name.clone())])
        }
        Mode::Mirror { .. } => None,
    };

    console.line(&format!("start at {}", Local::now().format(TIME_FORMAT)));

    let (tx, rx) = mpsc::channel();
    let event_loop = spawn_event_loop(rx, Arc::clone(&console));
    let session =
        MirrorSession::with_reqwest(plan.config, Arc::new(ChannelProgressSink::new(tx)))?;

    let token = session.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            mirror_warn!("interrupted, cancelling outstanding downloads");
            token.cancel();
        }
    });

    let report = match (&plan.mode, requests) {
        (Mode::Mirror { url }, _) => session.mirror(url).await,
        (_, requests) => session.download_all(requests.unwrap_or_default()).await,
    };
    interrupt.abort();

    let state = event_loop.join().map_err(|_| {
        mirror_error!("progress display thread panicked");
        anyhow::anyhow!("progress display thread panicked")
    })?;

    if !state.is_settled() {
        mirror_warn!("some claimed downloads never reported completion");
    }
    let view = state.view();

    // Failures that never reached a claim (unparseable URLs) have no row to report them.
    let reported: HashSet<&str> = view.jobs.iter().map(|row| row.url.as_str()).collect();
    let unclaimed: Vec<_> = report
        .failures
        .iter()
        .filter(|failure| !reported.contains(failure.url.as_str()))
        .collect();
    for failure in &unclaimed {
        console.line(&format_failure(
            &failure.url,
            failure.error.kind.category(),
            &failure.error.message,
        ));
    }

    let summary = summary_line(&view.summary, unclaimed.len());
    console.line(&summary);
    console.line(&format!("finished at {}", Local::now().format(TIME_FORMAT)));
    mirror_info!("{}", summary);

    Ok(if report.has_failures() {
        RunStatus::FetchFailures
    } else {
        RunStatus::Success
    })
}

fn summary_line(summary: &SummaryView, unclaimed_failures: usize) -> String {
    format!(
        "Downloaded {} file(s), {} bytes, {} failure(s)",
        summary.saved,
        summary.bytes,
        summary.fetch_failed + unclaimed_failures
    )
}
