use std::path::PathBuf;

use clap::Parser;
use mirror_engine::{ConfigError, EngineConfig, ReferenceFilter};

use crate::app::BACKGROUND_LOG;

/// Download a single file, a list of files, or mirror a whole site.
#[derive(Parser, Debug, Clone)]
#[command(name = "rwget", author, version, about, long_about = None)]
pub struct Cli {
    /// URL to download (or the seed page with --mirror).
    #[arg(required_unless_present = "input_file")]
    pub url: Option<String>,

    /// Write all output to "wget-log" instead of the terminal.
    #[arg(short = 'B', long)]
    pub background: bool,

    /// File name for a single download.
    #[arg(short = 'O', long = "output", value_name = "NAME")]
    pub output: Option<String>,

    /// Directory files are saved under.
    #[arg(short = 'P', long = "directory-prefix", value_name = "DIR", default_value = "./")]
    pub directory_prefix: PathBuf,

    /// Throughput ceiling shared by all transfers, e.g. 400k or 2M.
    #[arg(long, value_name = "RATE")]
    pub rate_limit: Option<String>,

    /// Download every URL listed in FILE, one per line.
    #[arg(short = 'i', long = "input-file", value_name = "FILE")]
    pub input_file: Option<PathBuf>,

    /// Recursively download everything the page references.
    #[arg(long)]
    pub mirror: bool,

    /// Comma-separated file extensions to skip while mirroring.
    #[arg(short = 'R', long, value_name = "LIST")]
    pub reject: Option<String>,

    /// Comma-separated directories to skip while mirroring.
    #[arg(short = 'X', long, value_name = "LIST")]
    pub exclude: Option<String>,

    /// Maximum number of fetches in flight at once.
    #[arg(short = 'j', long, default_value_t = 8)]
    pub jobs: usize,

    /// Log debug details.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Single { url: String, file_name: Option<String> },
    Batch { list: PathBuf },
    Mirror { url: String },
}

#[derive(Debug, Clone)]
pub struct RunPlan {
    pub mode: Mode,
    pub config: EngineConfig,
    /// Where output goes in background mode; `None` means the terminal.
    pub background_log: Option<PathBuf>,
    pub verbose: bool,
}

impl Cli {
    /// Resolve flags into a run plan; the input file wins over `--mirror`.
    pub fn plan(&self) -> Result<RunPlan, ConfigError> {
        let prefix = self.directory_prefix.clone();
        let url = self.url.clone().unwrap_or_default();

        let (mode, config) = match &self.input_file {
            Some(list) => (Mode::Batch { list: list.clone() }, EngineConfig::flat(prefix)),
            None if self.mirror => {
                let filters =
                    ReferenceFilter::parse(self.reject.as_deref(), self.exclude.as_deref());
                (
                    Mode::Mirror { url },
                    EngineConfig::mirror(prefix).with_filters(filters),
                )
            }
            None => (
                Mode::Single {
                    url,
                    file_name: self.output.clone(),
                },
                EngineConfig::flat(prefix),
            ),
        };

        let config = config
            .with_rate_limit_str(self.rate_limit.as_deref())?
            .with_max_concurrent_fetches(self.jobs);

        Ok(RunPlan {
            mode,
            config,
            background_log: self.background.then(|| PathBuf::from(BACKGROUND_LOG)),
            verbose: self.verbose,
        })
    }
}
