use std::process::ExitCode;

use clap::Parser;
use mirror_app::{run, Cli, RunStatus};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(status) => status.exit_code(),
        Err(err) => {
            eprintln!("rwget: {err:#}");
            RunStatus::ConfigError.exit_code()
        }
    }
}
