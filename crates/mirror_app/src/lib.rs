//! `rwget`: command-line front end over the mirror engine.
mod app;
mod cli;
mod console;
mod effects;
pub mod logging;

pub use app::{execute, run, RunStatus, BACKGROUND_LOG};
pub use cli::{Cli, Mode, RunPlan};
