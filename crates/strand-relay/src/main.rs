use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use strand_relay::{AppError, Config, app};

#[derive(Parser, Debug)]
#[command(name = "strand-relay", version, about = "Multi-threaded TCP/UDP message relay and recorder")]
struct Args {
    /// Path to the TOML configuration file. Runs on built-in defaults
    /// when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn banner() {
    let profile = if cfg!(debug_assertions) { "debug" } else { "release" };
    eprintln!(
        "{} {} ({profile})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
}

fn main() -> ExitCode {
    let args = Args::parse();
    // The banner goes straight to stderr: the logger isn't up yet.
    banner();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(AppError::Config(err).exit_code() as u8);
        }
    };

    match app::run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fatal: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
