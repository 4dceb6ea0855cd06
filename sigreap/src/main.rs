//! `sigreap <program> [<args>...]`
//!
//! Runs as PID 1 (or any process-tree root) in a container or VM. Signal
//! forwarding and zombie reaping follow the same patterns as
//! [tini](https://github.com/krallin/tini), but liveness is decided by the
//! kernel's children listing rather than by the launched pid alone, so
//! daemonized grandchildren keep the supervisor alive.

use std::ffi::OsString;
use std::fmt;
use std::io::IsTerminal;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing::error;
use tracing_subscriber::fmt::time::FormatTime;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "sigreap",
    version,
    about = "Run a program as PID 1: forward signals, reap zombies"
)]
struct Cli {
    /// Program to run, searched on PATH
    #[arg(value_name = "PROGRAM")]
    program: OsString,

    /// Arguments for the program (passed through verbatim)
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<OsString>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_timer(Elapsed(Instant::now()))
        .init();

    let cli = Cli::parse();
    match sigreap::run(&cli.program, &cli.args) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX)),
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
