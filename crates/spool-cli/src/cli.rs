//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `spool`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "spool",
    version,
    about = "Simulate media documents flowing through the scheduling core.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to a config file (TOML). Without it, defaults plus `SPOOL_*`
    /// variables are used.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Documents to seed, each with the full five-stage pipeline.
    #[arg(long, default_value_t = 3)]
    pub documents: usize,

    /// Simulated workers.
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Chance that a work step fails.
    #[arg(long, default_value_t = 0.05)]
    pub failure_rate: f64,

    /// Chance that a work step hangs and the attempt goes silent.
    #[arg(long, default_value_t = 0.02)]
    pub stall_rate: f64,

    /// Duration of one simulated work step, in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub step_ms: u64,

    /// Override `worker_timeout_secs` so stalls are reclaimed quickly.
    #[arg(long, value_name = "SECS")]
    pub worker_timeout_secs: Option<u64>,

    /// Seed for the simulation's randomness.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Give up waiting for the pipeline after this many seconds.
    #[arg(long, default_value_t = 120)]
    pub deadline_secs: u64,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SPOOL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::parse_from(["spool"]);
        assert_eq!(args.documents, 3);
        assert_eq!(args.workers, 4);
        assert!(args.config.is_none());
        assert!(args.log_level.is_none());
    }

    #[test]
    fn flags() {
        let args = CliArgs::parse_from([
            "spool",
            "--documents",
            "1",
            "--worker-timeout-secs",
            "2",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.documents, 1);
        assert_eq!(args.worker_timeout_secs, Some(2));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}
