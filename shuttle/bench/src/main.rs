//! Shuttle Bench - Matrix Round-Trip Benchmark
//!
//! Ships a matrix to a forked worker over each transport, has it squared,
//! and reports how long the round trips took.
//!
//! # Usage
//!
//! ```bash
//! # All transports, edge 4, 100 round trips
//! shuttle-bench
//!
//! # Shared memory only, several sizes, reproducible payload
//! shuttle-bench --transport shm --size 64 --size 1024 --seed 42
//!
//! # Small segment to force batching, JSON output
//! shuttle-bench --transport shm --segment-size 4096 --json
//!
//! # Verbose logging
//! RUST_LOG=debug shuttle-bench
//! ```

mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use shuttle_core::{
    default_config_path, load_config_from_path, ConfigOverrides, TransportType,
};
use tracing::info;

/// Transport selection on the command line
#[derive(Clone, Debug, PartialEq, Eq)]
enum TransportArg {
    One(TransportType),
    All,
}

impl std::str::FromStr for TransportArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse().map(Self::One)
    }
}

/// Shuttle Bench - time matrix round trips over pipe, shm and socket transports
#[derive(Parser, Debug)]
#[command(name = "shuttle-bench")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Transport to benchmark: pipe, shm, socket or all
    #[arg(short = 't', long, env = "SHUTTLE_TRANSPORT", value_name = "KIND")]
    transport: Option<TransportArg>,

    /// Matrix edge length (repeatable)
    #[arg(short = 's', long = "size", value_name = "EDGE")]
    sizes: Vec<usize>,

    /// Round trips per size
    #[arg(short = 'n', long)]
    iterations: Option<u32>,

    /// Seed for a reproducible payload
    #[arg(long)]
    seed: Option<u64>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "SHUTTLE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// TCP port for the socket transport (0 = any free port)
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Shared segment size in bytes, header included
    #[arg(long, value_name = "BYTES")]
    segment_size: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "SHUTTLE_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        match self.transport {
            Some(TransportArg::All) => {
                overrides = overrides.with_transports(TransportType::ALL.to_vec());
            }
            Some(TransportArg::One(t)) => overrides = overrides.with_transports(vec![t]),
            None => {}
        }
        if !self.sizes.is_empty() {
            overrides = overrides.with_sizes(self.sizes.clone());
        }
        if let Some(n) = self.iterations {
            overrides = overrides.with_iterations(n);
        }
        if let Some(seed) = self.seed {
            overrides = overrides.with_seed(seed);
        }
        if let Some(port) = self.port {
            overrides = overrides.with_port(port);
        }
        if let Some(size) = self.segment_size {
            overrides = overrides.with_segment_size(size);
        }
        overrides
    }
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so the report on stdout stays clean.
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("shuttle_bench={level},shuttle_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        source = %config.source(),
        transports = ?config.bench.transports,
        sizes = ?config.bench.sizes,
        iterations = config.bench.iterations,
        "Starting benchmark"
    );

    let report = runner::run(&config).context("Benchmark failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to encode report")?
        );
    } else {
        print!("{}", runner::format_text(&report));
    }

    if report.has_mismatches() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shuttle_core::ShuttleConfigFile;

    #[test]
    fn test_parse_transport_arg() {
        assert_eq!("all".parse::<TransportArg>().unwrap(), TransportArg::All);
        assert_eq!(
            "shm".parse::<TransportArg>().unwrap(),
            TransportArg::One(TransportType::SharedMemory)
        );
        assert!("smoke-signal".parse::<TransportArg>().is_err());
    }

    #[test]
    fn test_cli_flags_become_overrides() {
        let args = Args::try_parse_from([
            "shuttle-bench",
            "--transport",
            "socket",
            "--size",
            "2",
            "--size",
            "8",
            "--port",
            "0",
            "--segment-size",
            "1024",
        ])
        .unwrap();

        let mut config = ShuttleConfigFile::default();
        args.overrides().apply(&mut config);

        assert_eq!(config.bench.transports, vec![TransportType::Socket]);
        assert_eq!(config.bench.sizes, vec![2, 8]);
        assert_eq!(config.transport.socket.port, 0);
        assert_eq!(config.transport.shared_memory.segment_size, 1024);
    }

    #[test]
    fn test_no_flags_keep_config() {
        let args = Args::try_parse_from(["shuttle-bench", "--log-level", "debug"]).unwrap();
        let mut config = ShuttleConfigFile::default();
        args.overrides().apply(&mut config);

        assert_eq!(config.bench, ShuttleConfigFile::default().bench);
        assert_eq!(args.log_level, "debug");
    }

    #[test]
    fn test_explicit_config_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[bench]\niterations = 9\n").unwrap();

        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.bench.iterations, 9);
    }
}
