//! Benchmark Runner
//!
//! Times round trips for each configured transport and size, validating every
//! reply against the reference transform.

use std::time::{Duration, Instant};

use serde::Serialize;
use shuttle_core::matrix::payload_len;
use shuttle_core::transport::create_transport;
use shuttle_core::{payload, ShuttleConfigFile, TransportError, TransportType};
use tracing::{debug, info, warn};

/// Timing for one transport at one matrix size
#[derive(Clone, Debug, Serialize)]
pub struct Measurement {
    /// Transport name as reported by the transport
    pub transport: String,
    /// Matrix edge length
    pub edge: usize,
    /// Round trips timed
    pub iterations: u32,
    /// Wall time across all round trips
    pub seconds: f64,
    /// Bytes moved in both directions
    pub bytes: u64,
    /// Throughput in MB/s (10^6 bytes)
    pub mb_per_sec: f64,
    /// Replies outside tolerance
    pub mismatches: u32,
}

impl Measurement {
    fn new(transport: &str, edge: usize, iterations: u32, elapsed: Duration, mismatches: u32) -> Self {
        let bytes = 2 * payload_len(edge) as u64 * u64::from(iterations);
        let seconds = elapsed.as_secs_f64();
        let mb_per_sec = if seconds > 0.0 {
            bytes as f64 / 1_000_000.0 / seconds
        } else {
            0.0
        };
        Self {
            transport: transport.to_string(),
            edge,
            iterations,
            seconds,
            bytes,
            mb_per_sec,
            mismatches,
        }
    }
}

/// Everything one run produced
#[derive(Clone, Debug, Default, Serialize)]
pub struct BenchReport {
    /// One entry per transport and size
    pub measurements: Vec<Measurement>,
    /// Seed used for payloads, if reproducible
    pub seed: Option<u64>,
}

impl BenchReport {
    /// Whether any reply failed validation
    pub fn has_mismatches(&self) -> bool {
        self.measurements.iter().any(|m| m.mismatches > 0)
    }
}

/// Run every configured transport over every configured size
pub fn run(config: &ShuttleConfigFile) -> Result<BenchReport, TransportError> {
    let mut report = BenchReport {
        seed: config.bench.seed,
        ..Default::default()
    };

    for &transport in &config.bench.transports {
        report
            .measurements
            .extend(run_transport(config, transport)?);
    }
    Ok(report)
}

/// One session: start, time each size, end
fn run_transport(
    config: &ShuttleConfigFile,
    transport_type: TransportType,
) -> Result<Vec<Measurement>, TransportError> {
    let mut transport = create_transport(&config.transport_config(transport_type))?;
    transport.start_session()?;
    info!(transport = transport.name(), pid = ?transport.worker_pid(), "Benchmarking");

    let mut measurements = Vec::with_capacity(config.bench.sizes.len());
    for &edge in &config.bench.sizes {
        let request = match config.bench.seed {
            Some(seed) => payload::generate_seeded(edge, seed),
            None => payload::generate(edge),
        };
        let expected = payload::transform(&request);

        let mut mismatches = 0;
        let started = Instant::now();
        for _ in 0..config.bench.iterations {
            let reply = transport.request(&request)?;
            if !payload::approximately_equal(&reply, &expected) {
                mismatches += 1;
            }
        }
        let elapsed = started.elapsed();

        if mismatches > 0 {
            warn!(transport = transport.name(), edge, mismatches, "Replies outside tolerance");
        }
        debug!(transport = transport.name(), edge, ?elapsed, "Size complete");
        measurements.push(Measurement::new(
            transport.name(),
            edge,
            config.bench.iterations,
            elapsed,
            mismatches,
        ));
    }

    transport.end_session()?;
    Ok(measurements)
}

/// Render the report as plain text
pub fn format_text(report: &BenchReport) -> String {
    let mut out = String::new();
    for m in &report.measurements {
        let status = if m.mismatches == 0 { "ok" } else { "MISMATCH" };
        out.push_str(&format!(
            "{:<13} edge {:>5} x{:<6} took {:.6} seconds ({:.2} MB/s) [{status}]\n",
            m.transport, m.edge, m.iterations, m.seconds, m.mb_per_sec
        ));
    }
    out
}
