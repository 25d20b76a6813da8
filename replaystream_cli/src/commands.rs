//! Command implementations
//!
//! Every input is produced on a pipe bridge worker, so reading the file (or
//! stdin) happens off the calling thread.

use anyhow::{Context, Result};
use colored::Colorize;
use replaystream_core::{
    ByteSink, ByteSource, Error as StreamError, MarkLimit, MarkerConfig, MarkerExtractor,
    PipeBridge, PipeConfig, ReplayBuffer, StatsProbe, StatsRegistry, StreamConfig, TeeConfig,
    TeeDuplicator, WriterSink, pump,
};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Output format of `probe` and `config show`
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Toml,
}

/// Open `input` (`-` for stdin) through a pipe bridge
pub fn open_input(input: &Path, config: &PipeConfig) -> Result<PipeBridge<u64>> {
    let bridge = if input == Path::new("-") {
        PipeBridge::from_reader(config, std::io::stdin())
    } else {
        let file =
            File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
        PipeBridge::from_reader(config, file)
    };
    bridge.context("Failed to start input producer")
}

/// Sink for `output`, stdout when absent
pub fn open_output(output: Option<&Path>) -> Result<Box<dyn ByteSink>> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Ok(Box::new(WriterSink::new(BufWriter::new(file))))
        }
        None => Ok(Box::new(WriterSink::new(std::io::stdout()))),
    }
}

/// Close the bridge and surface a producer failure
///
/// With `stopped_early` the consumer closed the pipe before end-of-data, so a
/// producer failing on the broken pipe is the expected cancellation.
fn finish_input(pipe: &mut PipeBridge<u64>, stopped_early: bool) -> Result<Option<u64>> {
    pipe.close().context("Failed to close input")?;
    match pipe.result() {
        Ok(read) => Ok(Some(read)),
        Err(StreamError::Producer(e))
            if stopped_early && e.cause().is_some_and(StreamError::is_broken_pipe) =>
        {
            log::debug!("Input producer cancelled after early stop");
            Ok(None)
        }
        Err(e) => Err(e).context("Failed to read input"),
    }
}

/// Write the regions between markers to `output`
pub fn extract_command(
    input: &Path,
    output: Option<&Path>,
    markers: &MarkerConfig,
    config: &StreamConfig,
) -> Result<u64> {
    log::debug!(
        "Extracting {:?}..{:?} from {}",
        markers.start,
        markers.stop,
        input.display()
    );

    let mut pipe = open_input(input, &config.pipe)?;
    let mut sink = open_output(output)?;

    let (copied, stopped_early) = {
        let mut extractor = MarkerExtractor::from_config(&mut pipe, markers)?;
        let copied = pump(&mut extractor, &mut sink, config.pipe.chunk_size)
            .context("Failed to extract regions")?;
        (copied, extractor.is_done())
    };
    sink.close().context("Failed to close output")?;

    match finish_input(&mut pipe, stopped_early)? {
        Some(read) => log::debug!("Extracted {copied} of {read} bytes"),
        None => log::debug!("Extracted {copied} bytes, input cancelled after the last region"),
    }
    Ok(copied)
}

/// Copy `input` to stdout and to every file in `outputs`
pub fn tee_command(
    input: &Path,
    outputs: &[PathBuf],
    keep_open: bool,
    config: &StreamConfig,
) -> Result<u64> {
    let mut pipe = open_input(input, &config.pipe)?;

    let mut sinks = Vec::with_capacity(outputs.len());
    for path in outputs {
        sinks.push(open_output(Some(path))?);
    }
    let tee_config = TeeConfig {
        close_sinks: config.tee.close_sinks && !keep_open,
        ..config.tee.clone()
    };

    let mut stdout = WriterSink::new(std::io::stdout());
    let copied = {
        let mut tee = TeeDuplicator::new(&mut pipe, sinks, &tee_config)?;
        let copied = pump(&mut tee, &mut stdout, config.pipe.chunk_size)
            .context("Failed to duplicate input")?;
        tee.close().context("Failed to close outputs")?;
        copied
    };
    stdout.close().context("Failed to flush stdout")?;

    finish_input(&mut pipe, false)?;
    log::debug!("Duplicated {copied} bytes to {} outputs", outputs.len());
    Ok(copied)
}

/// Measurements printed by `probe`
#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub input: String,
    pub bytes: u64,
    pub reads: u64,
    pub passes: u32,
    pub elapsed_ms: f64,
    pub throughput_bytes_per_sec: f64,
    pub spilled: bool,
}

fn read_through<S: ByteSource>(source: &mut S, chunk_size: usize) -> Result<u64> {
    let mut buf = vec![0u8; chunk_size];
    let mut total = 0u64;
    loop {
        let n = source.read(&mut buf)?;
        if n == 0 {
            return Ok(total);
        }
        total += n as u64;
    }
}

/// Read `input` through a stats probe, optionally twice via a replay buffer
pub fn probe_command(input: &Path, replay: bool, config: &StreamConfig) -> Result<ProbeReport> {
    let mut pipe = open_input(input, &config.pipe)?;
    let chunk_size = config.pipe.chunk_size;

    let (snapshot, passes, spilled) = if replay {
        let buffer = ReplayBuffer::new(&mut pipe, &config.replay)?;
        let mut probe = StatsProbe::new(buffer);
        probe.mark(MarkLimit::Unlimited)?;
        let first = read_through(&mut probe, chunk_size).context("First pass failed")?;
        let spilled = probe.get_ref().is_spilled();
        probe.reset()?;
        let second = read_through(&mut probe, chunk_size).context("Replay pass failed")?;
        anyhow::ensure!(
            first == second,
            "Replay returned {second} bytes, first pass read {first}"
        );
        let snapshot = probe.snapshot();
        probe.close()?;
        (snapshot, 2, spilled)
    } else {
        let mut probe = StatsProbe::new(&mut pipe);
        read_through(&mut probe, chunk_size).context("Failed to read input")?;
        (probe.snapshot(), 1, false)
    };

    finish_input(&mut pipe, false)?;
    log::debug!("{}", StatsRegistry::global().summary().trim_end());

    Ok(ProbeReport {
        input: input.display().to_string(),
        bytes: snapshot.bytes,
        reads: snapshot.reads,
        passes,
        elapsed_ms: snapshot.elapsed.as_secs_f64() * 1000.0,
        throughput_bytes_per_sec: snapshot.throughput(),
        spilled,
    })
}

/// Render a probe report
pub fn render_probe(report: &ProbeReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Toml => Ok(toml::to_string_pretty(report)?),
        OutputFormat::Text => Ok(format!(
            "{} {}\n{} {} bytes in {} reads ({} pass{})\n{} {:.3} ms\n{} {:.2} MB/s{}",
            "Input:".bold(),
            report.input,
            "Size:".bold(),
            report.bytes,
            report.reads,
            report.passes,
            if report.passes == 1 { "" } else { "es" },
            "Time:".bold(),
            report.elapsed_ms,
            "Throughput:".bold(),
            report.throughput_bytes_per_sec / (1024.0 * 1024.0),
            if report.spilled {
                format!("\n{}", "Replay cache spilled to disk".yellow())
            } else {
                String::new()
            }
        )),
    }
}
