//! # picseq probe
//!
//! Reads an IVF file, splits every access unit into its coded frames and
//! reports the layout. With `--decode` the units are also driven through a
//! sequencer backed by the null backend.

mod ivf;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use picseq_core::superframe::split_superframe;
use picseq_core::{
    AccessUnit, FrameHeader, FrameType, NullBackend, ParseError, Sequencer, SequencerConfig,
    SequencerStats,
};

use crate::ivf::IvfReader;

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct ProbeOptions {
    input: PathBuf,
    limit: Option<u64>,
    json: bool,
    decode: bool,
    config: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<ProbeOptions> {
    let mut input: Option<PathBuf> = None;
    let mut limit: Option<u64> = None;
    let mut json = false;
    let mut decode = false;
    let mut config: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--input" | "-i" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --input"))?;
                input = Some(PathBuf::from(value));
                i += 2;
            }
            "--limit" | "-n" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --limit"))?;
                limit = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid --limit value: {}", value))?,
                );
                i += 2;
            }
            "--config" | "-c" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --config"))?;
                config = Some(PathBuf::from(value));
                i += 2;
            }
            "--json" => {
                json = true;
                i += 1;
            }
            "--decode" => {
                decode = true;
                i += 1;
            }
            other if input.is_none() && !other.starts_with('-') => {
                input = Some(PathBuf::from(other));
                i += 1;
            }
            other => {
                return Err(anyhow::anyhow!("Unknown argument: {}", other));
            }
        }
    }

    let input = input.ok_or_else(|| {
        anyhow::anyhow!("Usage: picseq-probe --input <file.ivf> [--limit N] [--json] [--decode] [--config <file.json>]")
    })?;

    Ok(ProbeOptions {
        input,
        limit,
        json,
        decode,
        config,
    })
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Default, Serialize)]
struct ProbeReport {
    fourcc: String,
    width: u16,
    height: u16,
    access_units: u64,
    sub_frames: u64,
    superframes: u64,
    largest_superframe: usize,
    bytes: u64,
    decode_errors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequencer: Option<SequencerStats>,
}

/// Headers derived from the container alone: every frame is treated as an
/// independently decodable picture of the IVF frame size refreshing slot 0.
fn container_header_parser(
    width: u32,
    height: u32,
) -> impl Fn(&[u8]) -> Result<FrameHeader, ParseError> {
    move |data: &[u8]| {
        if data.is_empty() {
            return Err(ParseError::new("empty frame"));
        }
        Ok(FrameHeader {
            width,
            height,
            frame_type: FrameType::Key,
            refresh_frame_flags: 1,
            ..Default::default()
        })
    }
}

fn probe(options: &ProbeOptions) -> Result<ProbeReport> {
    let file = File::open(&options.input)
        .with_context(|| format!("Failed to open {:?}", options.input))?;
    let mut reader = IvfReader::new(BufReader::new(file))?;
    let header = reader.header().clone();

    tracing::info!(
        "{:?}: {} {}x{}, {} frames, timebase {}/{}",
        options.input,
        header.fourcc_str(),
        header.width,
        header.height,
        header.frame_count,
        header.scale,
        header.rate
    );

    let mut sequencer = if options.decode {
        let config = load_config(options.config.as_deref())?;
        let parser = container_header_parser(header.width as u32, header.height as u32);
        Some(Sequencer::new(NullBackend::new(), parser, config)?)
    } else {
        None
    };

    let mut report = ProbeReport {
        fourcc: header.fourcc_str(),
        width: header.width,
        height: header.height,
        ..Default::default()
    };

    while let Some(frame) = reader.next_frame()? {
        if options.limit.is_some_and(|limit| report.access_units >= limit) {
            break;
        }

        let sub_frames = split_superframe(&frame.data);
        report.access_units += 1;
        report.sub_frames += sub_frames.len() as u64;
        report.bytes += frame.data.len() as u64;
        if sub_frames.len() > 1 {
            report.superframes += 1;
            report.largest_superframe = report.largest_superframe.max(sub_frames.len());
        }

        tracing::debug!(
            "pts {}: {} bytes, sub-frames {:?}",
            frame.pts,
            frame.data.len(),
            sub_frames.iter().map(|f| f.size).collect::<Vec<_>>()
        );

        if let Some(seq) = sequencer.as_mut() {
            let unit = AccessUnit::new(frame.data.clone(), i64::try_from(frame.pts).ok());
            if seq.decode(&unit).is_err() {
                report.decode_errors += 1;
            }
            seq.backend_mut().take_output();
        }
    }

    if let Some(mut seq) = sequencer {
        report.sequencer = Some(seq.stop());
    }

    Ok(report)
}

fn load_config(path: Option<&Path>) -> Result<SequencerConfig> {
    match path {
        Some(path) => SequencerConfig::load(path)
            .with_context(|| format!("Failed to load sequencer config {:?}", path)),
        None => Ok(SequencerConfig::default()),
    }
}

fn print_report(report: &ProbeReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Codec:        {} {}x{}", report.fourcc, report.width, report.height);
    println!("Access units: {}", report.access_units);
    println!("Sub-frames:   {}", report.sub_frames);
    println!(
        "Superframes:  {} (largest {} frames)",
        report.superframes, report.largest_superframe
    );
    println!("Bytes:        {}", report.bytes);
    if let Some(stats) = &report.sequencer {
        println!(
            "Decoded:      {} ({} duplicated, {} hidden, {} skipped)",
            stats.decoded, stats.duplicated, stats.hidden, stats.skipped
        );
        println!("Sequences:    {}", stats.sequences);
        println!("Errors:       {}", report.decode_errors);
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("picseq=info".parse()?),
        )
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;
    let report = probe(&options)?;
    print_report(&report, options.json)
}
