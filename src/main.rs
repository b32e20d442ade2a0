//! CLI entry point: write a synthetic capture as a session directory.
//!
//! Generates a counter pattern on the logic channels and a sine per analog
//! channel, then feeds them through `SrdirOutput` in bursts, the way a driver
//! would deliver them.
//!
//! # Usage
//!
//! ```bash
//! srdir-capture capture --logic 8 --analog 2 --samples 100000 --burst 4096
//! cd capture && zip -9 ../capture.sr *
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use srdir::config::SrdirConfig;
use srdir::{AnalogPayload, Channel, LogicPayload, Packet, SrdirOutput, StaticDevice};
use std::f32::consts::TAU;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "srdir-capture")]
#[command(about = "Write a synthetic acquisition as a session directory", long_about = None)]
struct Cli {
    /// Archive directory to create (must not exist)
    target: PathBuf,

    /// Number of logic channels
    #[arg(long, default_value_t = 8)]
    logic: usize,

    /// Number of analog channels
    #[arg(long, default_value_t = 1)]
    analog: usize,

    /// Global channel indices to disable, comma separated
    #[arg(long, value_delimiter = ',')]
    disabled: Vec<usize>,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 1_000_000)]
    samplerate: u64,

    /// Samples per channel
    #[arg(long, default_value_t = 100_000)]
    samples: usize,

    /// Samples per packet
    #[arg(long, default_value_t = 4096)]
    burst: usize,

    /// Optional configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SrdirConfig::load_from(path),
        None => SrdirConfig::load(),
    }
    .context("loading configuration")?;
    srdir::logging::init_from_config(&config)?;

    let channels = build_channels(&cli);
    let analog_indices: Vec<usize> = channels
        .iter()
        .filter(|ch| ch.enabled && ch.kind == srdir::ChannelKind::Analog)
        .map(|ch| ch.index)
        .collect();
    let device = StaticDevice::new(channels).with_sample_rate(cli.samplerate);
    let mut output = SrdirOutput::new(&cli.target, device, config.archive.clone())?;

    info!(path = %cli.target.display(), samples = cli.samples, "starting capture");

    let unit_size = cli.logic.div_ceil(8);
    output.receive(&Packet::Header)?;
    output.receive(&Packet::samplerate(cli.samplerate))?;

    let burst = cli.burst.max(1);
    let mut start = 0;
    while start < cli.samples {
        let end = (start + burst).min(cli.samples);

        if unit_size > 0 {
            let rows = logic_rows(start, end, unit_size);
            output
                .receive(&Packet::Logic(LogicPayload::new(unit_size, rows)))
                .with_context(|| format!("logic burst at sample {start}"))?;
        }
        for (n, &index) in analog_indices.iter().enumerate() {
            let values = sine(start, end, n, cli.samplerate);
            output
                .receive(&Packet::Analog(AnalogPayload::from_f32(index, &values)))
                .with_context(|| format!("analog burst at sample {start}"))?;
        }
        start = end;
    }

    output.receive(&Packet::End)?;
    let stats = output.close();
    info!(
        chunks = stats.chunks_written,
        bytes = stats.bytes_written,
        "capture complete"
    );
    println!(
        "Wrote {} chunks ({} bytes) to {}",
        stats.chunks_written,
        stats.bytes_written,
        cli.target.display()
    );
    Ok(())
}

fn build_channels(cli: &Cli) -> Vec<Channel> {
    let logic = (0..cli.logic).map(|i| Channel::logic(i, format!("D{i}")));
    let analog = (0..cli.analog).map(|i| Channel::analog(cli.logic + i, format!("A{i}")));
    logic
        .chain(analog)
        .map(|ch| {
            let enabled = !cli.disabled.contains(&ch.index);
            ch.enabled(enabled)
        })
        .collect()
}

/// Counter pattern, little-endian, `unit_size` bytes per row
fn logic_rows(start: usize, end: usize, unit_size: usize) -> Vec<u8> {
    (start..end)
        .flat_map(|i| {
            (i as u64)
                .to_le_bytes()
                .into_iter()
                .chain(std::iter::repeat(0))
                .take(unit_size)
        })
        .collect()
}

fn sine(start: usize, end: usize, channel: usize, samplerate: u64) -> Vec<f32> {
    let freq = 1_000.0 * (channel + 1) as f32;
    let rate = samplerate.max(1) as f32;
    (start..end)
        .map(|i| (TAU * freq * i as f32 / rate).sin())
        .collect()
}
