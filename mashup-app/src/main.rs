//! mashup - conform two audio tracks and overlay them
//!
//! Matches sample rate, tempo and key of two tracks, then sums them into a
//! single WAV file.

mod config;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::MixConfig;
use mashup_audio::{
    BitDepth, ClipPolicy, KeyMode, MixError, MixOptions, Mixer, NativeEngine, TempoMode, Track,
    WriteOptions,
};

/// Conform two audio tracks to a common tempo and key and mix them.
#[derive(Parser, Debug)]
#[command(name = "mashup")]
#[command(about = "Two-track audio mashup", version)]
struct Args {
    /// First input track
    input1: PathBuf,

    /// Second input track
    input2: PathBuf,

    /// Output WAV file
    #[arg(short, long, required_unless_present = "analyze")]
    output: Option<PathBuf>,

    /// Tempo both tracks converge on: faster, slower or mean [default: faster]
    #[arg(long, value_parser = parse_mode::<TempoMode>)]
    tempo_mode: Option<TempoMode>,

    /// Key both tracks converge on: higher, lower or mean [default: higher]
    #[arg(long, value_parser = parse_mode::<KeyMode>)]
    key_mode: Option<KeyMode>,

    /// Scale the mix so its peak sits at full scale
    #[arg(long)]
    normalize: bool,

    /// Output bits per sample: 16, 24 or 32 (float) [default: 24]
    #[arg(long, value_parser = parse_bit_depth)]
    bit_depth: Option<BitDepth>,

    /// Also write both conformed tracks into this directory
    #[arg(long, value_name = "DIR")]
    export_tracks: Option<PathBuf>,

    /// Config file (defaults to <config dir>/mashup/config.txt)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only analyse the inputs and print their features
    #[arg(long)]
    analyze: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_mode<T: FromStr<Err = MixError>>(s: &str) -> Result<T, String> {
    s.parse().map_err(|e: MixError| e.to_string())
}

fn parse_bit_depth(s: &str) -> Result<BitDepth, String> {
    s.parse::<u16>()
        .ok()
        .and_then(BitDepth::from_bits)
        .ok_or_else(|| format!("Invalid bit depth {s:?}, expected 16, 24 or 32"))
}

/// Effective settings after merging config file and command line
#[derive(Debug, Clone, Copy, PartialEq)]
struct Settings {
    tempo_mode: TempoMode,
    key_mode: KeyMode,
    options: MixOptions,
    tag_exports: bool,
}

impl Settings {
    fn resolve(args: &Args, config: &MixConfig) -> Self {
        let normalize = args.normalize || config.normalize.unwrap_or(false);
        Self {
            tempo_mode: args.tempo_mode.or(config.tempo_mode).unwrap_or_default(),
            key_mode: args.key_mode.or(config.key_mode).unwrap_or_default(),
            options: MixOptions {
                clip_policy: if normalize {
                    ClipPolicy::Normalize
                } else {
                    ClipPolicy::None
                },
                bit_depth: args.bit_depth.or(config.bit_depth).unwrap_or_default(),
            },
            tag_exports: config.tag_exports.unwrap_or(true),
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = MixConfig::load(args.config.as_deref())?;
    let settings = Settings::resolve(&args, &config);
    tracing::debug!(?settings, "Resolved settings");

    let engine = NativeEngine::new();

    if args.analyze {
        return analyze(&engine, &[args.input1.as_path(), args.input2.as_path()]);
    }

    let output = args
        .output
        .as_deref()
        .context("an output path is required")?;
    run_mix(&engine, &args, output, &settings)
}

fn analyze(engine: &NativeEngine, inputs: &[&Path]) -> anyhow::Result<()> {
    for input in inputs {
        let track = Track::load(input, engine)
            .with_context(|| format!("Failed to load {}", input.display()))?;
        println!("{}", input.display());
        println!("  tempo:       {:.2} BPM", track.tempo());
        println!("  key:         {}", track.key());
        println!("  sample rate: {} Hz", track.sample_rate());
        println!("  channels:    {}", track.waveform().channels());
        println!("  duration:    {:.2} s", track.duration_secs());
        println!("  beats:       {}", track.beat_times().len());
    }
    Ok(())
}

fn run_mix(
    engine: &NativeEngine,
    args: &Args,
    output: &Path,
    settings: &Settings,
) -> anyhow::Result<()> {
    let mut mixer = Mixer::new(&args.input1, &args.input2, engine, settings.options)
        .context("Failed to load input tracks")?;

    mixer
        .mix(output, settings.tempo_mode, settings.key_mode)
        .with_context(|| format!("Failed to mix into {}", output.display()))?;

    let (first, _) = mixer.tracks();
    println!(
        "Mixed {} + {} -> {} ({:.2} BPM, {})",
        args.input1.display(),
        args.input2.display(),
        output.display(),
        first.tempo(),
        first.key()
    );

    if let Some(dir) = &args.export_tracks {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let options = WriteOptions {
            tag_filename: settings.tag_exports,
            bit_depth: settings.options.bit_depth,
        };
        let (first, second) = mixer.into_tracks();
        for (n, track) in [first, second].iter().enumerate() {
            let target = export_path(dir, track.source(), n + 1);
            let written = track
                .write_out(&target, options, engine)
                .with_context(|| format!("Failed to export {}", target.display()))?;
            println!("Exported {}", written.display());
        }
    }

    Ok(())
}

/// `<dir>/<source stem>.wav`, falling back to `track<n>` for stemless sources
fn export_path(dir: &Path, source: &Path, n: usize) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("track{n}"));
    dir.join(format!("{stem}.wav"))
}
