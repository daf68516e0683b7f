mod input;

use clap::{Args, Parser, Subcommand};
use clapmark_core::{
    match_tags, solve_offsets, BlockSource, ClapDecoder, DecodedSequence, DecoderConfig,
    Recording, ToneGenerator, AUDIO_FPS, AUDIO_RATE, MAX_SEQ_SECONDS, MIN_MARK_RELEVANCE,
    MIN_PEAK_RELEVANCE, MIN_RELEVANCE,
};
use hound::WavSpec;
use input::AudioInput;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Blocks between progress updates on stderr
const PROGRESS_INTERVAL: u64 = 1000;

#[derive(Parser)]
#[command(name = "clapmark")]
#[command(about = "Find electronic clapboard DTMF markers in audio tracks")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode clapboard sequences from an audio or video file
    Analyze {
        /// Input media file, a .wav file, or - for raw s16be PCM on stdin
        #[arg(value_name = "INPUT")]
        input: String,

        /// External program used to decode non-WAV inputs
        #[arg(long, default_value = "ffmpeg")]
        decoder: String,

        /// Print one JSON object per line instead of the text table
        #[arg(long)]
        json: bool,

        /// Suppress the progress counter on stderr
        #[arg(short, long)]
        quiet: bool,

        #[command(flatten)]
        tuning: Tuning,
    },

    /// Align several recordings of the same takes by their clapboard sequences
    Sync {
        /// Input files; the first one anchors the solution
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<String>,

        /// External program used to decode non-WAV inputs
        #[arg(long, default_value = "ffmpeg")]
        decoder: String,

        /// Suppress the progress counter on stderr
        #[arg(short, long)]
        quiet: bool,

        #[command(flatten)]
        tuning: Tuning,
    },

    /// Render a clapboard sequence to a WAV file
    Generate {
        /// DTMF keys to play (0-9, A-D, * and #)
        #[arg(value_name = "SEQUENCE")]
        sequence: String,

        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Seconds of silence before the first tone
        #[arg(long, default_value_t = 1.0)]
        lead_in: f32,

        /// Seconds of silence after the last tone
        #[arg(long, default_value_t = 5.0)]
        tail: f32,

        /// Output sample rate in Hz
        #[arg(long, default_value_t = AUDIO_RATE)]
        sample_rate: usize,
    },
}

/// Decoder settings exposed on the command line
#[derive(Args)]
struct Tuning {
    /// Analysis sample rate in Hz
    #[arg(long, default_value_t = AUDIO_RATE)]
    sample_rate: usize,

    /// Analysis blocks per second
    #[arg(long, default_value_t = AUDIO_FPS)]
    fps: usize,

    /// Minimum relevance for a tone cluster
    #[arg(long, default_value_t = MIN_RELEVANCE)]
    min_relevance: f32,

    /// Minimum relevance of the strongest cluster in a sequence
    #[arg(long, default_value_t = MIN_PEAK_RELEVANCE)]
    min_peak_relevance: f32,

    /// Minimum relevance for a cluster to predict the sequence end
    #[arg(long, default_value_t = MIN_MARK_RELEVANCE)]
    min_mark_relevance: f32,

    /// Longest sequence to wait for, in seconds
    #[arg(long, default_value_t = MAX_SEQ_SECONDS)]
    max_seq_seconds: f32,
}

impl From<Tuning> for DecoderConfig {
    fn from(tuning: Tuning) -> Self {
        DecoderConfig {
            sample_rate: tuning.sample_rate,
            fps: tuning.fps,
            min_relevance: tuning.min_relevance,
            min_peak_relevance: tuning.min_peak_relevance,
            min_mark_relevance: tuning.min_mark_relevance,
            max_seq_seconds: tuning.max_seq_seconds,
            ..Default::default()
        }
    }
}

#[derive(Serialize)]
struct SequenceRecord<'a> {
    start_time: f64,
    symbols: &'a str,
}

#[derive(Serialize)]
struct EndRecord {
    eof: bool,
    duration: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Analyze {
            input,
            decoder,
            json,
            quiet,
            tuning,
        } => analyze_command(&input, &decoder, json, quiet, tuning.into())?,
        Commands::Sync {
            inputs,
            decoder,
            quiet,
            tuning,
        } => sync_command(&inputs, &decoder, quiet, tuning.into())?,
        Commands::Generate {
            sequence,
            output,
            lead_in,
            tail,
            sample_rate,
        } => generate_command(&sequence, &output, lead_in, tail, sample_rate)?,
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Block source wrapper printing `[m:ss]` to stderr every `PROGRESS_INTERVAL` blocks
struct Progress<S> {
    inner: S,
    blocks: u64,
    fps: u64,
    enabled: bool,
}

impl<S: BlockSource> BlockSource for Progress<S> {
    fn next_block(&mut self, block: &mut [i16]) -> clapmark_core::Result<bool> {
        if self.enabled && self.blocks % PROGRESS_INTERVAL == 0 {
            let seconds = self.blocks / self.fps;
            eprint!("[{}:{:02}]\r", seconds / 60, seconds % 60);
        }
        let more = self.inner.next_block(block)?;
        if more {
            self.blocks += 1;
        }
        Ok(more)
    }
}

/// Decode every sequence of `input`, returning the stream length in seconds
fn decode_input(
    input: &str,
    decoder_program: &str,
    quiet: bool,
    config: DecoderConfig,
    mut on_sequence: impl FnMut(&DecodedSequence),
) -> Result<f64, Box<dyn std::error::Error>> {
    let mut decoder = ClapDecoder::new(config)?;
    let audio = AudioInput::open(input, config.sample_rate, decoder_program)?;
    let mut source = Progress {
        inner: audio,
        blocks: 0,
        fps: config.fps as u64,
        enabled: !quiet,
    };

    let result = decoder.run_with(&mut source, |sequence: &DecodedSequence| on_sequence(sequence));
    source.inner.finish()?;
    result?;

    Ok(decoder.elapsed_seconds())
}

fn analyze_command(
    input: &str,
    decoder_program: &str,
    json: bool,
    quiet: bool,
    config: DecoderConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if !json {
        println!("{:>10} {}", "AUDIO", input);
    }

    let mut print_error = None;
    let duration = decode_input(input, decoder_program, quiet, config, |sequence| {
        if let Err(e) = print_sequence(sequence, json) {
            print_error.get_or_insert(e);
        }
    })?;
    if let Some(e) = print_error {
        return Err(e);
    }

    if json {
        let record = EndRecord { eof: true, duration };
        println!("{}", serde_json::to_string(&record)?);
    } else {
        println!("{:10.2} EOF", duration);
    }

    Ok(())
}

fn sync_command(
    inputs: &[String],
    decoder_program: &str,
    quiet: bool,
    config: DecoderConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut recordings = Vec::with_capacity(inputs.len());
    for input in inputs {
        let mut sequences = Vec::new();
        let length = decode_input(input, decoder_program, quiet, config, |sequence| {
            sequences.push(sequence.clone())
        })?;
        log::info!("{}: {} sequences in {:.2}s", input, sequences.len(), length);
        recordings.push(Recording::new(input.as_str(), sequences, length));
    }

    let matching = match_tags(&recordings);
    for ambiguity in &matching.ambiguous {
        let recording = &recordings[ambiguity.recording];
        let candidates: Vec<&str> = ambiguity
            .candidates
            .iter()
            .map(|&t| recording.tags[t].symbols.as_str())
            .collect();
        eprintln!(
            "Warning: tags {} in file \"{}\" all match tag \"{}\"",
            candidates.join(", "),
            recording.name,
            ambiguity.text
        );
    }

    for sync in &matching.syncs {
        println!("\nSync \"{}\":", sync.text);
        for tag in &sync.tags {
            let sequence = tag.sequence(&recordings);
            println!(
                "{:8.2} {} {}",
                sequence.start_time, sequence.symbols, recordings[tag.recording].name
            );
        }
    }

    let offsets = solve_offsets(&recordings, &matching.syncs)?;

    // Audio-only alignment keeps every clock at unit rate
    println!("\nSync solution:");
    for (recording, offset) in recordings.iter().zip(&offsets) {
        println!("{:8.3} {:8.6} {}", offset, 1.0, recording.name);
    }

    println!("\nSync deviation:");
    for sync in &matching.syncs {
        println!("{:>15}:", sync.text);
        let Some(spread) = sync.spread(&recordings, &offsets) else {
            continue;
        };
        for (tag, time) in &spread.times {
            println!("{:>25} {:5.2}", recordings[tag.recording].name, time);
        }
        println!("{:>25} {:5.2}", "mean", spread.mean);
        println!("{:>25} {:5.2}", "dev", spread.deviation);
    }

    println!("\nCut markers:");
    for (recording, offset) in recordings.iter().zip(&offsets) {
        for cut in &recording.cuts {
            println!(
                "{:8.2} {} {}",
                offset + cut.start_time,
                cut.symbols,
                recording.name
            );
        }
    }

    Ok(())
}

fn print_sequence(
    sequence: &DecodedSequence,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        let record = SequenceRecord {
            start_time: sequence.start_time,
            symbols: &sequence.symbols,
        };
        println!("{}", serde_json::to_string(&record)?);
    } else {
        println!("{:10.2} {}", sequence.start_time, sequence.symbols);
    }
    Ok(())
}

fn generate_command(
    sequence: &str,
    output_path: &Path,
    lead_in: f32,
    tail: f32,
    sample_rate: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if !(lead_in >= 0.0 && tail >= 0.0) {
        return Err("Silence durations must be non-negative".into());
    }

    let generator = ToneGenerator::new(sample_rate);
    let tones = generator.sequence(sequence)?;

    let mut samples = generator.silence(lead_in);
    samples.extend_from_slice(&tones);
    samples.extend(generator.silence(tail));

    // Write WAV file (16-bit PCM)
    let spec = WavSpec {
        channels: 1,
        sample_rate: sample_rate as u32,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(output_path, spec)?;
    for sample in &samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;

    log::info!(
        "rendered {} tones, {:.2}s of audio",
        sequence.chars().count(),
        samples.len() as f32 / sample_rate as f32
    );
    println!("Wrote {} to {}", sequence, output_path.display());
    Ok(())
}
