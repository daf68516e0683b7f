use clapmark_core::dtmf::to_pcm;
use clapmark_core::{downmix, resample, BlockSource, PcmReader, SampleBlocks};
use hound::SampleFormat;
use std::io::{self, Stdin};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Unsupported WAV format: {bits}-bit {format:?}")]
    UnsupportedFormat { bits: u16, format: SampleFormat },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} produced no output stream")]
    NoOutput { program: String },

    #[error("{program} failed with {status}")]
    DecoderFailed { program: String, status: ExitStatus },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Audio feeding the decoder, already mono at the decoder's sample rate
pub enum AudioInput {
    Wav(SampleBlocks),
    Stdin(PcmReader<Stdin>),
    External(ExternalDecoder),
}

impl AudioInput {
    /// Open `input` for decoding at `sample_rate`
    ///
    /// `.wav` files are read directly, `-` is raw s16be PCM on stdin and
    /// anything else goes through the external `decoder` program.
    pub fn open(input: &str, sample_rate: usize, decoder: &str) -> Result<Self, InputError> {
        if input == "-" {
            return Ok(AudioInput::Stdin(PcmReader::new(io::stdin())));
        }

        let is_wav = Path::new(input)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if is_wav {
            let samples = read_wav(Path::new(input), sample_rate)?;
            return Ok(AudioInput::Wav(SampleBlocks::new(samples)));
        }

        ExternalDecoder::spawn(decoder, input, sample_rate).map(AudioInput::External)
    }

    /// Release the input, reporting a failed external decoder
    pub fn finish(self) -> Result<(), InputError> {
        match self {
            AudioInput::External(external) => external.finish(),
            _ => Ok(()),
        }
    }
}

impl BlockSource for AudioInput {
    fn next_block(&mut self, block: &mut [i16]) -> clapmark_core::Result<bool> {
        match self {
            AudioInput::Wav(source) => source.next_block(block),
            AudioInput::Stdin(source) => source.next_block(block),
            AudioInput::External(source) => source.reader.next_block(block),
        }
    }
}

/// Media decoder subprocess writing raw mono s16be PCM to its stdout
pub struct ExternalDecoder {
    program: String,
    child: Child,
    reader: PcmReader<ChildStdout>,
}

impl ExternalDecoder {
    pub fn spawn(program: &str, input: &str, sample_rate: usize) -> Result<Self, InputError> {
        let rate = sample_rate.to_string();
        log::debug!("spawning {} for {}", program, input);

        let mut child = Command::new(program)
            .args(["-v", "error", "-i", input, "-f", "s16be", "-ar", rate.as_str(), "-ac", "1", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| InputError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| InputError::NoOutput {
            program: program.to_string(),
        })?;

        Ok(Self {
            program: program.to_string(),
            child,
            reader: PcmReader::new(stdout),
        })
    }

    pub fn finish(self) -> Result<(), InputError> {
        let Self {
            program,
            mut child,
            reader,
        } = self;
        // Close our end of the pipe so a decoder still writing stops
        drop(reader.into_inner());

        let status = child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(InputError::DecoderFailed { program, status })
        }
    }
}

/// Read a WAV file as mono 16-bit PCM at `sample_rate`
pub fn read_wav(path: &Path, sample_rate: usize) -> Result<Vec<i16>, InputError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    log::debug!(
        "WAV: {} Hz, {} channels, {} bits",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample
    );

    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, bits @ 1..=32) => {
            let samples: Result<Vec<i32>, _> = reader.samples::<i32>().collect();
            samples?
                .into_iter()
                .map(|s| {
                    if bits >= 16 {
                        (s >> (bits - 16)) as i16
                    } else {
                        (s << (16 - bits)) as i16
                    }
                })
                .collect()
        }
        (SampleFormat::Float, 32) => {
            let samples: Result<Vec<f32>, _> = reader.samples::<f32>().collect();
            samples?.into_iter().map(to_pcm).collect()
        }
        (format, bits) => return Err(InputError::UnsupportedFormat { bits, format }),
    };

    let mono = downmix(&interleaved, spec.channels as usize);
    Ok(resample(&mono, spec.sample_rate as usize, sample_rate))
}
