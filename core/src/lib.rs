//! Clapboard DTMF marker decoder for audio/video synchronization
//!
//! Electronic clapboards play a short sequence of 200 ms DTMF tones per take.
//! This crate recovers those sequences from a stream of 16-bit PCM blocks:
//! Goertzel tone estimation per block, greedy clustering of detections in
//! time and raster-aligned reconstruction of the key string.

pub mod error;
pub mod config;
pub mod dtmf;
pub mod event;
pub mod cluster;
pub mod sequence;
pub mod source;
pub mod resample;
pub mod decoder;
pub mod sync;

pub use cluster::extract_clusters;
pub use config::DecoderConfig;
pub use decoder::ClapDecoder;
pub use dtmf::{ToneGenerator, ToneSpectrum};
pub use error::{ClapError, Result};
pub use event::{EventBuffer, SymbolEvent};
pub use resample::{downmix, resample};
pub use sequence::{DecodeOutcome, DecodedSequence, DeferReason, SequenceDecoder};
pub use source::{BlockSource, PcmReader, SampleBlocks};
pub use sync::{match_tags, solve_offsets, Recording, SyncPoint, TagMatching, TagRef};

// Stream configuration
pub const AUDIO_RATE: usize = 48000;
pub const AUDIO_FPS: usize = 20;

// Relevance thresholds
pub const MIN_PEAK_RELEVANCE: f32 = 1000.0;
pub const MIN_MARK_RELEVANCE: f32 = 200.0;
pub const MIN_RELEVANCE: f32 = 50.0;

// Oldest detection kept before a decode attempt
pub const MAX_SEQ_SECONDS: f32 = 3.5;

// Raster tolerances, in tone windows
pub const SNAP_TOLERANCE: f32 = 0.5;
pub const GAP_TOLERANCE: f32 = 1.5;

/// Placeholder for a tone position with no decoded key
pub const GAP_CHAR: char = '.';

const _: () = assert!(AUDIO_RATE % AUDIO_FPS == 0, "AUDIO_RATE must be divisible by AUDIO_FPS");
