use crate::error::{ClapError, Result};
use crate::{
    AUDIO_FPS, AUDIO_RATE, GAP_TOLERANCE, MAX_SEQ_SECONDS, MIN_MARK_RELEVANCE, MIN_PEAK_RELEVANCE,
    MIN_RELEVANCE, SNAP_TOLERANCE,
};

/// Tunable parameters of the clapboard decoder
///
/// Defaults mirror the crate-level constants. Fields are public so callers
/// can override individual values; `ClapDecoder::new` validates the result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecoderConfig {
    /// Sample rate of the incoming PCM stream in Hz
    pub sample_rate: usize,
    /// Analysis blocks per second of audio
    pub fps: usize,
    /// Clusters weaker than this end the extraction pass
    pub min_relevance: f32,
    /// The strongest cluster must reach this before a decode is attempted
    pub min_peak_relevance: f32,
    /// Only clusters above this take part in the end-of-sequence estimate
    pub min_mark_relevance: f32,
    /// Maximum age of the oldest buffered detection, in seconds
    pub max_seq_seconds: f32,
    /// Distance (in tone windows) within which an event snaps to the raster cursor
    pub snap_tolerance: f32,
    /// Spacing (in tone windows) between two events that is reported as a gap
    pub gap_tolerance: f32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: AUDIO_RATE,
            fps: AUDIO_FPS,
            min_relevance: MIN_RELEVANCE,
            min_peak_relevance: MIN_PEAK_RELEVANCE,
            min_mark_relevance: MIN_MARK_RELEVANCE,
            max_seq_seconds: MAX_SEQ_SECONDS,
            snap_tolerance: SNAP_TOLERANCE,
            gap_tolerance: GAP_TOLERANCE,
        }
    }
}

impl DecoderConfig {
    /// Check every precondition the decoder relies on
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.fps == 0 {
            return Err(ClapError::InvalidConfig(
                "sample rate and fps must be non-zero".to_string(),
            ));
        }
        if self.sample_rate % self.fps != 0 {
            return Err(ClapError::InvalidConfig(format!(
                "sample rate {} is not divisible by fps {}",
                self.sample_rate, self.fps
            )));
        }

        let thresholds = [
            ("min_relevance", self.min_relevance),
            ("min_peak_relevance", self.min_peak_relevance),
            ("min_mark_relevance", self.min_mark_relevance),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(ClapError::InvalidConfig(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }

        let positive = [
            ("max_seq_seconds", self.max_seq_seconds),
            ("snap_tolerance", self.snap_tolerance),
            ("gap_tolerance", self.gap_tolerance),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ClapError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }

    /// Samples per analysis block
    pub fn block_len(&self) -> usize {
        self.sample_rate / self.fps
    }

    /// Length of one 200 ms clapboard tone, in blocks
    pub fn tone_window(&self) -> f64 {
        self.fps as f64 / 5.0
    }

    /// Maximum age of the oldest buffered detection, in blocks
    pub fn max_seq_frames(&self) -> f64 {
        self.max_seq_seconds as f64 * self.fps as f64
    }
}
