//! Standard DTMF tone analysis and synthesis for clapboard markers
//!
//! Frequency design:
//! - Low group (rows): 697, 770, 852, 941 Hz
//! - High group (columns): 1209, 1336, 1477, 1633 Hz
//! - 16 symbols: 0-9, A-D, * and #
//!
//! Analysis runs the Goertzel filter once per frequency over a whole block;
//! frequencies are expressed in cycles per block (`freq_hz / fps`).

use crate::error::{ClapError, Result};
use std::f32::consts::PI;

/// The 8 canonical DTMF frequencies, low group first
pub const DTMF_FREQS: [f32; 8] = [697.0, 770.0, 852.0, 941.0, 1209.0, 1336.0, 1477.0, 1633.0];

/// Number of bins in a tone spectrum
pub const DTMF_BINS: usize = 8;

/// Keypad layout, indexed by [low bin][high bin - 4]
const DTMF_KEYS: [[char; 4]; 4] = [
    ['1', '2', '3', 'A'],
    ['4', '5', '6', 'B'],
    ['7', '8', '9', 'C'],
    ['*', '0', '#', 'D'],
];

/// Upper bound on a single block's relevance (dominant pair over the rest)
const MAX_BLOCK_RELEVANCE: f32 = 1e9;

/// Per-component amplitude of synthesized tones (two components stay below full scale)
const TONE_AMPLITUDE: f32 = 0.35;

/// Map a (low, high) bin pair to its key, if the pair is on the keypad
pub fn key_for_bins(low: usize, high: usize) -> Option<char> {
    if low < 4 && (4..DTMF_BINS).contains(&high) {
        Some(DTMF_KEYS[low][high - 4])
    } else {
        None
    }
}

/// Map a key to its (low, high) bin pair
pub fn bins_for_key(key: char) -> Option<(usize, usize)> {
    for (row, keys) in DTMF_KEYS.iter().enumerate() {
        if let Some(col) = keys.iter().position(|&k| k == key) {
            return Some((row, col + 4));
        }
    }
    None
}

/// Whether `key` is one of the 16 DTMF symbols
pub fn is_dtmf_key(key: char) -> bool {
    bins_for_key(key).is_some()
}

/// Compute power at `cycles` cycles per block using the Goertzel recursion
pub fn goertzel_power(samples: &[i16], cycles: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let omega = 2.0 * PI * cycles / samples.len() as f32;
    let coeff = 2.0 * omega.cos();

    let mut s_prev = 0.0f32;
    let mut s_prev2 = 0.0f32;

    for &sample in samples {
        let s = sample as f32 + coeff * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s;
    }

    s_prev2 * s_prev2 + s_prev * s_prev - coeff * s_prev * s_prev2
}

/// Power at each of the 8 DTMF frequencies for one block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpectrum {
    powers: [f32; DTMF_BINS],
}

impl ToneSpectrum {
    pub fn new(powers: [f32; DTMF_BINS]) -> Self {
        Self { powers }
    }

    /// Measure a block lasting `1/fps` seconds
    pub fn measure(block: &[i16], fps: usize) -> Self {
        let fps = fps as f32;
        Self {
            powers: std::array::from_fn(|i| goertzel_power(block, DTMF_FREQS[i] / fps)),
        }
    }

    pub fn powers(&self) -> &[f32; DTMF_BINS] {
        &self.powers
    }

    /// Indices of the strongest and second strongest bins
    pub fn dominant_pair(&self) -> (usize, usize) {
        let p = &self.powers;
        let (mut first, mut second) = if p[0] > p[1] { (0, 1) } else { (1, 0) };

        for i in 2..DTMF_BINS {
            if p[i] > p[first] {
                second = first;
                first = i;
            } else if p[i] > p[second] {
                second = i;
            }
        }

        (first, second)
    }

    /// Classify the block as a DTMF key with its relevance
    ///
    /// A key is reported only when the dominant pair carries more power than
    /// the other six bins combined and the pair is a low/high keypad pair.
    /// The relevance is the ratio of the two sums, always greater than 1.
    pub fn classify(&self) -> Option<(char, f32)> {
        let (first, second) = self.dominant_pair();
        let sum_top2 = self.powers[first] + self.powers[second];
        let sum_rest: f32 = self
            .powers
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != first && i != second)
            .map(|(_, &p)| p)
            .sum();

        if !(sum_top2 > sum_rest) {
            return None;
        }

        let key = key_for_bins(first.min(second), first.max(second))?;
        let relevance = (sum_top2 / sum_rest).min(MAX_BLOCK_RELEVANCE);
        Some((key, relevance))
    }
}

/// Clapboard tone generator - renders key sequences as 16-bit PCM
pub struct ToneGenerator {
    sample_rate: usize,
    tone_samples: usize,
}

impl ToneGenerator {
    /// Generator emitting 200 ms tones at `sample_rate`
    pub fn new(sample_rate: usize) -> Self {
        Self {
            sample_rate,
            tone_samples: sample_rate / 5,
        }
    }

    /// Render a single key using the configured tone length
    pub fn tone(&self, key: char) -> Result<Vec<i16>> {
        self.tone_with_len(key, self.tone_samples)
    }

    /// Render a single key lasting `len` samples
    pub fn tone_with_len(&self, key: char, len: usize) -> Result<Vec<i16>> {
        let (low, high) = bins_for_key(key).ok_or(ClapError::UnknownKey(key))?;
        Ok(self.render(&[DTMF_FREQS[low], DTMF_FREQS[high]], TONE_AMPLITUDE, len))
    }

    /// Render an arbitrary mix of sine components, each at `amplitude` of full scale
    pub fn render(&self, freqs: &[f32], amplitude: f32, len: usize) -> Vec<i16> {
        let sample_rate = self.sample_rate as f32;
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate;
                let value: f32 = freqs.iter().map(|&f| (2.0 * PI * f * t).sin()).sum();
                to_pcm(value * amplitude)
            })
            .collect()
    }

    /// `seconds` of digital silence
    pub fn silence(&self, seconds: f32) -> Vec<i16> {
        vec![0; (seconds * self.sample_rate as f32).round() as usize]
    }

    /// Render a clapboard key sequence, one tone per character, back to back
    ///
    /// The clapboard never plays the same tone twice in a row, so identical
    /// adjacent keys are rejected.
    pub fn sequence(&self, keys: &str) -> Result<Vec<i16>> {
        let mut samples = Vec::with_capacity(keys.chars().count() * self.tone_samples);
        let mut previous = None;

        for key in keys.chars() {
            if previous == Some(key) {
                return Err(ClapError::RepeatedTone(key));
            }
            samples.extend_from_slice(&self.tone(key)?);
            previous = Some(key);
        }

        Ok(samples)
    }
}

/// Convert a full-scale float sample to 16-bit PCM
pub fn to_pcm(value: f32) -> i16 {
    (value * 32767.0).round().clamp(-32768.0, 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: usize = 48000;
    const FPS: usize = 20;
    const BLOCK: usize = RATE / FPS;

    #[test]
    fn test_key_table_is_complete() {
        let mut seen = Vec::new();
        for low in 0..4 {
            for high in 4..8 {
                let key = key_for_bins(low, high).unwrap();
                assert_eq!(bins_for_key(key), Some((low, high)));
                seen.push(key);
            }
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 16);
        assert_eq!(key_for_bins(0, 1), None);
        assert_eq!(key_for_bins(4, 6), None);
        assert_eq!(bins_for_key('E'), None);
        assert!(is_dtmf_key('#'));
        assert!(!is_dtmf_key('.'));
    }

    #[test]
    fn test_goertzel_empty_block() {
        assert_eq!(goertzel_power(&[], 10.0), 0.0);
    }

    #[test]
    fn test_pure_tone_peaks_in_its_own_bin() {
        let generator = ToneGenerator::new(RATE);
        for (bin, &freq) in DTMF_FREQS.iter().enumerate() {
            let block = generator.render(&[freq], 0.5, BLOCK);
            let spectrum = ToneSpectrum::measure(&block, FPS);
            for (other, &power) in spectrum.powers().iter().enumerate() {
                if other != bin {
                    assert!(
                        spectrum.powers()[bin] > power,
                        "{} Hz: bin {} ({}) not above bin {} ({})",
                        freq,
                        bin,
                        spectrum.powers()[bin],
                        other,
                        power
                    );
                }
            }
        }
    }

    #[test]
    fn test_pure_tone_peaks_at_other_block_rates() {
        let generator = ToneGenerator::new(8000);
        for (bin, &freq) in DTMF_FREQS.iter().enumerate() {
            let block = generator.render(&[freq], 0.8, 8000 / 40);
            let spectrum = ToneSpectrum::measure(&block, 40);
            let (first, _) = spectrum.dominant_pair();
            assert_eq!(first, bin, "{} Hz peaked in bin {}", freq, first);
        }
    }

    #[test]
    fn test_classify_all_keys() {
        let generator = ToneGenerator::new(RATE);
        for key in "123A456B789C*0#D".chars() {
            let block = generator.tone_with_len(key, BLOCK).unwrap();
            let (detected, relevance) = ToneSpectrum::measure(&block, FPS).classify().unwrap();
            assert_eq!(detected, key);
            assert!(relevance > 1.0);
        }
    }

    #[test]
    fn test_silence_yields_nothing() {
        let block = vec![0i16; BLOCK];
        assert_eq!(ToneSpectrum::measure(&block, FPS).classify(), None);
    }

    #[test]
    fn test_equal_energy_yields_nothing() {
        let spectrum = ToneSpectrum::new([1.0; 8]);
        assert_eq!(spectrum.classify(), None);
    }

    #[test]
    fn test_dominant_pair_equal_to_rest_yields_nothing() {
        let spectrum = ToneSpectrum::new([3.0, 0.0, 0.0, 0.0, 3.0, 2.0, 2.0, 2.0]);
        assert_eq!(spectrum.classify(), None);
    }

    #[test]
    fn test_dominant_pair_above_rest() {
        let spectrum = ToneSpectrum::new([3.0, 0.0, 0.0, 0.0, 3.0, 1.0, 1.0, 1.0]);
        assert_eq!(spectrum.classify(), Some(('1', 2.0)));

        let spectrum = ToneSpectrum::new([0.0, 0.0, 0.0, 9.0, 0.0, 0.0, 0.0, 8.0]);
        let (key, relevance) = spectrum.classify().unwrap();
        assert_eq!(key, 'D');
        assert_eq!(relevance, MAX_BLOCK_RELEVANCE);
    }

    #[test]
    fn test_same_group_pair_yields_nothing() {
        let spectrum = ToneSpectrum::new([5.0, 5.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
        assert_eq!(spectrum.dominant_pair(), (1, 0));
        assert_eq!(spectrum.classify(), None);
    }

    #[test]
    fn test_dominant_pair_tie_prefers_first_bin() {
        let spectrum = ToneSpectrum::new([1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(spectrum.dominant_pair(), (1, 0));
    }

    #[test]
    fn test_two_keys_at_equal_energy_yield_nothing() {
        // '1' (697 + 1209 Hz) and '9' (852 + 1477 Hz) sounding together
        let generator = ToneGenerator::new(RATE);
        let block = generator.render(&[697.0, 1209.0, 852.0, 1477.0], 0.2, BLOCK);
        assert_eq!(ToneSpectrum::measure(&block, FPS).classify(), None);
    }

    #[test]
    fn test_sequence_length_and_errors() {
        let generator = ToneGenerator::new(RATE);
        let samples = generator.sequence("A*1234*D").unwrap();
        assert_eq!(samples.len(), 8 * RATE / 5);

        assert!(matches!(
            generator.sequence("A11"),
            Err(ClapError::RepeatedTone('1'))
        ));
        assert!(matches!(
            generator.sequence("A.B"),
            Err(ClapError::UnknownKey('.'))
        ));
    }

    #[test]
    fn test_tone_amplitude_range() {
        let generator = ToneGenerator::new(RATE);
        let samples = generator.tone('5').unwrap();
        let max = samples.iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!(max < 32767, "tone should not clip");
        assert!(max > 10000, "tone should have reasonable amplitude");
    }

    #[test]
    fn test_silence_length() {
        let generator = ToneGenerator::new(RATE);
        assert_eq!(generator.silence(1.5).len(), 72000);
        assert!(generator.silence(0.1).iter().all(|&s| s == 0));
    }
}
