//! Channel mixing and sample-rate conversion for 16-bit PCM
//! Linear interpolation only; the DTMF band sits far below any usable Nyquist limit

/// Mix interleaved multi-channel audio down to mono by averaging each frame
///
/// # Arguments
/// * `samples` - Interleaved audio samples [c0, c1, ..., c0, c1, ...]
/// * `channels` - Number of interleaved channels
///
/// # Returns
/// Mono audio samples; a trailing incomplete frame is dropped
pub fn downmix(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Resample mono audio to a target sample rate using linear interpolation
///
/// # Arguments
/// * `samples` - Input audio samples
/// * `from_rate` - Current sample rate in Hz
/// * `to_rate` - Target sample rate in Hz
///
/// # Example
/// ```ignore
/// let audio_44k = vec![0i16; 44100]; // one second at 44.1kHz
/// let audio_48k = resample(&audio_44k, 44100, 48000);
/// ```
pub fn resample(samples: &[i16], from_rate: usize, to_rate: usize) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_length = ((samples.len() as f64) * ratio).ceil() as usize;
    let last = samples.len() - 1;

    (0..new_length)
        .map(|i| {
            let src_idx = i as f64 / ratio;
            let floor = (src_idx.floor() as usize).min(last);
            let ceil = floor + 1;
            let fraction = src_idx - floor as f64;

            if ceil <= last {
                let value = samples[floor] as f64 * (1.0 - fraction) + samples[ceil] as f64 * fraction;
                value.round() as i16
            } else {
                samples[floor]
            }
        })
        .collect()
}
