//! Offline sample rate conversion with rubato
//!
//! Integer rate pairs go through the FFT resampler; arbitrary ratios (used by
//! pitch-shifting) through the sinc resampler. Both compensate the
//! resampler's output delay so the result is time-aligned with the input.

use crate::error::MixError;
use crate::waveform::fix_length;
use rubato::{
    FftFixedInOut, Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

const CHUNK_SIZE: usize = 1024;

fn transform_error(err: impl std::fmt::Display) -> MixError {
    MixError::Transform(format!("resampler: {err}"))
}

/// Resample channels from `from_rate` to `to_rate`
///
/// Output length is `round(len * to_rate / from_rate)`.
pub fn resample_rate(
    channels: &[Vec<f32>],
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<Vec<f32>>, MixError> {
    let frames = channels.first().map_or(0, Vec::len);
    let expected = (frames as f64 * to_rate as f64 / from_rate as f64).round() as usize;
    if from_rate == to_rate || channels.is_empty() {
        return Ok(channels.to_vec());
    }

    let mut resampler = FftFixedInOut::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_SIZE,
        channels.len(),
    )
    .map_err(transform_error)?;

    run(&mut resampler, channels, expected)
}

/// Resample channels by an arbitrary output/input `ratio`
///
/// Output length is `round(len * ratio)`.
pub fn resample_ratio(channels: &[Vec<f32>], ratio: f64) -> Result<Vec<Vec<f32>>, MixError> {
    let frames = channels.first().map_or(0, Vec::len);
    let expected = (frames as f64 * ratio).round() as usize;
    if (ratio - 1.0).abs() < f64::EPSILON || channels.is_empty() {
        return Ok(channels.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.1, params, CHUNK_SIZE, channels.len())
        .map_err(transform_error)?;

    run(&mut resampler, channels, expected)
}

/// Feed zero-padded chunks until `expected` frames past the delay are out
fn run<R: Resampler<f32>>(
    resampler: &mut R,
    channels: &[Vec<f32>],
    expected: usize,
) -> Result<Vec<Vec<f32>>, MixError> {
    let delay = resampler.output_delay();
    let needed = expected + delay;
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(needed); channels.len()];
    let mut pos = 0;

    while output[0].len() < needed {
        let chunk = resampler.input_frames_next();
        let block: Vec<Vec<f32>> = channels
            .iter()
            .map(|ch| {
                let start = pos.min(ch.len());
                let end = (pos + chunk).min(ch.len());
                let mut v = ch[start..end].to_vec();
                v.resize(chunk, 0.0);
                v
            })
            .collect();

        let resampled = resampler.process(&block, None).map_err(transform_error)?;
        if resampled.first().map_or(true, Vec::is_empty) {
            break;
        }
        for (dst, src) in output.iter_mut().zip(resampled) {
            dst.extend(src);
        }
        pos += chunk;
    }

    Ok(output
        .into_iter()
        .map(|ch| fix_length(ch.into_iter().skip(delay).collect(), expected))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_rate_length() {
        let channels = vec![sine(440.0, 22050, 22050), sine(220.0, 22050, 22050)];
        let out = resample_rate(&channels, 22050, 44100).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 44100);
        assert_eq!(out[1].len(), 44100);
    }

    #[test]
    fn test_rate_odd_pair_length() {
        let channels = vec![sine(440.0, 44100, 10000)];
        let out = resample_rate(&channels, 44100, 48000).unwrap();
        assert_eq!(out[0].len(), (10000.0f64 * 48000.0 / 44100.0).round() as usize);
    }

    #[test]
    fn test_same_rate_is_identity() {
        let channels = vec![vec![0.1, 0.2, 0.3]];
        assert_eq!(resample_rate(&channels, 48000, 48000).unwrap(), channels);
    }

    #[test]
    fn test_delay_compensated() {
        // A sine upsampled should still start near zero phase
        let channels = vec![sine(100.0, 24000, 24000)];
        let out = resample_rate(&channels, 24000, 48000).unwrap();
        let expected = (2.0 * PI * 100.0 * 2000.0 / 48000.0).sin() * 0.5;
        assert!((out[0][2000] - expected).abs() < 0.02, "{} vs {}", out[0][2000], expected);
    }

    #[test]
    fn test_ratio_length() {
        let channels = vec![sine(440.0, 44100, 30000)];
        let out = resample_ratio(&channels, 0.75).unwrap();
        assert_eq!(out[0].len(), 22500);
    }
}
