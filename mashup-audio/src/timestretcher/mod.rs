//! Offline time-stretching and pitch-shifting.
//!
//! # Algorithm Details
//!
//! The phase vocoder works by:
//! 1. Windowing input into overlapping frames (STFT, 75% overlap)
//! 2. Stepping through the frames at the stretch rate, interpolating magnitudes
//! 3. Accumulating phase from each bin's instantaneous frequency
//! 4. Converting back via IFFT and overlap-add
//!
//! Pitch-shifting stretches by `2^(-n/12)` and then resamples by the same
//! factor, which restores the original duration with every frequency scaled.

mod phase;
mod stft;

pub use phase::{PhaseLockMode, PhaseVocoder, TimeStretchParams};
pub use stft::{FftSize, Stft};

use crate::error::MixError;
use crate::resample::resample_ratio;
use crate::waveform::fix_length;

/// Pitch shift without tempo change
/// Uses phase vocoder + resampling
pub struct PitchShifter {
    vocoder: PhaseVocoder,
}

impl PitchShifter {
    pub fn new(params: TimeStretchParams) -> Self {
        Self {
            vocoder: PhaseVocoder::new(params),
        }
    }

    /// Stretch rate for a shift: positive semitones stretch longer first
    pub fn rate_for(semitones: f64) -> f64 {
        2.0f64.powf(-semitones / 12.0)
    }

    /// Shift every channel by `semitones`, keeping each channel's length
    pub fn shift(&self, channels: &[Vec<f32>], semitones: f64) -> Result<Vec<Vec<f32>>, MixError> {
        if semitones == 0.0 {
            return Ok(channels.to_vec());
        }

        let rate = Self::rate_for(semitones);
        let stretched: Vec<Vec<f32>> = channels
            .iter()
            .map(|ch| self.vocoder.stretch(ch, rate))
            .collect();

        let resampled = resample_ratio(&stretched, rate)?;

        Ok(resampled
            .into_iter()
            .zip(channels)
            .map(|(shifted, original)| fix_length(shifted, original.len()))
            .collect())
    }
}
