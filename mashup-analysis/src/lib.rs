//! Audio analysis module for mashup
//!
//! Provides pitch class arithmetic, tempo/beat detection and
//! chroma-based key detection.

mod key;
mod pitch;
mod tempo;

pub use key::{DetectedKey, KeyAnalyzer};
pub use pitch::{KeyError, PitchClass};
pub use tempo::{TempoAnalyzer, TempoEstimate};

/// Average interleaved channels down to a single mono channel
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
