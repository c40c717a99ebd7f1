//! Track conforming and two-track mixing
//!
//! This crate provides the offline mixing pipeline:
//! - Engine: the DSP and file I/O contracts plus the native implementation
//! - Track: one asset with its tempo, key and beat times
//! - Mixer: sample rate, tempo and key matching followed by overlay
//! - Timestretcher: phase vocoder for pitch-independent tempo and pitch shifting

mod engine;
mod error;
mod mixer;
mod resample;
mod track;
mod waveform;
pub mod timestretcher;

#[cfg(test)]
mod testing;

pub use engine::{AudioFileIo, Decoded, DspEngine, NativeEngine};
pub use error::MixError;
pub use mixer::{select_master, ClipPolicy, KeyMode, MixOptions, MixStage, Mixer, Preference, TempoMode, TrackSlot};
pub use resample::{resample_rate, resample_ratio};
pub use track::{Track, WriteOptions};
pub use waveform::Waveform;
pub use timestretcher::{FftSize, PhaseLockMode, PhaseVocoder, PitchShifter, TimeStretchParams};

pub use mashup_analysis::{PitchClass, TempoEstimate};
pub use mashup_library::BitDepth;
