//! DSP engine and file I/O contracts, plus the native implementation
//!
//! Tracks and the mixer only talk to [`DspEngine`] and [`AudioFileIo`]; every
//! call is blocking and operates on whole in-memory buffers.

use crate::error::MixError;
use crate::resample::resample_rate;
use crate::timestretcher::{PhaseVocoder, PitchShifter, TimeStretchParams};
use crate::waveform::Waveform;
use mashup_analysis::{downmix_to_mono, KeyAnalyzer, PitchClass, TempoAnalyzer, TempoEstimate};
use mashup_library::{AudioLoader, AudioWriter, BitDepth};
use std::path::Path;

/// A decoded waveform at its native sample rate
#[derive(Debug, Clone)]
pub struct Decoded {
    pub waveform: Waveform,
    pub sample_rate: u32,
}

/// Analysis and transform primitives
pub trait DspEngine {
    /// Decode an audio asset
    fn decode(&self, path: &Path) -> Result<Decoded, MixError>;

    /// Tempo (always > 0) and ascending beat timestamps in seconds
    fn detect_tempo_and_beats(&self, waveform: &Waveform, sample_rate: u32) -> TempoEstimate;

    /// Pitch class with the largest mean chroma energy
    fn detect_key(&self, waveform: &Waveform, sample_rate: u32) -> PitchClass;

    /// Change duration by `1 / ratio` keeping pitch
    fn time_stretch(&self, waveform: &Waveform, ratio: f64) -> Result<Waveform, MixError>;

    /// Shift pitch by `semitones` (-6..=6) keeping duration
    fn pitch_shift(
        &self,
        waveform: &Waveform,
        sample_rate: u32,
        semitones: i32,
    ) -> Result<Waveform, MixError>;

    /// Convert from `from_rate` to `to_rate`
    fn resample(
        &self,
        waveform: &Waveform,
        from_rate: u32,
        to_rate: u32,
    ) -> Result<Waveform, MixError>;
}

/// Reading and writing audio files
pub trait AudioFileIo {
    fn read_audio_file(&self, path: &Path) -> Result<Decoded, MixError>;

    fn write_audio_file(
        &self,
        path: &Path,
        waveform: &Waveform,
        sample_rate: u32,
        bit_depth: BitDepth,
    ) -> Result<(), MixError>;
}

/// Native engine: symphonia/hound file I/O, FFT analysis, phase vocoder and rubato
#[derive(Debug, Clone, Copy)]
pub struct NativeEngine {
    loader: AudioLoader,
    writer: AudioWriter,
    stretch: TimeStretchParams,
    fallback_bpm: f64,
}

impl Default for NativeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeEngine {
    /// Tempo reported when no beat can be found (silence, very short clips)
    pub const DEFAULT_FALLBACK_BPM: f64 = 120.0;

    pub fn new() -> Self {
        Self {
            loader: AudioLoader::new(),
            writer: AudioWriter::new(),
            stretch: TimeStretchParams::default(),
            fallback_bpm: Self::DEFAULT_FALLBACK_BPM,
        }
    }

    /// Override time-stretch quality settings
    pub fn with_stretch_params(mut self, params: TimeStretchParams) -> Self {
        self.stretch = params;
        self
    }

    /// Override the tempo used when detection fails (must be positive)
    pub fn with_fallback_bpm(mut self, bpm: f64) -> Self {
        if bpm.is_finite() && bpm > 0.0 {
            self.fallback_bpm = bpm;
        }
        self
    }
}

impl DspEngine for NativeEngine {
    fn decode(&self, path: &Path) -> Result<Decoded, MixError> {
        self.read_audio_file(path)
    }

    fn detect_tempo_and_beats(&self, waveform: &Waveform, sample_rate: u32) -> TempoEstimate {
        let mono = downmix_to_mono(waveform.samples(), waveform.channels() as usize);

        TempoAnalyzer::new(sample_rate)
            .analyze(&mono)
            .unwrap_or_else(|| {
                tracing::warn!(
                    fallback_bpm = self.fallback_bpm,
                    "No tempo detected, using fallback"
                );
                TempoEstimate {
                    bpm: self.fallback_bpm,
                    beat_times: Vec::new(),
                    confidence: 0.0,
                }
            })
    }

    fn detect_key(&self, waveform: &Waveform, sample_rate: u32) -> PitchClass {
        let mono = downmix_to_mono(waveform.samples(), waveform.channels() as usize);
        let detected = KeyAnalyzer::new(sample_rate).analyze(&mono);
        tracing::debug!(key = %detected.key, strength = detected.strength, "Key detected");
        detected.key
    }

    fn time_stretch(&self, waveform: &Waveform, ratio: f64) -> Result<Waveform, MixError> {
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(MixError::Transform(format!("invalid stretch ratio {ratio}")));
        }

        let vocoder = PhaseVocoder::new(self.stretch);
        waveform.map_channels(|channel| Ok::<_, MixError>(vocoder.stretch(channel, ratio)))
    }

    fn pitch_shift(
        &self,
        waveform: &Waveform,
        _sample_rate: u32,
        semitones: i32,
    ) -> Result<Waveform, MixError> {
        let shifted = PitchShifter::new(self.stretch).shift(&waveform.to_channels(), semitones as f64)?;
        Ok(Waveform::from_channels(&shifted))
    }

    fn resample(
        &self,
        waveform: &Waveform,
        from_rate: u32,
        to_rate: u32,
    ) -> Result<Waveform, MixError> {
        let resampled = resample_rate(&waveform.to_channels(), from_rate, to_rate)?;
        Ok(Waveform::from_channels(&resampled))
    }
}

impl AudioFileIo for NativeEngine {
    fn read_audio_file(&self, path: &Path) -> Result<Decoded, MixError> {
        let audio = self
            .loader
            .load(path)
            .map_err(|e| MixError::decode(path, e))?;

        Ok(Decoded {
            waveform: Waveform::new(audio.samples, audio.channels),
            sample_rate: audio.sample_rate,
        })
    }

    fn write_audio_file(
        &self,
        path: &Path,
        waveform: &Waveform,
        sample_rate: u32,
        bit_depth: BitDepth,
    ) -> Result<(), MixError> {
        self.writer.write(
            path,
            waveform.samples(),
            waveform.channels(),
            sample_rate,
            bit_depth,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_tempo_for_silence() {
        let engine = NativeEngine::new();
        let estimate = engine.detect_tempo_and_beats(&Waveform::mono(vec![0.0; 1000]), 44100);
        assert_eq!(estimate.bpm, NativeEngine::DEFAULT_FALLBACK_BPM);
        assert!(estimate.beat_times.is_empty());
    }

    #[test]
    fn test_fallback_bpm_must_be_positive() {
        let engine = NativeEngine::new().with_fallback_bpm(-3.0).with_fallback_bpm(90.0);
        let estimate = engine.detect_tempo_and_beats(&Waveform::mono(vec![0.0; 10]), 22050);
        assert_eq!(estimate.bpm, 90.0);
    }

    #[test]
    fn test_time_stretch_stereo_length() {
        let engine = NativeEngine::new();
        let wf = Waveform::new(vec![0.0; 2 * 12000], 2);
        let stretched = engine.time_stretch(&wf, 1.5).unwrap();
        assert_eq!(stretched.channels(), 2);
        assert_eq!(stretched.frames(), 8000);
    }

    #[test]
    fn test_time_stretch_rejects_bad_ratio() {
        let engine = NativeEngine::new();
        let wf = Waveform::mono(vec![0.0; 100]);
        assert!(matches!(
            engine.time_stretch(&wf, 0.0),
            Err(MixError::Transform(_))
        ));
    }

    #[test]
    fn test_resample_and_pitch_shift_lengths() {
        let engine = NativeEngine::new();
        let wf = Waveform::new(vec![0.0; 2 * 22050], 2);

        let up = engine.resample(&wf, 22050, 44100).unwrap();
        assert_eq!(up.frames(), 44100);
        assert_eq!(up.channels(), 2);

        let shifted = engine.pitch_shift(&wf, 22050, 3).unwrap();
        assert_eq!(shifted.frames(), 22050);
    }
}
