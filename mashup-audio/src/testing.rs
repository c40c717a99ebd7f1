//! Deterministic in-memory engine for Track and Mixer tests

use crate::engine::{AudioFileIo, Decoded, DspEngine};
use crate::error::MixError;
use crate::track::Track;
use crate::waveform::Waveform;
use mashup_analysis::{PitchClass, TempoEstimate};
use mashup_library::BitDepth;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

struct Asset {
    decoded: Decoded,
    tempo: f64,
    key: PitchClass,
}

#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub path: PathBuf,
    pub frames: usize,
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: BitDepth,
}

/// Transforms resize by nearest-neighbour so lengths are exact and cheap
#[derive(Default)]
pub struct FakeEngine {
    assets: HashMap<PathBuf, Asset>,
    analysing: RefCell<Option<(f64, PitchClass)>>,
    fail_transforms: bool,
    /// Transforms start failing once this many have succeeded
    fail_after: Option<usize>,
    transform_calls: Cell<usize>,
    fail_writes: bool,
    pitch_shifts: RefCell<Vec<i32>>,
    stretches: RefCell<Vec<f64>>,
    writes: RefCell<Vec<RecordedWrite>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mono ramp asset with preset analysis results
    pub fn with_asset(
        self,
        path: &str,
        frames: usize,
        sample_rate: u32,
        tempo: f64,
        key: PitchClass,
    ) -> Self {
        self.with_waveform(path, ramp(frames, 1), sample_rate, tempo, key)
    }

    pub fn with_waveform(
        mut self,
        path: &str,
        waveform: Waveform,
        sample_rate: u32,
        tempo: f64,
        key: PitchClass,
    ) -> Self {
        self.assets.insert(
            PathBuf::from(path),
            Asset {
                decoded: Decoded {
                    waveform,
                    sample_rate,
                },
                tempo,
                key,
            },
        );
        self
    }

    pub fn failing_transforms(mut self) -> Self {
        self.fail_transforms = true;
        self
    }

    pub fn failing_after(mut self, successes: usize) -> Self {
        self.fail_after = Some(successes);
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn pitch_shifts(&self) -> Vec<i32> {
        self.pitch_shifts.borrow().clone()
    }

    pub fn stretches(&self) -> Vec<f64> {
        self.stretches.borrow().clone()
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.borrow().clone()
    }

    fn check(&self) -> Result<(), MixError> {
        let calls = self.transform_calls.get();
        self.transform_calls.set(calls + 1);
        if self.fail_transforms || self.fail_after.is_some_and(|n| calls >= n) {
            Err(MixError::Transform("fake engine failure".into()))
        } else {
            Ok(())
        }
    }
}

impl DspEngine for FakeEngine {
    fn decode(&self, path: &Path) -> Result<Decoded, MixError> {
        self.read_audio_file(path)
    }

    fn detect_tempo_and_beats(&self, _waveform: &Waveform, _sample_rate: u32) -> TempoEstimate {
        let bpm = self.analysing.borrow().map_or(120.0, |(bpm, _)| bpm);
        TempoEstimate {
            bpm,
            beat_times: vec![0.0, 60.0 / bpm],
            confidence: 1.0,
        }
    }

    fn detect_key(&self, _waveform: &Waveform, _sample_rate: u32) -> PitchClass {
        self.analysing.borrow().map_or(PitchClass::C, |(_, key)| key)
    }

    fn time_stretch(&self, waveform: &Waveform, ratio: f64) -> Result<Waveform, MixError> {
        self.check()?;
        self.stretches.borrow_mut().push(ratio);
        let frames = (waveform.frames() as f64 / ratio).round() as usize;
        Ok(resize(waveform, frames))
    }

    fn pitch_shift(
        &self,
        waveform: &Waveform,
        _sample_rate: u32,
        semitones: i32,
    ) -> Result<Waveform, MixError> {
        self.check()?;
        self.pitch_shifts.borrow_mut().push(semitones);
        Ok(waveform.clone())
    }

    fn resample(
        &self,
        waveform: &Waveform,
        from_rate: u32,
        to_rate: u32,
    ) -> Result<Waveform, MixError> {
        self.check()?;
        let frames = (waveform.frames() as f64 * to_rate as f64 / from_rate as f64).round() as usize;
        Ok(resize(waveform, frames))
    }
}

impl AudioFileIo for FakeEngine {
    fn read_audio_file(&self, path: &Path) -> Result<Decoded, MixError> {
        let asset = self.assets.get(path).ok_or_else(|| MixError::Decode {
            path: path.to_path_buf(),
            reason: "no such asset".into(),
        })?;
        *self.analysing.borrow_mut() = Some((asset.tempo, asset.key));
        Ok(asset.decoded.clone())
    }

    fn write_audio_file(
        &self,
        path: &Path,
        waveform: &Waveform,
        sample_rate: u32,
        bit_depth: BitDepth,
    ) -> Result<(), MixError> {
        if self.fail_writes {
            return Err(MixError::Io(std::io::Error::other("disk full")));
        }
        self.writes.borrow_mut().push(RecordedWrite {
            path: path.to_path_buf(),
            frames: waveform.frames(),
            channels: waveform.channels(),
            sample_rate,
            bit_depth,
        });
        Ok(())
    }
}

/// Interleaved ramp in (0, 1), identical on every channel
pub fn ramp(frames: usize, channels: u16) -> Waveform {
    let samples = (0..frames)
        .flat_map(|i| {
            let v = (i + 1) as f32 / (frames + 1) as f32;
            std::iter::repeat(v).take(channels as usize)
        })
        .collect();
    Waveform::new(samples, channels)
}

pub fn fake_track(frames: usize, sample_rate: u32, tempo: f64, key: PitchClass) -> Track {
    Track::from_parts("fake.wav", ramp(frames, 1), sample_rate, tempo, key, Vec::new())
        .expect("valid fake track")
}

fn resize(waveform: &Waveform, frames: usize) -> Waveform {
    let source = waveform.frames();
    let channels = waveform.channels() as usize;
    let samples = (0..frames)
        .flat_map(|i| {
            let src = if frames == 0 { 0 } else { i * source / frames };
            (0..channels).map(move |c| waveform.sample_or_silence(src, c))
        })
        .collect();
    Waveform::new(samples, waveform.channels())
}
