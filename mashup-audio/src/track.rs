//! A single audio asset and its analysed features
//!
//! Every feature-changing operation builds the new waveform first and commits
//! it together with the matching metadata, so a Track never exposes a
//! waveform that disagrees with its sample rate, tempo or key.

use crate::engine::{AudioFileIo, DspEngine};
use crate::error::MixError;
use crate::waveform::Waveform;
use mashup_analysis::PitchClass;
use mashup_library::BitDepth;
use std::path::{Path, PathBuf};

/// Options for writing a track to disk
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Rewrite the file stem as `<stem>_<bpm>bpm_<key>`
    pub tag_filename: bool,
    pub bit_depth: BitDepth,
}

/// One loaded and analysed audio asset
#[derive(Debug, Clone)]
pub struct Track {
    source: PathBuf,
    waveform: Waveform,
    sample_rate: u32,
    tempo: f64,
    key: PitchClass,
    beat_times: Vec<f64>,
}

impl Track {
    /// Decode and analyse an audio file
    pub fn load<E: DspEngine + ?Sized>(path: impl AsRef<Path>, engine: &E) -> Result<Self, MixError> {
        let path = path.as_ref();
        let decoded = engine.decode(path)?;
        if decoded.waveform.is_empty() {
            return Err(MixError::Decode {
                path: path.to_path_buf(),
                reason: "no audio samples".into(),
            });
        }

        let estimate = engine.detect_tempo_and_beats(&decoded.waveform, decoded.sample_rate);
        let key = engine.detect_key(&decoded.waveform, decoded.sample_rate);

        let track = Self::from_parts(
            path,
            decoded.waveform,
            decoded.sample_rate,
            estimate.bpm,
            key,
            estimate.beat_times,
        )?;

        tracing::info!(
            path = %path.display(),
            sample_rate = track.sample_rate,
            channels = track.waveform.channels(),
            duration_secs = track.duration_secs(),
            tempo = track.tempo,
            key = %track.key,
            beats = track.beat_times.len(),
            "Loaded track"
        );

        Ok(track)
    }

    /// Build a track from already-analysed data
    pub fn from_parts(
        source: impl Into<PathBuf>,
        waveform: Waveform,
        sample_rate: u32,
        tempo: f64,
        key: PitchClass,
        beat_times: Vec<f64>,
    ) -> Result<Self, MixError> {
        let source = source.into();
        if waveform.is_empty() {
            return Err(MixError::Decode {
                path: source,
                reason: "no audio samples".into(),
            });
        }
        if sample_rate == 0 {
            return Err(MixError::InvalidSampleRate(sample_rate));
        }
        if !(tempo.is_finite() && tempo > 0.0) {
            return Err(MixError::InvalidTempo(tempo));
        }

        let mut beat_times = beat_times;
        beat_times.sort_by(f64::total_cmp);

        Ok(Self {
            source,
            waveform,
            sample_rate,
            tempo,
            key,
            beat_times,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn waveform(&self) -> &Waveform {
        &self.waveform
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Tempo in BPM
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn key(&self) -> PitchClass {
        self.key
    }

    /// Beat timestamps in seconds
    pub fn beat_times(&self) -> &[f64] {
        &self.beat_times
    }

    /// Length in frames
    pub fn frames(&self) -> usize {
        self.waveform.frames()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Time-stretch to `new_tempo` BPM, keeping pitch
    pub fn change_tempo<E: DspEngine + ?Sized>(
        &mut self,
        new_tempo: f64,
        engine: &E,
    ) -> Result<(), MixError> {
        if !(new_tempo.is_finite() && new_tempo > 0.0) {
            return Err(MixError::InvalidTempo(new_tempo));
        }

        let ratio = new_tempo / self.tempo;
        if ratio == 1.0 {
            return Ok(());
        }

        let waveform = engine.time_stretch(&self.waveform, ratio)?;
        tracing::debug!(
            from = self.tempo,
            to = new_tempo,
            ratio,
            frames = waveform.frames(),
            "Tempo changed"
        );

        self.waveform = waveform;
        self.tempo = new_tempo;
        for t in &mut self.beat_times {
            *t /= ratio;
        }
        Ok(())
    }

    /// Pitch-shift to `new_key` by the shortest rotation, keeping duration
    pub fn change_key<E: DspEngine + ?Sized>(
        &mut self,
        new_key: PitchClass,
        engine: &E,
    ) -> Result<(), MixError> {
        let shift = self.key.shift_to(new_key);
        if shift == 0 {
            return Ok(());
        }

        let waveform = engine.pitch_shift(&self.waveform, self.sample_rate, shift)?;
        tracing::debug!(from = %self.key, to = %new_key, shift, "Key changed");

        self.waveform = waveform;
        self.key = new_key;
        Ok(())
    }

    /// Pitch-shift to a key given by name ("C#", "Eb", ...)
    pub fn change_key_named<E: DspEngine + ?Sized>(
        &mut self,
        new_key: &str,
        engine: &E,
    ) -> Result<(), MixError> {
        let key: PitchClass = new_key.parse()?;
        self.change_key(key, engine)
    }

    /// Resample to `new_rate` Hz
    pub fn change_sample_rate<E: DspEngine + ?Sized>(
        &mut self,
        new_rate: u32,
        engine: &E,
    ) -> Result<(), MixError> {
        if new_rate == 0 {
            return Err(MixError::InvalidSampleRate(new_rate));
        }
        if new_rate == self.sample_rate {
            return Ok(());
        }

        let waveform = engine.resample(&self.waveform, self.sample_rate, new_rate)?;
        tracing::debug!(from = self.sample_rate, to = new_rate, "Sample rate changed");

        self.waveform = waveform;
        self.sample_rate = new_rate;
        Ok(())
    }

    /// Path the track would be written to under `options`
    pub fn output_path(&self, path: &Path, options: &WriteOptions) -> Result<PathBuf, MixError> {
        let ext = require_extension(path)?;
        if !options.tag_filename {
            return Ok(path.to_path_buf());
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tagged = format!(
            "{stem}_{bpm}bpm_{key}.{ext}",
            bpm = self.tempo.round() as i64,
            key = self.key,
            ext = ext.to_string_lossy()
        );
        Ok(path.with_file_name(tagged))
    }

    /// Encode the track, returning the path actually written
    pub fn write_out<F: AudioFileIo + ?Sized>(
        &self,
        path: impl AsRef<Path>,
        options: WriteOptions,
        io: &F,
    ) -> Result<PathBuf, MixError> {
        let target = self.output_path(path.as_ref(), &options)?;
        io.write_audio_file(&target, &self.waveform, self.sample_rate, options.bit_depth)?;
        tracing::info!(path = %target.display(), "Wrote track");
        Ok(target)
    }
}

/// Extension of an output path, or `InvalidPath` when it has none
pub(crate) fn require_extension(path: &Path) -> Result<&std::ffi::OsStr, MixError> {
    path.extension()
        .filter(|ext| !ext.is_empty())
        .ok_or_else(|| MixError::InvalidPath(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_track, FakeEngine};

    #[test]
    fn test_from_parts_validates() {
        let wf = Waveform::mono(vec![0.0; 10]);
        assert!(matches!(
            Track::from_parts("a", wf.clone(), 0, 120.0, PitchClass::C, vec![]),
            Err(MixError::InvalidSampleRate(0))
        ));
        assert!(matches!(
            Track::from_parts("a", wf.clone(), 44100, 0.0, PitchClass::C, vec![]),
            Err(MixError::InvalidTempo(_))
        ));
        assert!(matches!(
            Track::from_parts("a", Waveform::mono(vec![]), 44100, 120.0, PitchClass::C, vec![]),
            Err(MixError::Decode { .. })
        ));
        let track =
            Track::from_parts("a", wf, 44100, 120.0, PitchClass::C, vec![2.0, 1.0]).unwrap();
        assert_eq!(track.beat_times(), &[1.0, 2.0]);
    }

    #[test]
    fn test_load_through_engine() {
        let engine = FakeEngine::new().with_asset("song.wav", 1000, 22050, 128.0, PitchClass::E);
        let track = Track::load("song.wav", &engine).unwrap();
        assert_eq!(track.frames(), 1000);
        assert_eq!(track.sample_rate(), 22050);
        assert_eq!(track.tempo(), 128.0);
        assert_eq!(track.key(), PitchClass::E);
    }

    #[test]
    fn test_load_unknown_asset_fails() {
        let engine = FakeEngine::new();
        assert!(matches!(
            Track::load("missing.wav", &engine),
            Err(MixError::Decode { .. })
        ));
    }

    #[test]
    fn test_change_tempo_updates_waveform_and_beats() {
        let engine = FakeEngine::new();
        let mut track = fake_track(1200, 44100, 100.0, PitchClass::C);
        track.beat_times = vec![0.6, 1.2];

        track.change_tempo(120.0, &engine).unwrap();

        assert_eq!(track.tempo(), 120.0);
        assert_eq!(track.frames(), 1000);
        assert!((track.beat_times()[0] - 0.5).abs() < 1e-12);
        assert!((track.beat_times()[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_change_tempo_rejects_non_positive() {
        let engine = FakeEngine::new();
        let mut track = fake_track(100, 44100, 100.0, PitchClass::C);
        assert!(matches!(
            track.change_tempo(0.0, &engine),
            Err(MixError::InvalidTempo(_))
        ));
        assert!(matches!(
            track.change_tempo(f64::NAN, &engine),
            Err(MixError::InvalidTempo(_))
        ));
        assert_eq!(track.tempo(), 100.0);
    }

    #[test]
    fn test_failed_transform_leaves_track_untouched() {
        let engine = FakeEngine::new().failing_transforms();
        let mut track = fake_track(100, 44100, 100.0, PitchClass::C);
        let before = track.waveform().clone();

        assert!(track.change_tempo(140.0, &engine).is_err());
        assert!(track.change_key(PitchClass::D, &engine).is_err());
        assert!(track.change_sample_rate(48000, &engine).is_err());

        assert_eq!(track.tempo(), 100.0);
        assert_eq!(track.key(), PitchClass::C);
        assert_eq!(track.sample_rate(), 44100);
        assert_eq!(track.waveform(), &before);
    }

    #[test]
    fn test_change_key_uses_minimal_rotation() {
        let engine = FakeEngine::new();
        let mut track = fake_track(100, 44100, 100.0, PitchClass::C);

        track.change_key(PitchClass::G, &engine).unwrap();
        assert_eq!(track.key(), PitchClass::G);
        assert_eq!(engine.pitch_shifts(), vec![-5]);

        track.change_key(PitchClass::CSharp, &engine).unwrap();
        assert_eq!(engine.pitch_shifts(), vec![-5, 6]);
    }

    #[test]
    fn test_change_key_idempotent() {
        let engine = FakeEngine::new();
        let mut track = fake_track(100, 44100, 100.0, PitchClass::A);

        track.change_key(PitchClass::F, &engine).unwrap();
        let once = track.waveform().clone();
        track.change_key(PitchClass::F, &engine).unwrap();

        assert_eq!(track.key(), PitchClass::F);
        assert_eq!(track.waveform(), &once);
        assert_eq!(engine.pitch_shifts().len(), 1);
    }

    #[test]
    fn test_change_key_named() {
        let engine = FakeEngine::new();
        let mut track = fake_track(100, 44100, 100.0, PitchClass::A);
        track.change_key_named("Bb", &engine).unwrap();
        assert_eq!(track.key(), PitchClass::ASharp);

        assert!(matches!(
            track.change_key_named("X", &engine),
            Err(MixError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_change_sample_rate() {
        let engine = FakeEngine::new();
        let mut track = fake_track(22050, 22050, 100.0, PitchClass::A);

        assert!(matches!(
            track.change_sample_rate(0, &engine),
            Err(MixError::InvalidSampleRate(0))
        ));

        track.change_sample_rate(44100, &engine).unwrap();
        assert_eq!(track.sample_rate(), 44100);
        assert_eq!(track.frames(), 44100);
        assert!((track.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_write_out_requires_extension() {
        let engine = FakeEngine::new();
        let track = fake_track(100, 44100, 100.0, PitchClass::A);
        assert!(matches!(
            track.write_out("output", WriteOptions::default(), &engine),
            Err(MixError::InvalidPath(_))
        ));
        assert!(engine.writes().is_empty());
    }

    #[test]
    fn test_write_out_tagged_name() {
        let engine = FakeEngine::new();
        let track = fake_track(100, 44100, 127.6, PitchClass::FSharp);
        let options = WriteOptions {
            tag_filename: true,
            ..Default::default()
        };

        let written = track.write_out("out/mix.wav", options, &engine).unwrap();
        assert_eq!(written, PathBuf::from("out/mix_128bpm_F#.wav"));

        let writes = engine.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].path, written);
        assert_eq!(writes[0].bit_depth, BitDepth::Pcm24);
        assert_eq!(writes[0].sample_rate, 44100);
    }
}
