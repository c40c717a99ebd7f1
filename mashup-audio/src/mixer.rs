//! Mixer implementation - conform two tracks and overlay them
//!
//! Stages run strictly forward:
//! `Loaded -> SampleRateMatched -> TempoMatched -> KeyMatched -> Overlaid -> Written`.

use crate::engine::{AudioFileIo, DspEngine};
use crate::error::MixError;
use crate::track::{require_extension, Track};
use crate::waveform::Waveform;
use mashup_analysis::PitchClass;
use mashup_library::BitDepth;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Pipeline position of a [`Mixer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixStage {
    Loaded,
    SampleRateMatched,
    TempoMatched,
    KeyMatched,
    Overlaid,
    Written,
}

/// Which tempo both tracks converge on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TempoMode {
    /// The faster track is master
    #[default]
    Faster,
    /// The slower track is master
    Slower,
    /// Both tracks move to the arithmetic mean
    Mean,
}

/// Which key both tracks converge on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    /// The track with the greater pitch-class index is master
    #[default]
    Higher,
    /// The track with the lesser pitch-class index is master
    Lower,
    /// Both tracks move to `floor((i1 + i2) / 2)`
    Mean,
}

impl TempoMode {
    const EXPECTED: &'static str = "faster, slower, mean";
}

impl KeyMode {
    const EXPECTED: &'static str = "higher, lower, mean";
}

impl FromStr for TempoMode {
    type Err = MixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "faster" => Ok(Self::Faster),
            "slower" => Ok(Self::Slower),
            "mean" => Ok(Self::Mean),
            _ => Err(MixError::InvalidMode {
                value: s.to_string(),
                expected: Self::EXPECTED,
            }),
        }
    }
}

impl FromStr for KeyMode {
    type Err = MixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "higher" => Ok(Self::Higher),
            "lower" => Ok(Self::Lower),
            "mean" => Ok(Self::Mean),
            _ => Err(MixError::InvalidMode {
                value: s.to_string(),
                expected: Self::EXPECTED,
            }),
        }
    }
}

impl fmt::Display for TempoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Faster => "faster",
            Self::Slower => "slower",
            Self::Mean => "mean",
        })
    }
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Higher => "higher",
            Self::Lower => "lower",
            Self::Mean => "mean",
        })
    }
}

/// What to do when the summed signal exceeds full scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipPolicy {
    /// Leave the sum as is; the writer clamps at encode time
    #[default]
    None,
    /// Divide by the peak absolute amplitude when it is above zero
    Normalize,
}

/// Output settings for a mix
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MixOptions {
    pub clip_policy: ClipPolicy,
    pub bit_depth: BitDepth,
}

/// One of the two tracks owned by a mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSlot {
    First,
    Second,
}

/// Which side of a comparison becomes master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    Greater,
    Lesser,
}

/// Pick `(master, servant)` from the two tracks' feature values. Ties go to the first track.
pub fn select_master<T: PartialOrd>(first: T, second: T, preference: Preference) -> (TrackSlot, TrackSlot) {
    let second_wins = match preference {
        Preference::Greater => second > first,
        Preference::Lesser => second < first,
    };
    if second_wins {
        (TrackSlot::Second, TrackSlot::First)
    } else {
        (TrackSlot::First, TrackSlot::Second)
    }
}

/// Two-track mixer, single use
pub struct Mixer<'e, E: ?Sized> {
    engine: &'e E,
    tracks: [Track; 2],
    options: MixOptions,
    stage: MixStage,
    sample_rate: Option<u32>,
    combined: Option<Waveform>,
}

impl<'e, E> Mixer<'e, E>
where
    E: DspEngine + AudioFileIo + ?Sized,
{
    /// Load and analyse both tracks
    pub fn new(
        first: impl AsRef<Path>,
        second: impl AsRef<Path>,
        engine: &'e E,
        options: MixOptions,
    ) -> Result<Self, MixError> {
        let first = Track::load(first, engine)?;
        let second = Track::load(second, engine)?;
        Ok(Self::from_tracks(first, second, engine, options))
    }

    /// Start a mix from already-loaded tracks
    pub fn from_tracks(first: Track, second: Track, engine: &'e E, options: MixOptions) -> Self {
        Self {
            engine,
            tracks: [first, second],
            options,
            stage: MixStage::Loaded,
            sample_rate: None,
            combined: None,
        }
    }

    pub fn stage(&self) -> MixStage {
        self.stage
    }

    pub fn options(&self) -> &MixOptions {
        &self.options
    }

    pub fn tracks(&self) -> (&Track, &Track) {
        (&self.tracks[0], &self.tracks[1])
    }

    pub fn track(&self, slot: TrackSlot) -> &Track {
        &self.tracks[index(slot)]
    }

    /// Common sample rate, once matched
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Overlaid waveform, once built
    pub fn combined(&self) -> Option<&Waveform> {
        self.combined.as_ref()
    }

    /// Give back the (possibly conformed) tracks
    pub fn into_tracks(self) -> (Track, Track) {
        let [first, second] = self.tracks;
        (first, second)
    }

    fn require(&self, expected: MixStage) -> Result<(), MixError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(MixError::Sequencing {
                expected,
                actual: self.stage,
            })
        }
    }

    /// Resample the lower-rate track up to the higher rate
    pub fn match_sample_rate(&mut self) -> Result<(), MixError> {
        self.require(MixStage::Loaded)?;

        let target = self.tracks[0].sample_rate().max(self.tracks[1].sample_rate());
        for track in &mut self.tracks {
            if track.sample_rate() != target {
                tracing::info!(
                    source = %track.source().display(),
                    from = track.sample_rate(),
                    to = target,
                    "Resampling track"
                );
            }
            track.change_sample_rate(target, self.engine)?;
        }

        self.sample_rate = Some(target);
        self.stage = MixStage::SampleRateMatched;
        Ok(())
    }

    /// Bring both tracks to one tempo
    pub fn match_tempo(&mut self, mode: TempoMode) -> Result<(), MixError> {
        self.require(MixStage::SampleRateMatched)?;

        let (t1, t2) = (self.tracks[0].tempo(), self.tracks[1].tempo());
        match mode {
            TempoMode::Faster | TempoMode::Slower => {
                let preference = if mode == TempoMode::Faster {
                    Preference::Greater
                } else {
                    Preference::Lesser
                };
                let (master, servant) = select_master(t1, t2, preference);
                let target = self.tracks[index(master)].tempo();
                tracing::info!(
                    %mode,
                    ?master,
                    ?servant,
                    target,
                    ratio = target / self.tracks[index(servant)].tempo(),
                    "Matching tempo"
                );
                self.tracks[index(servant)].change_tempo(target, self.engine)?;
            }
            TempoMode::Mean => {
                let target = (t1 + t2) / 2.0;
                tracing::info!(%mode, t1, t2, target, "Matching tempo");
                let mut conformed = self.tracks.clone();
                for track in &mut conformed {
                    track.change_tempo(target, self.engine)?;
                }
                self.tracks = conformed;
            }
        }

        self.stage = MixStage::TempoMatched;
        Ok(())
    }

    /// Bring both tracks to one key
    pub fn match_key(&mut self, mode: KeyMode) -> Result<(), MixError> {
        self.require(MixStage::TempoMatched)?;

        let (k1, k2) = (self.tracks[0].key(), self.tracks[1].key());
        match mode {
            KeyMode::Higher | KeyMode::Lower => {
                let preference = if mode == KeyMode::Higher {
                    Preference::Greater
                } else {
                    Preference::Lesser
                };
                let (master, servant) = select_master(k1.index(), k2.index(), preference);
                let target = self.tracks[index(master)].key();
                tracing::info!(
                    %mode,
                    ?master,
                    ?servant,
                    %target,
                    shift = self.tracks[index(servant)].key().shift_to(target),
                    "Matching key"
                );
                self.tracks[index(servant)].change_key(target, self.engine)?;
            }
            KeyMode::Mean => {
                let target = PitchClass::wrapping((k1.index() as i32 + k2.index() as i32) / 2);
                tracing::info!(%mode, %k1, %k2, %target, "Matching key");
                let mut conformed = self.tracks.clone();
                for track in &mut conformed {
                    track.change_key(target, self.engine)?;
                }
                self.tracks = conformed;
            }
        }

        self.stage = MixStage::KeyMatched;
        Ok(())
    }

    /// Sum both tracks, zero-padding the shorter one at the end
    pub fn overlay(&mut self) -> Result<(), MixError> {
        self.require(MixStage::KeyMatched)?;

        let (a, b) = (self.tracks[0].waveform(), self.tracks[1].waveform());
        let frames = a.frames().max(b.frames());
        let channels = a.channels().max(b.channels());
        let (shorter, pad) = if a.frames() < b.frames() {
            (TrackSlot::First, b.frames() - a.frames())
        } else {
            (TrackSlot::Second, a.frames() - b.frames())
        };

        let width = channels as usize;
        let mut samples = Vec::with_capacity(frames * width);
        for frame in 0..frames {
            for channel in 0..width {
                samples.push(a.sample_or_silence(frame, channel) + b.sample_or_silence(frame, channel));
            }
        }
        let mut combined = Waveform::new(samples, channels);

        let peak = combined.peak();
        if self.options.clip_policy == ClipPolicy::Normalize && peak > 0.0 {
            combined.scale(1.0 / peak);
        } else if peak > 1.0 {
            tracing::warn!(peak, "Mix exceeds full scale and will clip");
        }

        tracing::info!(?shorter, pad, frames, channels, peak, "Overlaid tracks");

        self.combined = Some(combined);
        self.stage = MixStage::Overlaid;
        Ok(())
    }

    /// Encode the combined waveform at the matched sample rate
    pub fn write(&mut self, path: impl AsRef<Path>) -> Result<(), MixError> {
        self.require(MixStage::Overlaid)?;
        let path = path.as_ref();
        require_extension(path)?;

        let (Some(combined), Some(sample_rate)) = (&self.combined, self.sample_rate) else {
            return Err(MixError::Sequencing {
                expected: MixStage::Overlaid,
                actual: self.stage,
            });
        };
        self.engine
            .write_audio_file(path, combined, sample_rate, self.options.bit_depth)?;
        tracing::info!(path = %path.display(), sample_rate, "Wrote mix");

        self.stage = MixStage::Written;
        Ok(())
    }

    /// Run the whole pipeline, naming the stage that failed
    pub fn mix(
        &mut self,
        path: impl AsRef<Path>,
        tempo_mode: TempoMode,
        key_mode: KeyMode,
    ) -> Result<(), MixError> {
        self.match_sample_rate()
            .map_err(|e| stage_failed("matching sample rate", e))?;
        self.match_tempo(tempo_mode)
            .map_err(|e| stage_failed("matching tempo", e))?;
        self.match_key(key_mode)
            .map_err(|e| stage_failed("matching key", e))?;
        self.overlay().map_err(|e| stage_failed("overlaying", e))?;
        self.write(path).map_err(|e| stage_failed("writing", e))
    }
}

fn index(slot: TrackSlot) -> usize {
    match slot {
        TrackSlot::First => 0,
        TrackSlot::Second => 1,
    }
}

fn stage_failed(stage: &'static str, source: MixError) -> MixError {
    MixError::StageFailed {
        stage,
        source: Box::new(source),
    }
}
