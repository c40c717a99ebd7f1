//! Interleaved multi-channel sample buffer

/// Interleaved f32 samples with a channel count
///
/// Lengths are always measured in frames (samples per channel).
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    channels: u16,
}

impl Waveform {
    /// Wrap interleaved samples. A trailing partial frame is dropped.
    pub fn new(mut samples: Vec<f32>, channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        Self { samples, channels }
    }

    /// Single-channel waveform
    pub fn mono(samples: Vec<f32>) -> Self {
        Self::new(samples, 1)
    }

    /// Interleave per-channel buffers, truncating to the shortest
    pub fn from_channels(channels: &[Vec<f32>]) -> Self {
        let count = channels.len().max(1);
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        let mut samples = Vec::with_capacity(frames * count);
        for frame in 0..frames {
            for channel in channels {
                samples.push(channel[frame]);
            }
        }
        Self {
            samples,
            channels: count as u16,
        }
    }

    /// Split into one buffer per channel
    pub fn to_channels(&self) -> Vec<Vec<f32>> {
        let count = self.channels as usize;
        (0..count)
            .map(|ch| self.samples.iter().skip(ch).step_by(count).copied().collect())
            .collect()
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Raw interleaved samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Sample at `frame` for output channel `channel`, zero past the end.
    ///
    /// Narrower waveforms wrap their channels (`channel mod channels`), so a
    /// mono source feeds every output channel.
    pub fn sample_or_silence(&self, frame: usize, channel: usize) -> f32 {
        let count = self.channels as usize;
        self.samples
            .get(frame * count + channel % count)
            .copied()
            .unwrap_or(0.0)
    }

    /// Apply `f` to each channel independently and re-interleave the results
    pub fn map_channels<E>(
        &self,
        mut f: impl FnMut(&[f32]) -> Result<Vec<f32>, E>,
    ) -> Result<Self, E> {
        let processed = self
            .to_channels()
            .iter()
            .map(|channel| f(channel))
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Self::from_channels(&processed))
    }

    /// Scale every sample by `gain`
    pub fn scale(&mut self, gain: f32) {
        for s in &mut self.samples {
            *s *= gain;
        }
    }
}

/// Force a buffer to exactly `len` samples, zero-padding or truncating the end
pub(crate) fn fix_length(mut samples: Vec<f32>, len: usize) -> Vec<f32> {
    samples.resize(len, 0.0);
    samples
}
