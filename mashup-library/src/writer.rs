//! WAV encoding with all-or-nothing file creation

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while writing an audio file
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
    #[error("Encode error: {0}")]
    Encode(#[from] hound::Error),
}

/// Output sample encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitDepth {
    /// 16-bit signed PCM
    Pcm16,
    /// 24-bit signed PCM
    #[default]
    Pcm24,
    /// 32-bit IEEE float
    Float32,
}

impl BitDepth {
    /// Bits per sample on disk
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Pcm16 => 16,
            BitDepth::Pcm24 => 24,
            BitDepth::Float32 => 32,
        }
    }

    /// Bit depth for a bits-per-sample count (16, 24 or 32)
    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            16 => Some(BitDepth::Pcm16),
            24 => Some(BitDepth::Pcm24),
            32 => Some(BitDepth::Float32),
            _ => None,
        }
    }

    fn spec(self, channels: u16, sample_rate: u32) -> hound::WavSpec {
        hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: self.bits(),
            sample_format: match self {
                BitDepth::Float32 => hound::SampleFormat::Float,
                BitDepth::Pcm16 | BitDepth::Pcm24 => hound::SampleFormat::Int,
            },
        }
    }
}

/// WAV file writer
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioWriter;

impl AudioWriter {
    pub fn new() -> Self {
        Self
    }

    /// Encode interleaved samples to `path`
    ///
    /// Samples are clamped to [-1.0, 1.0]. The data is written to a hidden
    /// sibling file and renamed into place once complete, so `path` either
    /// holds the whole file or is left untouched.
    pub fn write(
        &self,
        path: &Path,
        samples: &[f32],
        channels: u16,
        sample_rate: u32,
        bit_depth: BitDepth,
    ) -> Result<(), WriteError> {
        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
        if !is_wav {
            return Err(WriteError::UnsupportedFormat(path.display().to_string()));
        }

        let partial = partial_path(path);
        let result = Self::encode(&partial, samples, channels, sample_rate, bit_depth)
            .and_then(|()| fs::rename(&partial, path).map_err(WriteError::from));

        if result.is_err() {
            let _ = fs::remove_file(&partial);
        } else {
            tracing::debug!(
                path = %path.display(),
                sample_rate,
                channels,
                bits = bit_depth.bits(),
                "Wrote audio file"
            );
        }

        result
    }

    fn encode(
        path: &Path,
        samples: &[f32],
        channels: u16,
        sample_rate: u32,
        bit_depth: BitDepth,
    ) -> Result<(), WriteError> {
        let file = BufWriter::new(fs::File::create(path)?);
        let mut writer = hound::WavWriter::new(file, bit_depth.spec(channels, sample_rate))?;

        match bit_depth {
            BitDepth::Pcm16 => {
                for &s in samples {
                    writer.write_sample(quantize(s, 16) as i16)?;
                }
            }
            BitDepth::Pcm24 => {
                for &s in samples {
                    writer.write_sample(quantize(s, 24))?;
                }
            }
            BitDepth::Float32 => {
                for &s in samples {
                    writer.write_sample(s.clamp(-1.0, 1.0))?;
                }
            }
        }

        writer.finalize()?;
        Ok(())
    }
}

/// Scale a normalized sample to a signed integer of `bits` width
fn quantize(sample: f32, bits: u32) -> i32 {
    let max = ((1i64 << (bits - 1)) - 1) as f64;
    (sample.clamp(-1.0, 1.0) as f64 * max).round() as i32
}

/// `dir/.name.partial` next to the final destination
fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.partial"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_range() {
        assert_eq!(quantize(1.0, 24), 8_388_607);
        assert_eq!(quantize(-1.0, 24), -8_388_607);
        assert_eq!(quantize(2.0, 16), 32_767);
        assert_eq!(quantize(0.0, 16), 0);
    }

    #[test]
    fn test_write_24_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let samples = vec![0.0, 0.5, -0.5, 1.5];

        AudioWriter::new()
            .write(&path, &samples, 2, 22050, BitDepth::Pcm24)
            .unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.bits_per_sample, 24);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 22050);

        let read: Vec<i32> = reader.samples::<i32>().map(|s| s.unwrap()).collect();
        assert_eq!(read.len(), 4);
        assert_eq!(read[3], 8_388_607);
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn test_non_wav_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp3");
        let err = AudioWriter::new()
            .write(&path, &[0.0], 1, 44100, BitDepth::Pcm24)
            .unwrap_err();
        assert!(matches!(err, WriteError::UnsupportedFormat(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_unwritable_destination_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.wav");
        let err = AudioWriter::new()
            .write(&path, &[0.0, 0.1], 1, 44100, BitDepth::Pcm16)
            .unwrap_err();
        assert!(matches!(err, WriteError::Io(_)));
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn test_bit_depth_from_bits() {
        assert_eq!(BitDepth::from_bits(24), Some(BitDepth::Pcm24));
        assert_eq!(BitDepth::from_bits(8), None);
        assert_eq!(BitDepth::default().bits(), 24);
    }
}
