//! Audio file loading and decoding

use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Errors that can occur during track loading
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<SymphoniaError> for LoadError {
    fn from(err: SymphoniaError) -> Self {
        match err {
            SymphoniaError::IoError(e) => LoadError::Io(e),
            SymphoniaError::Unsupported(what) => LoadError::UnsupportedFormat(what.to_string()),
            other => LoadError::Decode(other.to_string()),
        }
    }
}

/// A decoded audio file at its native sample rate
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples (f32, normalized to -1.0 to 1.0)
    pub samples: Vec<f32>,
    /// Native sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
}

impl DecodedAudio {
    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Audio file loader using Symphonia
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioLoader;

impl AudioLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load and decode an audio file without resampling
    pub fn load(&self, path: &Path) -> Result<DecodedAudio, LoadError> {
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create hint from file extension
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;

        let mut format = probed.format;

        // Find first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(LoadError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut sample_rate = codec_params.sample_rate;
        let mut channels = codec_params.channels.map(|c| c.count() as u16);

        let mut decoder =
            symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

        let mut samples: Vec<f32> = Vec::new();
        let mut skipped_packets = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(_)) => {
                    // Corrupt packets are dropped, the rest of the stream is still usable
                    skipped_packets += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            sample_rate.get_or_insert(spec.rate);
            channels.get_or_insert(spec.channels.count() as u16);

            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        if skipped_packets > 0 {
            tracing::warn!(path = %path.display(), skipped_packets, "Skipped undecodable packets");
        }

        let sample_rate = sample_rate
            .filter(|&sr| sr > 0)
            .ok_or_else(|| LoadError::Decode("stream has no sample rate".into()))?;
        let channels = channels
            .filter(|&c| c > 0)
            .ok_or_else(|| LoadError::Decode("stream has no channels".into()))?;

        if samples.len() < channels as usize {
            return Err(LoadError::Decode("stream decoded to zero samples".into()));
        }

        let audio = DecodedAudio {
            samples,
            sample_rate,
            channels,
        };

        tracing::debug!(
            path = %path.display(),
            sample_rate,
            channels,
            duration_secs = audio.duration_secs(),
            "Decoded audio file"
        );

        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AudioLoader::new()
            .load(Path::new("/definitely/not/here.wav"))
            .unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }

    #[test]
    fn test_garbage_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.xyz");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&[0x13u8; 4096]).unwrap();

        let err = AudioLoader::new().load(&path).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(_)), "{err:?}");
    }

    #[test]
    fn test_decoded_audio_frames() {
        let audio = DecodedAudio {
            samples: vec![0.0; 96000],
            sample_rate: 48000,
            channels: 2,
        };
        assert_eq!(audio.frames(), 48000);
        assert!((audio.duration_secs() - 1.0).abs() < 1e-9);
    }
}
