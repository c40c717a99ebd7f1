//! Error taxonomy for loading, conforming and writing tracks

use crate::mixer::MixStage;
use mashup_analysis::KeyError;
use mashup_library::{LoadError, WriteError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by tracks, the mixer and the DSP engine
///
/// None of these are transient; nothing is retried.
#[derive(Error, Debug)]
pub enum MixError {
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid mode {value:?}, expected one of: {expected}")]
    InvalidMode {
        value: String,
        expected: &'static str,
    },
    #[error("Invalid key: {0}")]
    InvalidKey(#[from] KeyError),
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),
    #[error("Invalid tempo: {0}")]
    InvalidTempo(f64),
    #[error("Output path has no file extension: {0}")]
    InvalidPath(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Mixer is at stage {actual:?}, this step requires {expected:?}")]
    Sequencing { expected: MixStage, actual: MixStage },
    #[error("Transform failed: {0}")]
    Transform(String),
    #[error("Mix failed while {stage}: {source}")]
    StageFailed {
        stage: &'static str,
        #[source]
        source: Box<MixError>,
    },
}

impl MixError {
    /// Decode failure for a given source
    pub fn decode(path: impl Into<PathBuf>, err: LoadError) -> Self {
        match err {
            LoadError::UnsupportedFormat(what) => MixError::UnsupportedFormat(what),
            other => MixError::Decode {
                path: path.into(),
                reason: other.to_string(),
            },
        }
    }

    /// The underlying error, unwrapping any stage context
    pub fn root(&self) -> &MixError {
        match self {
            MixError::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<WriteError> for MixError {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::Io(e) => MixError::Io(e),
            WriteError::UnsupportedFormat(what) => MixError::UnsupportedFormat(what),
            WriteError::Encode(e) => MixError::Io(std::io::Error::other(e.to_string())),
        }
    }
}
