//! Audio file I/O for mashup - decoding and WAV encoding

mod loader;
mod writer;

pub use loader::{AudioLoader, DecodedAudio, LoadError};
pub use writer::{AudioWriter, BitDepth, WriteError};
