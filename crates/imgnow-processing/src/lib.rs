//! imgnow media processing
//!
//! Classification of uploads by declared content type, synchronous image
//! compression, and the ffmpeg-backed video transcoder run by the worker pool.

pub mod classifier;
#[cfg(feature = "image")]
pub mod compression;
#[cfg(feature = "video")]
pub mod transcoder;

pub use classifier::MediaClassifier;
#[cfg(feature = "image")]
pub use compression::{target_dimensions, CompressionError, ImageCompressor};
#[cfg(feature = "video")]
pub use transcoder::{FfmpegTranscoder, Transcoder};
