//! Livemux bridges an animation renderer to a live network transport.
//!
//! Rendered frames for one animation segment are piped into an external `ffmpeg` process
//! that multiplexes an MPEG-TS stream to a UDP multicast target, optionally duplicating
//! the encoded segment into an on-disk cache. Previously encoded segments are replayed
//! from that cache instead of being re-encoded, and the session supports seeking back
//! through the animation timeline.
//!
//! The public API is session-oriented:
//!
//! - Configure a [`StreamConfig`]
//! - Create a [`StreamSession`]
//! - Drive it with [`StreamSession::begin_animation`] / [`StreamSession::feed_frame`] /
//!   [`StreamSession::end_animation`], and seek with [`StreamSession::seek_back`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Segment cache index.
pub mod cache;
/// Stream configuration.
pub mod config;
/// Encode-or-replay stream backends.
pub mod encode;
/// Session-oriented stream control.
pub mod session;

pub use crate::cache::SegmentIndex;
pub use crate::config::{StreamConfig, TransportTarget};
pub use crate::encode::ffmpeg::{FfmpegBackend, FfmpegBackendOpts, is_ffmpeg_on_path};
pub use crate::encode::sink::{
    BackendLog, EncodeSpec, HandleMode, InMemoryBackend, StreamBackend, StreamHandle,
};
pub use crate::foundation::core::{Fingerprint, Fps, PixelFormat, RawFrame};
pub use crate::foundation::error::{LivemuxError, LivemuxResult};
pub use crate::session::{SessionMode, StreamSession};
