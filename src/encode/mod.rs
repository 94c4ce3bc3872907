//! Encode-or-replay stream backends.
//!
//! A backend launches one external process per animation segment; the returned handle is
//! the frame-sink side of that process and must be stopped exactly once.

/// `ffmpeg`-based backend (raw-frame encode and cached-segment replay via system `ffmpeg`).
pub mod ffmpeg;
/// Backend and stream-handle traits, plus the in-memory backend.
pub mod sink;
