use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::TransportTarget;
use crate::foundation::core::{Fps, PixelFormat, RawFrame};
use crate::foundation::error::{LivemuxError, LivemuxResult};

/// Mode a stream handle was started in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleMode {
    /// Live raw-frame encode fed through the input pipe.
    Encode,
    /// Replay of a pre-encoded segment file; feeds no frames.
    Replay,
}

/// Parameters for starting a live raw-frame encode.
#[derive(Clone, Debug)]
pub struct EncodeSpec {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Input frame rate.
    pub fps: Fps,
    /// Pixel layout of the raw input frames.
    pub pix_fmt: PixelFormat,
    /// Live stream destination.
    pub transport: TransportTarget,
    /// Optional container file duplicating the encoded stream (segment persistence).
    pub out_path: Option<PathBuf>,
}

impl EncodeSpec {
    /// Validate the spec.
    pub fn validate(&self) -> LivemuxResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(LivemuxError::validation(
                "encode width/height must be non-zero",
            ));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(LivemuxError::validation(
                "encode width/height must be even (required for yuv420p segment output)",
            ));
        }
        Fps::new(self.fps.num, self.fps.den)?;
        self.transport.validate()?;
        Ok(())
    }

    /// Expected byte length of one raw input frame.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * self.pix_fmt.bytes_per_pixel()
    }
}

/// One live encode-or-replay stream: exclusive owner of the external process and its
/// input pipe.
///
/// Ordering contract: frames are delivered to the pipe in push order, with no reordering
/// or duplication within the handle's lifetime. `stop` must be called exactly once; later
/// calls are no-ops returning the cached outcome. Implementations release the process on
/// `Drop` even when `stop` was never called.
pub trait StreamHandle {
    /// Mode this handle was started in.
    fn mode(&self) -> HandleMode;

    /// Forward one raw frame to the stream input. Valid only in [`HandleMode::Encode`].
    fn push_frame(&mut self, frame: &RawFrame) -> LivemuxResult<()>;

    /// Close the input pipe (end-of-stream) and wait for the process to exit.
    fn stop(&mut self) -> LivemuxResult<()>;
}

/// Launches encode/replay streams on behalf of a session controller.
pub trait StreamBackend {
    /// Start a live raw-frame encode.
    fn start_encode(&self, spec: &EncodeSpec) -> LivemuxResult<Box<dyn StreamHandle>>;

    /// Start a one-shot replay of a pre-encoded segment file.
    fn start_replay(
        &self,
        source: &Path,
        transport: &TransportTarget,
    ) -> LivemuxResult<Box<dyn StreamHandle>>;
}

/// Shared recording of in-memory backend activity, for assertions in tests.
#[derive(Clone, Debug, Default)]
pub struct BackendLog {
    /// Encode specs in start order.
    pub encodes: Vec<EncodeSpec>,
    /// Byte sizes of frames pushed to each encode, parallel to `encodes`.
    pub frames: Vec<Vec<usize>>,
    /// Replay source paths in start order.
    pub replays: Vec<PathBuf>,
    /// Handles currently live (started, not yet stopped or dropped).
    pub live_handles: usize,
    /// High-water mark of simultaneously live handles.
    pub max_live_handles: usize,
    /// Completed `stop` calls.
    pub stops: usize,
}

/// In-memory backend for tests and debugging.
///
/// Records every start, frame push and stop into a shared [`BackendLog`] without spawning
/// any process.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBackend {
    log: Arc<Mutex<BackendLog>>,
}

impl InMemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the activity log.
    pub fn log(&self) -> BackendLog {
        lock(&self.log).clone()
    }
}

fn lock(log: &Mutex<BackendLog>) -> MutexGuard<'_, BackendLog> {
    log.lock().unwrap_or_else(|e| e.into_inner())
}

impl StreamBackend for InMemoryBackend {
    fn start_encode(&self, spec: &EncodeSpec) -> LivemuxResult<Box<dyn StreamHandle>> {
        spec.validate()?;
        let mut log = lock(&self.log);
        log.live_handles += 1;
        log.max_live_handles = log.max_live_handles.max(log.live_handles);
        let slot = log.encodes.len();
        log.encodes.push(spec.clone());
        log.frames.push(Vec::new());
        Ok(Box::new(InMemoryHandle {
            mode: HandleMode::Encode,
            log: self.log.clone(),
            slot,
            frame_len: spec.frame_len(),
            stopped: false,
        }))
    }

    fn start_replay(
        &self,
        source: &Path,
        _transport: &TransportTarget,
    ) -> LivemuxResult<Box<dyn StreamHandle>> {
        let mut log = lock(&self.log);
        log.live_handles += 1;
        log.max_live_handles = log.max_live_handles.max(log.live_handles);
        log.replays.push(source.to_path_buf());
        Ok(Box::new(InMemoryHandle {
            mode: HandleMode::Replay,
            log: self.log.clone(),
            slot: usize::MAX,
            frame_len: 0,
            stopped: false,
        }))
    }
}

struct InMemoryHandle {
    mode: HandleMode,
    log: Arc<Mutex<BackendLog>>,
    slot: usize,
    frame_len: usize,
    stopped: bool,
}

impl StreamHandle for InMemoryHandle {
    fn mode(&self) -> HandleMode {
        self.mode
    }

    fn push_frame(&mut self, frame: &RawFrame) -> LivemuxResult<()> {
        if self.mode != HandleMode::Encode {
            return Err(LivemuxError::invalid_state(
                "frames can only be fed to a live encode stream",
            ));
        }
        if self.stopped {
            return Err(LivemuxError::pipe_write("stream input pipe is closed"));
        }
        if frame.data.len() != self.frame_len {
            return Err(LivemuxError::validation(format!(
                "frame data size mismatch: got {} bytes, expected {}",
                frame.data.len(),
                self.frame_len
            )));
        }
        lock(&self.log).frames[self.slot].push(frame.data.len());
        Ok(())
    }

    fn stop(&mut self) -> LivemuxResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        let mut log = lock(&self.log);
        log.live_handles -= 1;
        log.stops += 1;
        Ok(())
    }
}

impl Drop for InMemoryHandle {
    fn drop(&mut self) {
        if !self.stopped {
            lock(&self.log).live_handles -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> EncodeSpec {
        EncodeSpec {
            width: 4,
            height: 2,
            fps: Fps { num: 30, den: 1 },
            pix_fmt: PixelFormat::Rgba,
            transport: TransportTarget::default(),
            out_path: None,
        }
    }

    #[test]
    fn spec_validation_catches_bad_values() {
        assert!(
            EncodeSpec {
                width: 0,
                ..spec()
            }
            .validate()
            .is_err()
        );
        assert!(
            EncodeSpec {
                width: 5,
                ..spec()
            }
            .validate()
            .is_err()
        );
        assert!(
            EncodeSpec {
                fps: Fps { num: 0, den: 1 },
                ..spec()
            }
            .validate()
            .is_err()
        );
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn in_memory_handle_records_frames_and_enforces_the_pipe_contract() {
        let backend = InMemoryBackend::new();
        let mut handle = backend.start_encode(&spec()).unwrap();

        let frame = RawFrame {
            width: 4,
            height: 2,
            data: vec![0u8; 32],
        };
        handle.push_frame(&frame).unwrap();
        handle.stop().unwrap();
        assert!(matches!(
            handle.push_frame(&frame),
            Err(LivemuxError::PipeWrite(_))
        ));
        // Second stop is a no-op.
        handle.stop().unwrap();

        let log = backend.log();
        assert_eq!(log.frames, vec![vec![32]]);
        assert_eq!(log.live_handles, 0);
        assert_eq!(log.stops, 1);
    }

    #[test]
    fn dropped_handle_is_not_counted_as_live() {
        let backend = InMemoryBackend::new();
        {
            let _handle = backend.start_encode(&spec()).unwrap();
            assert_eq!(backend.log().live_handles, 1);
        }
        assert_eq!(backend.log().live_handles, 0);
        assert_eq!(backend.log().max_live_handles, 1);
    }
}
