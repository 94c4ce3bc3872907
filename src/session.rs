use std::time::Duration;

use tracing::warn;

use crate::cache::SegmentIndex;
use crate::config::StreamConfig;
use crate::encode::ffmpeg::{FfmpegBackend, FfmpegBackendOpts};
use crate::encode::sink::{EncodeSpec, StreamBackend, StreamHandle};
use crate::foundation::core::{Fingerprint, RawFrame};
use crate::foundation::error::{LivemuxError, LivemuxResult};

/// Playback state of a [`StreamSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionMode {
    /// No animation in progress.
    Idle,
    /// Live-encoding fresh frames from the renderer.
    Encoding,
    /// Re-streaming a cached segment.
    Replaying,
}

/// Orchestrates per-animation playback over one live transport stream.
///
/// For each animation the session either live-encodes fresh frames or replays the cached
/// segment, and it supports seeking back through previously played segments. At most one
/// external stream process is live at any instant; each `begin_animation` is paired with
/// exactly one `end_animation`, in either mode, so the pipe and process are never leaked.
pub struct StreamSession {
    cfg: StreamConfig,
    index: SegmentIndex,
    backend: Box<dyn StreamBackend>,
    active: Option<Box<dyn StreamHandle>>,
    mode: SessionMode,
    played: Vec<Fingerprint>,
    current: usize,
}

impl StreamSession {
    /// Create a session backed by the system `ffmpeg`.
    pub fn new(cfg: StreamConfig) -> LivemuxResult<Self> {
        let opts = FfmpegBackendOpts {
            stop_grace: Duration::from_millis(cfg.stop_grace_ms),
            ..Default::default()
        };
        Self::with_backend(cfg, Box::new(FfmpegBackend::new(opts)))
    }

    /// Create a session over an explicit stream backend.
    pub fn with_backend(
        cfg: StreamConfig,
        backend: Box<dyn StreamBackend>,
    ) -> LivemuxResult<Self> {
        cfg.validate()?;
        let index = SegmentIndex::new(&cfg.cache_dir, &cfg.container_ext)?;
        Ok(Self {
            cfg,
            index,
            backend,
            active: None,
            mode: SessionMode::Idle,
            played: Vec::new(),
            current: 0,
        })
    }

    /// Current playback state.
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Fingerprints of animations begun in this session, in play order.
    pub fn played(&self) -> &[Fingerprint] {
        &self.played
    }

    /// Number of animations begun in this session.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The segment cache index this session consults.
    pub fn cache(&self) -> &SegmentIndex {
        &self.index
    }

    /// Start playback of one animation.
    ///
    /// With `allow_write` the renderer is about to produce fresh frames: a live encode is
    /// started regardless of cache state, duplicating its output into the segment cache
    /// when persistence is enabled. Without `allow_write` the animation is skipped and the
    /// cached segment is replayed instead; a missing segment is a
    /// [`LivemuxError::CacheMissOnSkip`] and leaves the session idle.
    pub fn begin_animation(
        &mut self,
        fingerprint: Fingerprint,
        allow_write: bool,
    ) -> LivemuxResult<()> {
        self.ensure_idle();

        let handle = if allow_write {
            let out_path = self
                .cfg
                .persist_segments
                .then(|| self.index.path_for(&fingerprint));
            let spec = EncodeSpec {
                width: self.cfg.width,
                height: self.cfg.height,
                fps: self.cfg.fps,
                pix_fmt: self.cfg.pix_fmt,
                transport: self.cfg.transport.clone(),
                out_path,
            };
            let handle = self.backend.start_encode(&spec)?;
            self.mode = SessionMode::Encoding;
            handle
        } else {
            // The cache directory is shared with an external writer, so existence is
            // checked immediately before acting, not earlier.
            if !self.index.has_cached(&fingerprint) {
                return Err(LivemuxError::cache_miss(format!(
                    "no cached segment for '{fingerprint}' under '{}'",
                    self.index.dir().display()
                )));
            }
            let handle = self
                .backend
                .start_replay(&self.index.path_for(&fingerprint), &self.cfg.transport)?;
            self.mode = SessionMode::Replaying;
            handle
        };

        self.active = Some(handle);
        self.played.push(fingerprint);
        self.current += 1;
        Ok(())
    }

    /// Forward one rendered frame to the live encoder.
    ///
    /// Valid only while encoding. A dead encoder means the live stream is broken: on a
    /// pipe-write failure the stream process is torn down immediately and the error is
    /// surfaced to the caller.
    pub fn feed_frame(&mut self, frame: &RawFrame) -> LivemuxResult<()> {
        if self.mode != SessionMode::Encoding {
            return Err(LivemuxError::invalid_state(format!(
                "feed_frame requires a live encode (session is {:?})",
                self.mode
            )));
        }
        let Some(handle) = self.active.as_mut() else {
            return Err(LivemuxError::invalid_state(
                "no active stream handle (session state corrupted)",
            ));
        };

        match handle.push_frame(frame) {
            Ok(()) => Ok(()),
            Err(err @ LivemuxError::PipeWrite(_)) => {
                warn!(error = %err, "encoder pipe died mid-stream; stopping stream process");
                self.teardown_active();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Finish the current animation: close the pipe, wait for the process, go idle.
    ///
    /// Must be called exactly once per [`StreamSession::begin_animation`], in either mode.
    /// Cleanup happens even when the process exited abnormally; the resulting
    /// [`LivemuxError::ProcessWait`] is returned for reporting and the session stays
    /// usable.
    pub fn end_animation(&mut self) -> LivemuxResult<()> {
        let Some(mut handle) = self.active.take() else {
            return Err(LivemuxError::invalid_state(
                "end_animation called with no animation in progress",
            ));
        };
        self.mode = SessionMode::Idle;

        match handle.stop() {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, "stream process exited abnormally");
                Err(err)
            }
        }
    }

    /// Replay the segment of an earlier animation, `n` animations back.
    ///
    /// `n = 1` replays the most recently completed animation. The replay is
    /// self-contained (start + drain synchronously) and leaves the play history
    /// untouched.
    pub fn seek_back(&mut self, n: usize) -> LivemuxResult<()> {
        if self.mode != SessionMode::Idle {
            return Err(LivemuxError::invalid_state(
                "seek_back requires an idle session",
            ));
        }
        if n == 0 || n > self.current {
            return Err(LivemuxError::out_of_range(format!(
                "seek_back({n}) with {} played animation(s); valid range is 1..={}",
                self.current, self.current
            )));
        }

        let fingerprint = self.played[self.current - n].clone();
        if !self.index.has_cached(&fingerprint) {
            return Err(LivemuxError::cache_miss(format!(
                "segment for '{fingerprint}' is no longer cached under '{}'",
                self.index.dir().display()
            )));
        }

        let mut handle = self
            .backend
            .start_replay(&self.index.path_for(&fingerprint), &self.cfg.transport)?;
        handle.stop()
    }

    /// Replay an animation ahead of the current point.
    ///
    /// Forward-seek semantics are deliberately left undefined until product intent is
    /// clarified; this always fails with [`LivemuxError::Unsupported`].
    pub fn seek_forward(&mut self, _n: usize) -> LivemuxResult<()> {
        Err(LivemuxError::unsupported("seek_forward is not implemented"))
    }

    // Exclusivity enforcement: only one live process may write the transport target, so a
    // stale handle is stopped before the next one is spawned.
    fn ensure_idle(&mut self) {
        if self.active.is_some() {
            warn!("previous animation was not ended; stopping its stream process");
            self.teardown_active();
        }
    }

    fn teardown_active(&mut self) {
        if let Some(mut handle) = self.active.take() {
            if let Err(err) = handle.stop() {
                warn!(error = %err, "stream process teardown reported an error");
            }
        }
        self.mode = SessionMode::Idle;
    }
}
