use std::io::Read;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::TransportTarget;
use crate::encode::sink::{EncodeSpec, HandleMode, StreamBackend, StreamHandle};
use crate::foundation::core::RawFrame;
use crate::foundation::error::{LivemuxError, LivemuxResult};

/// Options for the [`FfmpegBackend`].
#[derive(Clone, Debug)]
pub struct FfmpegBackendOpts {
    /// `-loglevel` passed to ffmpeg.
    pub loglevel: String,
    /// Bounded wait for process exit in `stop` before escalating to a kill.
    pub stop_grace: Duration,
}

impl Default for FfmpegBackendOpts {
    fn default() -> Self {
        Self {
            loglevel: "error".to_string(),
            stop_grace: Duration::from_secs(10),
        }
    }
}

/// Stream backend that spawns the system `ffmpeg`.
///
/// We intentionally use the system `ffmpeg` binary rather than `ffmpeg-next` to avoid
/// native FFmpeg dev header/lib requirements.
#[derive(Clone, Debug, Default)]
pub struct FfmpegBackend {
    opts: FfmpegBackendOpts,
}

impl FfmpegBackend {
    /// Create a backend with the given options.
    pub fn new(opts: FfmpegBackendOpts) -> Self {
        Self { opts }
    }
}

impl StreamBackend for FfmpegBackend {
    fn start_encode(&self, spec: &EncodeSpec) -> LivemuxResult<Box<dyn StreamHandle>> {
        spec.validate()?;
        if let Some(out) = spec.out_path.as_ref() {
            ensure_parent_dir(out)?;
        }
        if !is_ffmpeg_on_path() {
            return Err(LivemuxError::process_launch(
                "ffmpeg is required for live encoding, but was not found on PATH",
            ));
        }

        let cmd = encode_command(spec, &self.opts.loglevel);
        spawn_handle(
            cmd,
            HandleMode::Encode,
            spec.width,
            spec.height,
            spec.frame_len(),
            self.opts.stop_grace,
        )
    }

    fn start_replay(
        &self,
        source: &Path,
        transport: &TransportTarget,
    ) -> LivemuxResult<Box<dyn StreamHandle>> {
        if !source.is_file() {
            return Err(LivemuxError::validation(format!(
                "replay source '{}' does not exist",
                source.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(LivemuxError::process_launch(
                "ffmpeg is required for segment replay, but was not found on PATH",
            ));
        }

        let cmd = replay_command(source, transport, &self.opts.loglevel);
        spawn_handle(cmd, HandleMode::Replay, 0, 0, 0, self.opts.stop_grace)
    }
}

/// Assemble the live raw-encode command.
///
/// Input: raw frames on stdin at a fixed rate. Output 1: MPEG-TS multiplexed to the
/// transport target. Output 2 (optional): the encoded segment duplicated into a
/// container file for cache reuse.
fn encode_command(spec: &EncodeSpec, loglevel: &str) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args([
        "-y",
        "-loglevel",
        loglevel,
        "-f",
        "rawvideo",
        "-pix_fmt",
        spec.pix_fmt.ffmpeg_name(),
        "-s",
        &format!("{}x{}", spec.width, spec.height),
        "-r",
        &format!("{}/{}", spec.fps.num, spec.fps.den),
        "-i",
        "pipe:0",
        "-an",
    ]);

    cmd.args(["-f", "mpegts"]).arg(spec.transport.url());

    if let Some(out) = spec.out_path.as_ref() {
        cmd.args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-movflags", "+faststart"])
            .arg(out);
    }
    cmd
}

/// Assemble the cached-segment replay command.
fn replay_command(source: &Path, transport: &TransportTarget, loglevel: &str) -> Command {
    let mut cmd = Command::new("ffmpeg");
    // `-stream_loop 0` plays the source exactly once; playback stops at end of stream.
    cmd.args(["-loglevel", loglevel, "-stream_loop", "0", "-i"])
        .arg(source)
        .args(["-f", "mpegts"])
        .arg(transport.url());
    cmd
}

fn spawn_handle(
    mut cmd: Command,
    mode: HandleMode,
    width: u32,
    height: u32,
    frame_len: usize,
    stop_grace: Duration,
) -> LivemuxResult<Box<dyn StreamHandle>> {
    match mode {
        HandleMode::Encode => cmd.stdin(Stdio::piped()),
        HandleMode::Replay => cmd.stdin(Stdio::null()),
    };
    cmd.stdout(Stdio::null()).stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| {
        LivemuxError::process_launch(format!(
            "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
        ))
    })?;

    let stdin = match mode {
        HandleMode::Encode => Some(child.stdin.take().ok_or_else(|| {
            LivemuxError::process_launch("failed to open ffmpeg stdin (unexpected)")
        })?),
        HandleMode::Replay => None,
    };
    let mut stderr = child.stderr.take().ok_or_else(|| {
        LivemuxError::process_launch("failed to open ffmpeg stderr (unexpected)")
    })?;
    let stderr_drain = std::thread::spawn(move || {
        let mut stderr_bytes = Vec::new();
        stderr.read_to_end(&mut stderr_bytes)?;
        Ok(stderr_bytes)
    });

    debug!(?mode, pid = child.id(), "spawned ffmpeg stream process");

    Ok(Box::new(FfmpegHandle {
        mode,
        width,
        height,
        frame_len,
        stop_grace,
        child,
        stdin,
        stderr_drain: Some(stderr_drain),
        outcome: None,
    }))
}

/// Exclusive owner of one spawned ffmpeg process and its input pipe.
struct FfmpegHandle {
    mode: HandleMode,
    width: u32,
    height: u32,
    frame_len: usize,
    stop_grace: Duration,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    // None while running; Some(None) after a clean stop, Some(Some(msg)) after a failed
    // one. Also the idempotency latch for `stop`.
    outcome: Option<Option<String>>,
}

impl StreamHandle for FfmpegHandle {
    fn mode(&self) -> HandleMode {
        self.mode
    }

    fn push_frame(&mut self, frame: &RawFrame) -> LivemuxResult<()> {
        if self.mode != HandleMode::Encode {
            return Err(LivemuxError::invalid_state(
                "frames can only be fed to a live encode stream",
            ));
        }
        if frame.width != self.width || frame.height != self.height {
            return Err(LivemuxError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        if frame.data.len() != self.frame_len {
            return Err(LivemuxError::validation(format!(
                "frame data size mismatch: got {} bytes, expected {}",
                frame.data.len(),
                self.frame_len
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(LivemuxError::pipe_write("stream input pipe is already closed"));
        };

        // Blocking write: when the kernel pipe buffer is full, the caller is suspended
        // until ffmpeg catches up. That is the pipeline's backpressure mechanism.
        use std::io::Write as _;
        stdin.write_all(&frame.data).map_err(|e| {
            LivemuxError::pipe_write(format!("failed to write frame to ffmpeg stdin: {e}"))
        })
    }

    fn stop(&mut self) -> LivemuxResult<()> {
        if let Some(outcome) = self.outcome.as_ref() {
            return match outcome {
                None => Ok(()),
                Some(msg) => Err(LivemuxError::process_wait(msg.clone())),
            };
        }

        // Closing the pipe signals end-of-stream to ffmpeg.
        drop(self.stdin.take());

        let (status, killed) = self.wait_with_grace()?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| LivemuxError::process_wait("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| {
                    LivemuxError::process_wait(format!("ffmpeg stderr read failed: {e}"))
                })?,
            None => Vec::new(),
        };

        if status.success() && !killed {
            self.outcome = Some(None);
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&stderr_bytes);
        let msg = if killed {
            format!(
                "ffmpeg did not exit within {:?} after end-of-stream and was killed: {}",
                self.stop_grace,
                stderr.trim()
            )
        } else {
            format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )
        };
        self.outcome = Some(Some(msg.clone()));
        Err(LivemuxError::process_wait(msg))
    }
}

impl FfmpegHandle {
    fn wait_with_grace(&mut self) -> LivemuxResult<(ExitStatus, bool)> {
        let deadline = Instant::now() + self.stop_grace;
        loop {
            if let Some(status) = self.child.try_wait().map_err(|e| {
                LivemuxError::process_wait(format!("failed to poll ffmpeg for exit: {e}"))
            })? {
                return Ok((status, false));
            }
            if Instant::now() >= deadline {
                warn!(
                    grace = ?self.stop_grace,
                    "ffmpeg did not exit after end-of-stream; killing"
                );
                self.child.kill().map_err(|e| {
                    LivemuxError::process_wait(format!("failed to kill stalled ffmpeg: {e}"))
                })?;
                let status = self.child.wait().map_err(|e| {
                    LivemuxError::process_wait(format!("failed to wait for ffmpeg to finish: {e}"))
                })?;
                return Ok((status, true));
            }
            std::thread::sleep(Duration::from_millis(25));
        }
    }
}

impl Drop for FfmpegHandle {
    fn drop(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        // Last-resort cleanup for abandoned handles: the pipe and process are never
        // leaked, even on error paths that skip `stop`.
        drop(self.stdin.take());
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> LivemuxResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::{Fps, PixelFormat};
    use std::path::PathBuf;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn spec(out_path: Option<PathBuf>) -> EncodeSpec {
        EncodeSpec {
            width: 1920,
            height: 1080,
            fps: Fps { num: 60, den: 1 },
            pix_fmt: PixelFormat::Rgba,
            transport: TransportTarget::default(),
            out_path,
        }
    }

    #[test]
    fn encode_command_pipes_raw_frames_to_the_multicast_target() {
        let cmd = encode_command(&spec(None), "error");
        let args = args_of(&cmd);

        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "pipe:0");
        assert!(args.contains(&"rawvideo".to_string()));
        assert!(args.contains(&"rgba".to_string()));
        assert!(args.contains(&"1920x1080".to_string()));
        assert!(args.contains(&"60/1".to_string()));
        assert!(args.contains(&"-an".to_string()));
        assert!(args.contains(&"mpegts".to_string()));
        assert_eq!(args.last().unwrap(), "udp://224.2.2.2:8888");
        assert!(!args.contains(&"libx264".to_string()));
    }

    #[test]
    fn encode_command_duplicates_the_stream_into_the_segment_file() {
        let out = PathBuf::from("/tmp/segments/abc.mp4");
        let cmd = encode_command(&spec(Some(out.clone())), "error");
        let args = args_of(&cmd);

        assert!(args.contains(&"udp://224.2.2.2:8888".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"yuv420p".to_string()));
        assert_eq!(args.last().unwrap(), &out.to_string_lossy().into_owned());
    }

    #[test]
    fn replay_command_plays_the_source_exactly_once() {
        let source = PathBuf::from("/tmp/segments/abc.mp4");
        let cmd = replay_command(&source, &TransportTarget::default(), "error");
        let args = args_of(&cmd);

        let l = args.iter().position(|a| a == "-stream_loop").unwrap();
        assert_eq!(args[l + 1], "0");
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], source.to_string_lossy().into_owned());
        assert!(args.contains(&"mpegts".to_string()));
        assert_eq!(args.last().unwrap(), "udp://224.2.2.2:8888");
    }
}
