use std::path::{Path, PathBuf};

use crate::foundation::core::{Fps, PixelFormat};
use crate::foundation::error::{LivemuxError, LivemuxResult};

/// Network endpoint receiving the live MPEG-TS stream.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransportTarget {
    /// Destination host (typically a UDP multicast group).
    pub host: String,
    /// Destination UDP port.
    pub port: u16,
}

impl TransportTarget {
    /// The `udp://host:port` URL passed to ffmpeg.
    pub fn url(&self) -> String {
        format!("udp://{}:{}", self.host, self.port)
    }

    /// Validate the endpoint.
    pub fn validate(&self) -> LivemuxResult<()> {
        if self.host.is_empty() {
            return Err(LivemuxError::validation("transport host must be non-empty"));
        }
        Ok(())
    }
}

impl Default for TransportTarget {
    fn default() -> Self {
        Self {
            host: "224.2.2.2".to_string(),
            port: 8888,
        }
    }
}

/// Configuration for a [`crate::session::StreamSession`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frame rate of the live encode.
    pub fps: Fps,
    /// Pixel layout of frames fed by the renderer.
    pub pix_fmt: PixelFormat,
    /// Live stream destination.
    pub transport: TransportTarget,
    /// Directory of encoded animation segments, shared with the renderer's cache writer.
    pub cache_dir: PathBuf,
    /// Container extension of segment files (without the dot).
    pub container_ext: String,
    /// Duplicate live encodes into the cache directory for future replay.
    pub persist_segments: bool,
    /// Bounded wait for encoder exit on stop, before escalating to a kill.
    pub stop_grace_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: Fps { num: 60, den: 1 },
            pix_fmt: PixelFormat::Rgba,
            transport: TransportTarget::default(),
            cache_dir: PathBuf::from("segments"),
            container_ext: "mp4".to_string(),
            persist_segments: true,
            stop_grace_ms: 10_000,
        }
    }
}

impl StreamConfig {
    /// Validate the configuration.
    ///
    /// Deserialized configs bypass the `Fps` constructor, so its invariants are re-checked
    /// here.
    pub fn validate(&self) -> LivemuxResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(LivemuxError::validation(
                "stream width/height must be non-zero",
            ));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(LivemuxError::validation(
                "stream width/height must be even (required for yuv420p segment output)",
            ));
        }
        Fps::new(self.fps.num, self.fps.den)?;
        self.transport.validate()?;
        if self.container_ext.is_empty() || self.container_ext.contains('.') {
            return Err(LivemuxError::validation(
                "container_ext must be a bare extension without a dot",
            ));
        }
        Ok(())
    }

    /// Load and validate a JSON configuration file.
    pub fn from_path(path: &Path) -> LivemuxResult<Self> {
        use anyhow::Context as _;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&text).map_err(|e| {
            LivemuxError::serde(format!("failed to parse config '{}': {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_and_targets_the_multicast_group() {
        let cfg = StreamConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.transport.url(), "udp://224.2.2.2:8888");
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut cfg = StreamConfig {
            width: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        cfg = StreamConfig {
            width: 1921,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        cfg = StreamConfig {
            fps: Fps { num: 60, den: 0 },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        cfg = StreamConfig {
            container_ext: ".mp4".to_string(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        cfg = StreamConfig {
            transport: TransportTarget {
                host: String::new(),
                port: 8888,
            },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn json_round_trips_and_fills_missing_fields_with_defaults() {
        let cfg = StreamConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: StreamConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.width, cfg.width);
        assert_eq!(back.transport, cfg.transport);

        let partial: StreamConfig =
            serde_json::from_str(r#"{ "width": 640, "height": 360 }"#).unwrap();
        assert_eq!(partial.width, 640);
        assert_eq!(partial.fps, Fps { num: 60, den: 1 });
        assert!(partial.persist_segments);
    }
}
