use crate::foundation::error::{LivemuxError, LivemuxResult};

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> LivemuxResult<Self> {
        if den == 0 {
            return Err(LivemuxError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(LivemuxError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }
}

/// Raw pixel layout of frames handed off by the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit RGBA, 4 bytes per pixel.
    Rgba,
    /// 8-bit BGRA, 4 bytes per pixel.
    Bgra,
    /// 8-bit RGB, 3 bytes per pixel.
    Rgb24,
}

impl PixelFormat {
    /// The `-pix_fmt` name understood by ffmpeg.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::Rgba => "rgba",
            Self::Bgra => "bgra",
            Self::Rgb24 => "rgb24",
        }
    }

    /// Bytes per pixel for this layout.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba | Self::Bgra => 4,
            Self::Rgb24 => 3,
        }
    }
}

/// Stable identifier of one "play" or "wait" call in the animation timeline.
///
/// Produced by the renderer's hashing collaborator and treated as opaque here; it doubles
/// as the on-disk segment filename stem, so the charset is restricted to path-safe
/// characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an externally computed fingerprint, validating the charset.
    pub fn new(s: impl Into<String>) -> LivemuxResult<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(LivemuxError::validation("fingerprint must be non-empty"));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(LivemuxError::validation(format!(
                "fingerprint '{s}' may only contain ascii alphanumerics, '_' and '-'"
            )));
        }
        Ok(Self(s))
    }

    /// Derive a fingerprint by hashing `bytes` (xxh3-128, hex encoded).
    ///
    /// Convenience for callers that do not carry their own stable hash of an animation
    /// call.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:032x}", xxhash_rust::xxh3::xxh3_128(bytes)))
    }

    /// Borrow the fingerprint text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One raw pixel buffer handed off by the renderer.
#[derive(Clone, Debug)]
pub struct RawFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel bytes, tightly packed, row-major, in the session's configured [`PixelFormat`].
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_rejects_zero_components() {
        assert!(Fps::new(0, 1).is_err());
        assert!(Fps::new(30, 0).is_err());
        assert_eq!(Fps::new(60, 1).unwrap().as_f64(), 60.0);
    }

    #[test]
    fn fingerprint_rejects_path_unsafe_input() {
        assert!(Fingerprint::new("").is_err());
        assert!(Fingerprint::new("../etc/passwd").is_err());
        assert!(Fingerprint::new("a/b").is_err());
        assert!(Fingerprint::new("abc-123_DEF").is_ok());
    }

    #[test]
    fn fingerprint_from_bytes_is_deterministic() {
        let a = Fingerprint::from_bytes(b"play Circle().shift(UP)");
        let b = Fingerprint::from_bytes(b"play Circle().shift(UP)");
        let c = Fingerprint::from_bytes(b"wait 1.0");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 32);
        assert!(Fingerprint::new(a.as_str()).is_ok());
    }
}
