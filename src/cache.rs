use std::path::{Path, PathBuf};

use crate::foundation::core::Fingerprint;
use crate::foundation::error::{LivemuxError, LivemuxResult};

/// Filesystem-backed index of encoded animation segments.
///
/// The cache directory is populated by the renderer's caching collaborator as a side
/// effect of normal rendering; this index never writes to it and keeps no in-memory
/// state. File existence is the source of truth, so a query may change answer between
/// calls while another process writes the directory.
#[derive(Clone, Debug)]
pub struct SegmentIndex {
    dir: PathBuf,
    ext: String,
}

impl SegmentIndex {
    /// Create an index over `dir` for segment files with extension `ext` (no dot).
    pub fn new(dir: impl Into<PathBuf>, ext: impl Into<String>) -> LivemuxResult<Self> {
        let ext = ext.into();
        if ext.is_empty() || ext.contains('.') {
            return Err(LivemuxError::validation(
                "segment extension must be a bare extension without a dot",
            ));
        }
        Ok(Self {
            dir: dir.into(),
            ext,
        })
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic segment path for `fingerprint`; does not imply existence.
    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{fingerprint}.{}", self.ext))
    }

    /// Whether a finished segment exists for `fingerprint`.
    pub fn has_cached(&self, fingerprint: &Fingerprint) -> bool {
        self.path_for(fingerprint).is_file()
    }

    /// Scan the cache directory for all fingerprints with a segment, sorted.
    ///
    /// Files with a different extension or a name that is not a valid fingerprint are
    /// skipped.
    pub fn cached_fingerprints(&self) -> LivemuxResult<Vec<Fingerprint>> {
        use anyhow::Context as _;
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read cache directory '{}'", self.dir.display()))?;

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("failed to read cache directory '{}'", self.dir.display())
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.ext.as_str()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(fp) = Fingerprint::new(stem) {
                out.push(fp);
            }
        }
        out.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "livemux_{name}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    #[test]
    fn path_for_joins_dir_stem_and_extension() {
        let index = SegmentIndex::new("/tmp/segments", "mp4").unwrap();
        let fp = Fingerprint::new("abc123").unwrap();
        assert_eq!(
            index.path_for(&fp),
            PathBuf::from("/tmp/segments/abc123.mp4")
        );
    }

    #[test]
    fn has_cached_round_trips_through_the_filesystem() {
        let tmp = temp_dir("cache_round_trip");
        std::fs::create_dir_all(&tmp).unwrap();
        let index = SegmentIndex::new(&tmp, "mp4").unwrap();
        let fp = Fingerprint::new("abc123").unwrap();

        assert!(!index.has_cached(&fp));
        std::fs::write(index.path_for(&fp), b"").unwrap();
        assert!(index.has_cached(&fp));

        std::fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn cached_fingerprints_lists_matching_segments_sorted() {
        let tmp = temp_dir("cache_listing");
        std::fs::create_dir_all(&tmp).unwrap();
        std::fs::write(tmp.join("bbb.mp4"), b"").unwrap();
        std::fs::write(tmp.join("aaa.mp4"), b"").unwrap();
        std::fs::write(tmp.join("zzz.txt"), b"").unwrap();

        let index = SegmentIndex::new(&tmp, "mp4").unwrap();
        let listed = index.cached_fingerprints().unwrap();
        let names: Vec<&str> = listed.iter().map(|f| f.as_str()).collect();
        assert_eq!(names, vec!["aaa", "bbb"]);

        std::fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn extension_with_dot_is_rejected() {
        assert!(SegmentIndex::new("/tmp", ".mp4").is_err());
        assert!(SegmentIndex::new("/tmp", "").is_err());
    }
}
