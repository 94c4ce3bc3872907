//! End-to-end smoke over the system `ffmpeg`. Skipped when ffmpeg is not installed.

use std::path::PathBuf;

use livemux::{
    Fingerprint, Fps, RawFrame, SessionMode, StreamConfig, StreamSession, TransportTarget,
    is_ffmpeg_on_path,
};

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
fn live_encode_smoke_persists_a_replayable_segment() {
    if !is_ffmpeg_on_path() {
        eprintln!("ffmpeg not on PATH; skipping live encode smoke test");
        return;
    }

    let tmp = temp_dir("ffmpeg_smoke");
    std::fs::create_dir_all(&tmp).unwrap();

    // Unicast loopback target: nothing needs to listen for a UDP send to succeed.
    let cfg = StreamConfig {
        width: 64,
        height: 64,
        fps: Fps { num: 30, den: 1 },
        transport: TransportTarget {
            host: "127.0.0.1".to_string(),
            port: 40123,
        },
        cache_dir: tmp.clone(),
        stop_grace_ms: 30_000,
        ..Default::default()
    };

    let mut sess = StreamSession::new(cfg).unwrap();
    let fingerprint = Fingerprint::new("smoke-abc").unwrap();

    sess.begin_animation(fingerprint.clone(), true).unwrap();
    let frame = RawFrame {
        width: 64,
        height: 64,
        data: vec![128u8; 64 * 64 * 4],
    };
    for _ in 0..10 {
        sess.feed_frame(&frame).unwrap();
    }
    sess.end_animation().unwrap();

    assert_eq!(sess.mode(), SessionMode::Idle);
    assert_eq!(sess.current_index(), 1);
    assert!(sess.cache().has_cached(&fingerprint));

    // The persisted segment is immediately replayable.
    sess.seek_back(1).unwrap();

    std::fs::remove_dir_all(&tmp).ok();
}
