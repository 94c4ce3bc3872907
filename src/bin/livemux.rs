use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use livemux::{
    Fingerprint, FfmpegBackend, FfmpegBackendOpts, SegmentIndex, StreamBackend, StreamConfig,
};

#[derive(Parser, Debug)]
#[command(name = "livemux", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-stream a cached animation segment to the transport target (requires `ffmpeg` on
    /// PATH).
    Replay(ReplayArgs),
    /// List fingerprints with a cached segment.
    List(ListArgs),
}

#[derive(Parser, Debug)]
struct ReplayArgs {
    /// Stream configuration JSON; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fingerprint of the cached segment to replay.
    fingerprint: String,
}

#[derive(Parser, Debug)]
struct ListArgs {
    /// Stream configuration JSON; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Replay(args) => cmd_replay(args),
        Command::List(args) => cmd_list(args),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<StreamConfig> {
    match path {
        Some(p) => Ok(StreamConfig::from_path(p)?),
        None => {
            let cfg = StreamConfig::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }
}

fn cmd_replay(args: ReplayArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_ref())?;
    let index = SegmentIndex::new(&cfg.cache_dir, &cfg.container_ext)?;
    let fingerprint = Fingerprint::new(args.fingerprint)?;

    if !index.has_cached(&fingerprint) {
        anyhow::bail!(
            "no cached segment for '{}' under '{}'",
            fingerprint,
            cfg.cache_dir.display()
        );
    }

    let backend = FfmpegBackend::new(FfmpegBackendOpts {
        stop_grace: Duration::from_millis(cfg.stop_grace_ms),
        ..Default::default()
    });
    let mut handle = backend.start_replay(&index.path_for(&fingerprint), &cfg.transport)?;
    handle.stop()?;

    println!("replayed '{}' to {}", fingerprint, cfg.transport.url());
    Ok(())
}

fn cmd_list(args: ListArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_ref())?;
    let index = SegmentIndex::new(&cfg.cache_dir, &cfg.container_ext)?;

    for fingerprint in index.cached_fingerprints()? {
        println!("{fingerprint}");
    }
    Ok(())
}
