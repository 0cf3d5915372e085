//! mixdown-play - plays a WAV file through the default output device.
//!
//! Usage: `mixdown-play <file.wav> [--volume DB] [--pan P] [--fade-in S] [--fade-out S]`

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use mixdown_audio::CpalSink;
use mixdown_core::EngineConfig;
use mixdown_engine::{Clip, Engine, PlaybackState};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Default)]
struct Args {
    path: PathBuf,
    volume: Option<f32>,
    pan: Option<f32>,
    fade_in: Option<f64>,
    fade_out: Option<f64>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut path = None;
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |flag: &str| it.next().with_context(|| format!("{flag} needs a value"));
        match arg.as_str() {
            "--volume" => args.volume = Some(value("--volume")?.parse().context("--volume")?),
            "--pan" => args.pan = Some(value("--pan")?.parse().context("--pan")?),
            "--fade-in" => args.fade_in = Some(value("--fade-in")?.parse().context("--fade-in")?),
            "--fade-out" => args.fade_out = Some(value("--fade-out")?.parse().context("--fade-out")?),
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            _ if path.is_none() => path = Some(PathBuf::from(arg)),
            _ => bail!("unexpected argument {arg}"),
        }
    }
    args.path = path.context("usage: mixdown-play <file.wav> [--volume DB] [--pan P] [--fade-in S] [--fade-out S]")?;
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args()?;
    let engine = Engine::new(EngineConfig::default())?;
    engine.set_output_device(Box::new(CpalSink::new()))?;

    let clip = Clip::open_audio(&args.path).with_context(|| format!("failed to open {}", args.path.display()))?;
    if let Some(db) = args.volume {
        clip.set_volume(db)?;
    }
    if let Some(pan) = args.pan {
        clip.set_pan(pan)?;
    }
    if let Some(seconds) = args.fade_in {
        clip.set_fade_in(seconds)?;
    }
    if let Some(seconds) = args.fade_out {
        clip.set_fade_out(seconds)?;
    }

    let track = engine.create_audio_track("playback");
    let added = track.add_clip(clip.clone());
    if added.is_failure() {
        bail!("{}", added.message());
    }

    info!(path = %args.path.display(), duration = clip.duration(), "playing");
    clip.play()?;

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    while clip.playback_state() != PlaybackState::Stopped {
        ticker.tick().await;
    }
    info!("done");
    Ok(())
}
