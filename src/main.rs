use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use streamview::assets::SceneAssets;
use streamview::config::ViewerConfig;
use streamview::controller::{ChangeBatch, ParameterInbox, ReactiveController};
use streamview::scene::{FrameSink, SceneUpdate};

#[derive(Parser, Debug)]
#[command(author, version, about = "Reactive streamline viewer")]
struct Args {
    /// Viewer configuration (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Use the built-in synthetic scene instead of asset files.
    #[arg(long, conflicts_with_all = ["surface", "field"])]
    synthetic: bool,
    /// Surface mesh file; overrides the config.
    #[arg(long, requires = "field")]
    surface: Option<PathBuf>,
    /// Flow field file; overrides the config.
    #[arg(long, requires = "surface")]
    field: Option<PathBuf>,
}

/// Writes each update as one JSON line on stdout.
struct JsonLineSink;

impl FrameSink for JsonLineSink {
    fn publish(&self, update: &SceneUpdate) {
        let line = match serde_json::to_string(update) {
            Ok(line) => line,
            Err(err) => {
                warn!(%err, revision = update.revision, "failed to encode scene update");
                return;
            }
        };
        let mut out = io::stdout().lock();
        if let Err(err) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            warn!(%err, "failed to write scene update");
        }
    }
}

fn load_assets(args: &Args, config: &ViewerConfig) -> Result<SceneAssets> {
    if args.synthetic {
        info!("using synthetic scene");
        return Ok(SceneAssets::synthetic());
    }
    let surface = args.surface.as_ref().or(config.assets.surface.as_ref());
    let field = args.field.as_ref().or(config.assets.field.as_ref());
    match (surface, field) {
        (Some(surface), Some(field)) => SceneAssets::load(surface, field)
            .with_context(|| format!("loading assets {} and {}", surface.display(), field.display())),
        _ => bail!("no scene assets: pass --synthetic or both --surface and --field"),
    }
}

/// Feeds stdin lines to the inbox until EOF. Malformed lines are skipped.
fn read_changes(inbox: &ParameterInbox) -> Result<()> {
    for (index, line) in io::stdin().lock().lines().enumerate() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ChangeBatch>(&line) {
            Ok(batch) => {
                for change in batch.into_changes() {
                    inbox.submit(change);
                }
            }
            Err(err) => warn!(line = index + 1, %err, "ignoring malformed input"),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,streamview=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => ViewerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ViewerConfig::default(),
    };
    let assets = load_assets(&args, &config)?;

    let mut controller = ReactiveController::new(config, assets, Box::new(JsonLineSink))
        .context("initial pipeline run")?;
    let inbox = controller.inbox();
    let worker = thread::Builder::new()
        .name("pipeline".to_owned())
        .spawn(move || controller.run())
        .context("spawning pipeline thread")?;

    let read = read_changes(&inbox);

    inbox.shutdown();
    worker
        .join()
        .map_err(|_| anyhow!("pipeline thread panicked"))?;
    read
}
