use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use reelstack::{
    ClipLibraryMotionSource, Collaborators, CommandImageRenderer, CommandMetadataService,
    CommandNarrator, Generator, GeneratorConfig, JsonDirContentStore, MediaAsset, PadOptions,
    RunOutcome, ScrollParams, UsageLedger,
};

#[derive(Parser, Debug)]
#[command(name = "reelstack", version)]
#[command(about = "Generate narrated vertical videos from text posts")]
struct Cli {
    /// Generator config JSON (defaults to ./reelstack.json when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate videos in a loop until interrupted.
    Run {
        /// Stop after this many runs.
        #[arg(long)]
        max_runs: Option<u64>,
        /// Seed content selection.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Generate a single video.
    Once {
        /// Seed content selection.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print what ffprobe reports for a media file.
    Probe {
        /// Media file.
        path: PathBuf,
    },
    /// Turn a tall image into a scrolling video.
    Scroll {
        /// Source image.
        #[arg(long)]
        image: PathBuf,
        /// Duration in seconds.
        #[arg(long)]
        duration: f64,
        /// Viewport height in pixels.
        #[arg(long)]
        height: u32,
        /// Output MP4.
        #[arg(long)]
        out: PathBuf,
    },
    /// Stack two videos vertically.
    Stack {
        /// Top video.
        #[arg(long)]
        top: PathBuf,
        /// Bottom video.
        #[arg(long)]
        bottom: PathBuf,
        /// Output MP4.
        #[arg(long)]
        out: PathBuf,
    },
    /// Centre a video on a blurred copy of another.
    Pad {
        /// Foreground video; its size, duration and audio are kept.
        #[arg(long)]
        foreground: PathBuf,
        /// Background source video of the same duration.
        #[arg(long)]
        background: PathBuf,
        /// Output MP4.
        #[arg(long)]
        out: PathBuf,
        /// Blur kernel size in pixels.
        #[arg(long)]
        blur: Option<u32>,
        /// Margin removed from each side of the foreground.
        #[arg(long)]
        margin: Option<u32>,
    },
    /// Replace a video's audio with a narration track, trimmed to the picture.
    Sync {
        /// Video.
        #[arg(long)]
        video: PathBuf,
        /// Narration audio.
        #[arg(long)]
        audio: PathBuf,
        /// Output MP4.
        #[arg(long)]
        out: PathBuf,
    },
    /// Inspect or edit the usage ledger.
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Subcommand, Debug)]
enum LedgerAction {
    /// Exit 0 when the id is recorded, 1 otherwise.
    Check {
        /// Content identifier.
        id: String,
    },
    /// Record an id as used.
    Add {
        /// Content identifier.
        id: String,
    },
    /// Print every recorded id.
    List,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    match cli.cmd {
        Command::Run { max_runs, seed } => cmd_run(config, max_runs, seed),
        Command::Once { seed } => cmd_once(config, seed),
        Command::Probe { path } => cmd_probe(&path),
        Command::Scroll {
            image,
            duration,
            height,
            out,
        } => {
            let params = ScrollParams {
                fps: config.frame_rate()?,
                ..ScrollParams::new(duration, height)
            };
            report(reelstack::render_scroll(&image, &params, &out)?)
        }
        Command::Stack { top, bottom, out } => {
            report(reelstack::stack_vertically(&top, &bottom, &out)?)
        }
        Command::Pad {
            foreground,
            background,
            out,
            blur,
            margin,
        } => {
            let opts = PadOptions {
                blur_kernel: blur.unwrap_or(config.pad.blur_kernel),
                margin_px: margin.unwrap_or(config.pad.margin_px),
                ..config.pad
            };
            report(reelstack::composite_with_background(
                &foreground,
                &background,
                &opts,
                &out,
            )?)
        }
        Command::Sync { video, audio, out } => report(reelstack::sync_audio(&video, &audio, &out)?),
        Command::Ledger { action } => cmd_ledger(&config, action),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<GeneratorConfig> {
    let cfg = match path {
        Some(p) => GeneratorConfig::load(p)?,
        None => {
            let default_path = Path::new("reelstack.json");
            if default_path.is_file() {
                GeneratorConfig::load(default_path)?
            } else {
                GeneratorConfig::default()
            }
        }
    };
    Ok(cfg)
}

fn build_generator(config: GeneratorConfig, seed: Option<u64>) -> anyhow::Result<Generator> {
    let commands = &config.commands;
    let renderer = commands
        .render_image
        .clone()
        .context("config is missing commands.render_image")?;
    let narrator = commands
        .narrate
        .clone()
        .context("config is missing commands.narrate")?;
    let metadata = commands
        .metadata
        .clone()
        .context("config is missing commands.metadata")?;

    let collab = Collaborators {
        content: Box::new(JsonDirContentStore::new(&config.content_dir)),
        renderer: Box::new(CommandImageRenderer::new(renderer)),
        narrator: Box::new(CommandNarrator::new(narrator)),
        motion: Box::new(match seed {
            Some(s) => ClipLibraryMotionSource::with_seed(&config.clip_dir, s),
            None => ClipLibraryMotionSource::new(&config.clip_dir),
        }),
        metadata: Box::new(CommandMetadataService::new(metadata)),
    };
    let generator = Generator::new(config, collab)?;
    Ok(match seed {
        Some(s) => generator.with_seed(s),
        None => generator,
    })
}

fn cmd_run(config: GeneratorConfig, max_runs: Option<u64>, seed: Option<u64>) -> anyhow::Result<()> {
    anyhow::ensure!(
        reelstack::ffmpeg_available(),
        "ffmpeg and ffprobe must be on PATH"
    );
    let mut generator = build_generator(config, seed)?;
    let stats = generator.run_loop(max_runs);
    eprintln!(
        "runs: {} attempted, {} succeeded, {} failed",
        stats.attempted, stats.succeeded, stats.failed
    );
    Ok(())
}

fn cmd_once(config: GeneratorConfig, seed: Option<u64>) -> anyhow::Result<()> {
    anyhow::ensure!(
        reelstack::ffmpeg_available(),
        "ffmpeg and ffprobe must be on PATH"
    );
    let mut generator = build_generator(config, seed)?;
    match generator.run_once() {
        RunOutcome::Success { output, content_id } => {
            eprintln!("wrote {} from {content_id}", output.display());
            Ok(())
        }
        RunOutcome::Aborted { stage, error } => {
            Err(anyhow::Error::new(error).context(format!("run aborted at {stage}")))
        }
    }
}

fn cmd_probe(path: &Path) -> anyhow::Result<()> {
    let info = reelstack::probe(path)?;
    println!("path:     {}", path.display());
    println!("size:     {}x{}", info.width, info.height);
    println!("duration: {:.3}s", info.duration_secs);
    match info.fps {
        Some(fps) => println!("fps:      {fps} ({:.3})", fps.as_f64()),
        None => println!("fps:      -"),
    }
    println!("audio:    {}", if info.has_audio { "yes" } else { "no" });
    Ok(())
}

fn cmd_ledger(config: &GeneratorConfig, action: LedgerAction) -> anyhow::Result<()> {
    let ledger = UsageLedger::open(&config.ledger_path)?;
    match action {
        LedgerAction::Check { id } => {
            if ledger.contains(&id)? {
                println!("used");
                Ok(())
            } else {
                println!("unused");
                std::process::exit(1);
            }
        }
        LedgerAction::Add { id } => {
            if ledger.claim(&id)? {
                eprintln!("recorded {id}");
            } else {
                eprintln!("{id} was already recorded");
            }
            Ok(())
        }
        LedgerAction::List => {
            let mut entries: Vec<_> = ledger.entries()?.into_iter().collect();
            entries.sort();
            for id in entries {
                println!("{id}");
            }
            Ok(())
        }
    }
}

fn report(asset: MediaAsset) -> anyhow::Result<()> {
    eprintln!(
        "wrote {} ({}x{}, {:.3}s)",
        asset.path.display(),
        asset.info.width,
        asset.info.height,
        asset.info.duration_secs
    );
    Ok(())
}
