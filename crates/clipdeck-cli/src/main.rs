//! clipdeck: lay audio files on a timeline, then plan, render or play them

mod config;

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use clipdeck_core::{format_time, Project, ProjectSettings};
use clipdeck_services::{
    encode_wav, plan, AudioHost, CpalHost, EffectParams, EffectRegistry, OfflineHost,
    PlaybackEngine,
};
use tracing_subscriber::EnvFilter;

/// How often the play loop refreshes the playhead display
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Block length used when rendering offline, in seconds
const RENDER_STEP: f64 = 0.05;

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref());

    match cli.command {
        Commands::Info { input } => run_info(&input),
        Commands::Plan { timeline } => run_plan(&timeline, config.project),
        Commands::Render { timeline, output, effect, params } => {
            run_render(&timeline, &output, effect.as_deref(), &params, &config)
        }
        Commands::Play { timeline } => run_play(&timeline, &config),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clipdeck=info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Non-destructive multi-clip audio timeline", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/clipdeck/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct TimelineArgs {
    /// WAV files, placed end to end in order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Seconds of silence between consecutive clips
    #[arg(long, default_value_t = 0.0)]
    gap: f64,
    /// Timeline position to start from, in seconds
    #[arg(long, default_value_t = 0.0)]
    playhead: f64,
    /// Cut every input into separate clips at this time (seconds into the file), repeatable.
    /// Split files are appended with a fixed half-second gap instead of --gap.
    #[arg(long = "split", value_name = "SECS")]
    splits: Vec<f64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print format details of a WAV file
    Info {
        input: PathBuf,
    },
    /// Print the voice schedule playback would use, as JSON
    Plan {
        #[command(flatten)]
        timeline: TimelineArgs,
    },
    /// Mix the timeline down to a WAV file
    Render {
        #[command(flatten)]
        timeline: TimelineArgs,
        /// Output WAV path
        #[arg(short, long)]
        output: PathBuf,
        /// Effect to apply to the first clip before rendering
        #[arg(long)]
        effect: Option<String>,
        /// Effect parameter as name=value, repeatable
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, f32)>,
    },
    /// Play the timeline on the default output device
    Play {
        #[command(flatten)]
        timeline: TimelineArgs,
    },
}

fn parse_param(s: &str) -> Result<(String, f32), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{s}`"))?;
    let value = value
        .trim()
        .parse::<f32>()
        .map_err(|e| format!("bad value for `{name}`: {e}"))?;
    Ok((name.trim().to_string(), value))
}

/// Decode every input with the engine's host decoder and lay the clips end to end
fn build_project<H: AudioHost>(
    engine: &PlaybackEngine<H>,
    args: &TimelineArgs,
    settings: ProjectSettings,
) -> anyhow::Result<Project> {
    let mut project = Project::new(settings);
    let mut at = 0.0;

    for path in &args.inputs {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let buffer = engine
            .decode_audio_data(&bytes)
            .with_context(|| format!("decoding {}", path.display()))?;
        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("clip");

        let key = project.buffers.insert_unique(name, buffer);
        if !args.splits.is_empty() {
            project.import_segments(key, &args.splits, name)?;
            continue;
        }

        let id = project.create_clip(key, at)?;
        if let Some(clip) = project.get_clip(id) {
            tracing::info!(clip = id.0, name, start = clip.start_time, duration = clip.duration, "Added clip");
            at = clip.end_time() + args.gap.max(0.0);
        }
    }

    project.set_playhead(args.playhead);
    Ok(project)
}

fn run_info(input: &Path) -> anyhow::Result<()> {
    let buffer = clipdeck_services::read_wav_file(input)
        .with_context(|| format!("decoding {}", input.display()))?;
    println!("{}", input.display());
    println!("  channels:    {}", buffer.channel_count());
    println!("  sample rate: {} Hz", buffer.sample_rate());
    println!("  frames:      {}", buffer.frames());
    println!("  duration:    {}", format_time(buffer.duration_secs()));
    println!("  peak:        {:.3}", buffer.peak());
    Ok(())
}

fn run_plan(args: &TimelineArgs, settings: ProjectSettings) -> anyhow::Result<()> {
    let engine = PlaybackEngine::new(OfflineHost::new(44100, 1));
    let project = build_project(&engine, args, settings)?;

    let voices: Vec<serde_json::Value> = plan(&project, 0.0)
        .into_iter()
        .map(|(clip, schedule)| serde_json::json!({ "clip": clip, "schedule": schedule }))
        .collect();
    println!("{}", serde_json::to_string_pretty(&voices)?);
    Ok(())
}

fn run_render(
    args: &TimelineArgs,
    output: &Path,
    effect: Option<&str>,
    params: &[(String, f32)],
    config: &config::AppConfig,
) -> anyhow::Result<()> {
    let settings = config.engine;
    let mut engine = PlaybackEngine::new(OfflineHost::capturing(settings.sample_rate, settings.channels));
    engine.set_master_gain(settings.master_gain);
    let mut project = build_project(&engine, args, config.project)?;

    if let Some(name) = effect {
        let mut fx_params = EffectParams::new();
        for (key, value) in params {
            fx_params.set(key, *value);
        }
        EffectRegistry::with_builtins().apply_to_selection(&mut project, name, &fx_params)?;
    } else if !params.is_empty() {
        bail!("--param given without --effect");
    }

    let length = (project.clip_extent() - project.playhead).max(0.0);
    engine.play(&mut project);
    engine.host_mut().run_until_idle(RENDER_STEP, length + RENDER_STEP);
    engine.host_mut().advance(settings.render_tail.max(0.0));
    engine.stop(&mut project);

    let mixdown = engine.host_mut().take_rendered()?;
    let bytes = encode_wav(&mixdown)?;
    std::fs::write(output, bytes).with_context(|| format!("writing {}", output.display()))?;

    tracing::info!(output = %output.display(), duration = %format_time(mixdown.duration_secs()), "Rendered mixdown");
    Ok(())
}

fn run_play(args: &TimelineArgs, config: &config::AppConfig) -> anyhow::Result<()> {
    let host = CpalHost::open_default()?;
    tracing::info!(device = host.device_name(), "Using output device");

    let mut engine = PlaybackEngine::new(host);
    engine.set_master_gain(config.engine.master_gain);
    let mut project = build_project(&engine, args, config.project)?;

    let extent = project.clip_extent();
    if engine.play(&mut project) == 0 {
        engine.stop(&mut project);
        bail!("nothing to play after {}", format_time(project.playhead));
    }

    let mut last_shown = String::new();
    loop {
        thread::sleep(POLL_INTERVAL);
        engine.poll_completions();

        let position = engine.current_playhead(&project);
        let shown = format_time(position);
        if shown != last_shown {
            eprint!("\r{shown}");
            last_shown = shown;
        }

        if engine.active_voice_count() == 0 || position >= extent {
            break;
        }
    }
    eprintln!();

    engine.stop(&mut project);
    tracing::info!(playhead = %format_time(project.playhead), "Finished");
    Ok(())
}
