use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vidfx::{
    config::Config,
    effects::{EffectEntry, EffectRegistry},
    error::VideoError,
    pipeline::{AudioOutcome, Pipeline, PipelineEngine, RunReport},
    video::{
        is_supported_input, tool_available, FfmpegAudioMuxer, FfmpegDecoder, FfmpegEncoder,
    },
    VidfxError,
};

#[derive(Parser)]
#[command(
    name = "vidfx",
    version,
    about = "Apply frame and timing effects to a video",
    long_about = "vidfx decodes a video with FFmpeg, runs it through an ordered pipeline of effects (rotation, speed, reverse, tone, sketch, motion silhouette, camera shake, blur) and re-encodes the result, keeping the original audio when possible."
)]
struct Cli {
    /// Input video file (mp4, mov, avi, mkv, webm, m4v)
    #[arg(required_unless_present = "list_effects")]
    input: Option<PathBuf>,

    /// Output video file path [default: enhanced_<input name> next to the input]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Effect stage such as `flip:direction=RotateCW90`; repeat to chain stages.
    /// Replaces the pipeline from the configuration file.
    #[arg(short, long = "effect", value_name = "EFFECT")]
    effects: Vec<EffectEntry>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not re-attach the source audio
    #[arg(long)]
    no_audio: bool,

    /// Seed for camera shake stages without their own seed
    #[arg(long)]
    seed: Option<u64>,

    /// Number of worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// List available effects and exit
    #[arg(long)]
    list_effects: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the verbosity flag
    let default_filter = if cli.verbose { "vidfx=debug" } else { "vidfx=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let registry = EffectRegistry::new();
    if cli.list_effects {
        print_effects(&registry);
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .ok_or_else(|| anyhow!("an input video is required"))?;
    if !input.is_file() {
        bail!("Input file {:?} does not exist", input);
    }
    if !is_supported_input(&input) {
        bail!(VidfxError::from(VideoError::UnsupportedFormat {
            format: input.extension().and_then(|e| e.to_str()).unwrap_or("").to_string(),
        })
        .user_message());
    }

    info!("Starting vidfx v{}", env!("CARGO_PKG_VERSION"));
    info!("Input: {:?}", input);

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path).map_err(|e| anyhow!(e.user_message()))?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    apply_overrides(&mut config, &cli);
    config.validate().map_err(|e| anyhow!(e.user_message()))?;

    for tool in [&config.video.ffmpeg_path, &config.video.ffprobe_path] {
        if !tool_available(tool) {
            let err = VidfxError::from(VideoError::ToolNotFound { tool: tool.clone() });
            bail!(err.user_message());
        }
    }

    let pipeline = Pipeline::from_entries(&registry, &config.pipeline)
        .map_err(|e| anyhow!(e.user_message()))?;
    if pipeline.is_empty() {
        warn!("No effects configured; the video will only be re-encoded");
    }
    for (i, stage) in pipeline.stages().iter().enumerate() {
        info!("  {}. {}", i + 1, stage);
    }

    let output = cli.output.clone().unwrap_or_else(|| default_output(&input));
    info!("Output: {:?}", output);

    let engine = PipelineEngine::new(config.clone(), pipeline).with_progress(progress_logger());

    // Ctrl-C stops the run between frames; partial output is discarded
    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping...");
            cancel.cancel();
        }
    });

    let outcome = tokio::task::spawn_blocking(move || run(engine, &config, &input, &output))
        .await
        .context("processing task panicked")?;

    match outcome {
        Ok(report) => {
            print_summary(&report);
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            Err(anyhow!(e.user_message()))
        }
    }
}

fn run(
    mut engine: PipelineEngine,
    config: &Config,
    input: &Path,
    output: &Path,
) -> vidfx::Result<RunReport> {
    let video = &config.video;
    let mut decoder = FfmpegDecoder::new(input, &video.ffmpeg_path, &video.ffprobe_path);
    let mut encoder = FfmpegEncoder::new(&video.ffmpeg_path, video.encode_params());
    let mut muxer = FfmpegAudioMuxer::new(&video.ffmpeg_path);

    engine.run(&mut decoder, &mut encoder, Some(&mut muxer), input, output)
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if !cli.effects.is_empty() {
        config.pipeline = cli.effects.clone();
    }
    if cli.no_audio {
        config.video.preserve_audio = false;
    }
    if let Some(seed) = cli.seed {
        config.shake.seed = Some(seed);
    }
    if let Some(threads) = cli.threads {
        config.video.processing_threads = threads;
    }
}

/// `enhanced_<name>` next to the input
fn default_output(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.mp4".to_string());
    input.with_file_name(format!("enhanced_{}", name))
}

/// Logs overall progress at every 10% step
fn progress_logger() -> impl FnMut(f64) + Send + 'static {
    let mut last_step = -1i64;
    move |progress| {
        let step = (progress * 10.0).floor() as i64;
        if step > last_step {
            last_step = step;
            info!("Progress: {:>3}%", step * 10);
        }
    }
}

fn print_effects(registry: &EffectRegistry) {
    println!("Available effects:");
    for name in registry.available_effects() {
        let Some(descriptor) = registry.descriptor(name) else {
            continue;
        };
        println!("  {:<12} {}", descriptor.name, descriptor.description);
        for (key, help) in descriptor.parameters {
            println!("      {:<10} {}", key, help);
        }
    }
}

fn print_summary(report: &RunReport) {
    println!("Output:     {}", report.output.display());
    println!(
        "Source:     {}x{} @ {} fps, {} frames",
        report.source.width, report.source.height, report.source.frame_rate, report.source.frame_count
    );
    println!(
        "Result:     {}x{} @ {} fps, {} frames ({:.2}s)",
        report.width,
        report.height,
        report.frame_rate,
        report.frame_count,
        report.duration()
    );
    println!("File size:  {:.2} MB", report.file_size as f64 / (1024.0 * 1024.0));
    let audio = match &report.audio {
        AudioOutcome::NotRequested => "not requested".to_string(),
        AudioOutcome::NoAudioTrack => "source has no audio".to_string(),
        AudioOutcome::Reattached => "re-attached".to_string(),
        AudioOutcome::Degraded { reason } => format!("dropped ({})", reason),
    };
    println!("Audio:      {}", audio);
    println!("Elapsed:    {:.1}s", report.elapsed().num_milliseconds() as f64 / 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_sits_next_to_input() {
        assert_eq!(
            default_output(Path::new("/videos/clip.mp4")),
            PathBuf::from("/videos/enhanced_clip.mp4")
        );
        assert_eq!(default_output(Path::new("clip.mov")), PathBuf::from("enhanced_clip.mov"));
    }

    #[test]
    fn test_cli_effects_replace_config_pipeline() {
        let cli = Cli::parse_from([
            "vidfx",
            "in.mp4",
            "-e",
            "reverse",
            "--effect",
            "speed:mode=up,factor=3",
            "--no-audio",
            "--seed",
            "9",
        ]);
        let mut config = Config::default();
        config.pipeline = vec![EffectEntry::new("sketch")];
        apply_overrides(&mut config, &cli);

        assert_eq!(config.pipeline.len(), 2);
        assert_eq!(config.pipeline[0], EffectEntry::new("reverse"));
        assert!(!config.video.preserve_audio);
        assert_eq!(config.shake.seed, Some(9));
    }

    #[test]
    fn test_list_effects_needs_no_input() {
        assert!(Cli::try_parse_from(["vidfx", "--list-effects"]).is_ok());
        assert!(Cli::try_parse_from(["vidfx"]).is_err());
    }
}
