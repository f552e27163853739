use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use rayon::{prelude::*, ThreadPool};
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    effects::{
        blur::BlurOperator,
        geometry::FlipOperator,
        motion_diff::MotionDiffOperator,
        params::EffectEntry,
        registry::EffectRegistry,
        shake::{AxisMagnitudes, SeismicMotion, ShakeApplicator},
        sketch::SketchOperator,
        spec::{integer_factor, EffectSpec, ExecutionMode, SpeedMode},
        temporal,
        tone::ToneOperator,
        traits::FrameOperator,
    },
    error::{EffectError, PipelineError, Result, VidfxError, VideoError},
    pipeline::progress::{CancelToken, ProgressTracker},
    video::{
        audio::AudioMuxer,
        decoder::{FrameStream, VideoDecoder},
        encoder::VideoEncoder,
        types::{Frame, FrameSequence, VideoMetadata},
    },
};

/// Ordered, validated list of effect stages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<EffectSpec>,
}

impl Pipeline {
    /// Validate every stage; the first invalid one is reported with its position
    pub fn new(stages: Vec<EffectSpec>) -> Result<Self> {
        let stages = stages
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                let name = spec.name();
                spec.validate().map_err(|e| e.in_stage(name, index))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { stages })
    }

    /// Parse configuration entries through `registry`
    pub fn from_entries(registry: &EffectRegistry, entries: &[EffectEntry]) -> Result<Self> {
        let stages = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                registry
                    .parse(entry)
                    .map_err(|e| e.in_stage(entry.name.clone(), index))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[EffectSpec] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Output frame rate after each stage, failing on the first unplayable one
    pub fn plan_rates(&self, input_rate: u32) -> Result<Vec<u32>> {
        if input_rate == 0 {
            return Err(EffectError::InvalidRate { rate: 0, factor: 1 }.into());
        }
        let mut rate = input_rate;
        let mut rates = Vec::with_capacity(self.stages.len());
        for (index, spec) in self.stages.iter().enumerate() {
            rate = spec
                .output_rate(rate)
                .map_err(|e| e.in_stage(spec.name(), index))?;
            rates.push(rate);
        }
        Ok(rates)
    }

    pub fn changes_timing(&self) -> bool {
        self.stages.iter().any(EffectSpec::changes_timing)
    }

    pub fn changes_geometry(&self) -> bool {
        self.stages.iter().any(EffectSpec::changes_geometry)
    }
}

/// Lifecycle of one engine run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    /// Executing unit `stage` of `total` (the last unit is encoding, when requested)
    Running { stage: usize, total: usize },
    Completed,
    Failed,
}

/// What happened to the source audio track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioOutcome {
    /// Audio preservation disabled or no muxer supplied
    NotRequested,
    NoAudioTrack,
    Reattached,
    /// Re-muxing failed; the output is video only
    Degraded { reason: String },
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub output: PathBuf,
    pub source: VideoMetadata,
    pub frame_rate: u32,
    pub frame_count: usize,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
    /// Display form of every stage, in execution order
    pub stages: Vec<String>,
    pub audio: AudioOutcome,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl RunReport {
    /// Output duration in seconds
    pub fn duration(&self) -> f64 {
        self.frame_count as f64 / self.frame_rate.max(1) as f64
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.audio, AudioOutcome::Degraded { .. })
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Frames entering a stage: still coming from the decoder, or fully in memory
enum StageInput<'a> {
    Stream {
        frames: FrameStream<'a>,
        expected: usize,
        rate: u32,
    },
    Sequence(FrameSequence),
}

impl<'a> StageInput<'a> {
    fn rate(&self) -> u32 {
        match self {
            StageInput::Stream { rate, .. } => *rate,
            StageInput::Sequence(seq) => seq.frame_rate(),
        }
    }

    fn expected_len(&self) -> usize {
        match self {
            StageInput::Stream { expected, .. } => *expected,
            StageInput::Sequence(seq) => seq.len(),
        }
    }

    fn into_frames(self) -> FrameStream<'a> {
        match self {
            StageInput::Stream { frames, .. } => frames,
            StageInput::Sequence(seq) => Box::new(seq.into_frames().into_iter().map(Ok)),
        }
    }

    fn into_sequence(self, cancel: &CancelToken) -> Result<FrameSequence> {
        match self {
            StageInput::Sequence(seq) => Ok(seq),
            StageInput::Stream {
                frames,
                expected,
                rate,
            } => {
                let mut collected = Vec::with_capacity(expected);
                for frame in frames {
                    cancel.check()?;
                    collected.push(frame?);
                }
                FrameSequence::new(collected, rate)
            }
        }
    }
}

/// Main engine that runs one pipeline over one source
///
/// A run goes through:
/// 1. Validation - configuration and the frame rate of every stage, before any frame is read
/// 2. Stage execution - each stage consumes the previous stage's output in order
/// 3. Encoding - the final sequence is written to a scratch file
/// 4. Audio - the source track is re-muxed when requested
/// 5. Output - the result is moved into place; nothing is left behind on failure
pub struct PipelineEngine {
    config: Config,
    pipeline: Pipeline,
    progress: ProgressTracker,
    cancel: CancelToken,
    state: RunState,
    units: usize,
}

impl PipelineEngine {
    pub fn new(config: Config, pipeline: Pipeline) -> Self {
        Self {
            config,
            pipeline,
            progress: ProgressTracker::new(None),
            cancel: CancelToken::new(),
            state: RunState::Idle,
            units: 1,
        }
    }

    /// Receive overall progress in `[0, 1]`
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.progress = ProgressTracker::new(Some(Box::new(callback)));
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Handle that stops the run between frames
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run every stage and return the resulting sequence without encoding it
    pub fn process(&mut self, decoder: &mut dyn VideoDecoder) -> Result<FrameSequence> {
        self.start(self.pipeline.len().max(1))?;
        let result = self.execute(decoder).map(|(_, sequence)| sequence);
        self.finish(result)
    }

    /// Full run: stages, encode, optional audio re-mux, then move into `output`
    pub fn run(
        &mut self,
        decoder: &mut dyn VideoDecoder,
        encoder: &mut dyn VideoEncoder,
        muxer: Option<&mut dyn AudioMuxer>,
        source: &Path,
        output: &Path,
    ) -> Result<RunReport> {
        let started_at = Local::now();
        self.start(self.pipeline.len().max(1) + 1)?;
        let result = self.execute_and_encode(decoder, encoder, muxer, source, output, started_at);
        self.finish(result)
    }

    fn start(&mut self, units: usize) -> Result<()> {
        if self.state != RunState::Idle {
            return Err(PipelineError::InvalidState {
                details: format!("engine already used ({:?})", self.state),
            }
            .into());
        }
        self.units = units;
        self.progress.begin(units);
        Ok(())
    }

    fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.state = RunState::Completed;
                self.progress.complete();
                Ok(value)
            }
            Err(e) => {
                self.state = RunState::Failed;
                error!("Run failed: {}", e);
                Err(e)
            }
        }
    }

    fn execute(&mut self, decoder: &mut dyn VideoDecoder) -> Result<(VideoMetadata, FrameSequence)> {
        self.config.validate()?;
        self.cancel.check()?;

        let metadata = decoder.metadata()?;
        // Rate errors are caught here, before any stage runs
        let rates = self.pipeline.plan_rates(metadata.frame_rate)?;
        let pool = build_pool(self.config.video.processing_threads)?;

        info!(
            "Source: {}x{} @ {} fps, ~{} frames",
            metadata.width, metadata.height, metadata.frame_rate, metadata.frame_count
        );

        let stages = self.pipeline.stages().to_vec();
        let streamable = matches!(
            stages.first().map(EffectSpec::execution_mode),
            Some(ExecutionMode::Streaming) | Some(ExecutionMode::Pairwise)
        );

        let mut input = if streamable {
            debug!("Streaming frames into the first stage");
            let mut frames = decoder.frames()?.peekable();
            if frames.peek().is_none() {
                return Err(VideoError::EmptySequence.into());
            }
            StageInput::Stream {
                frames: Box::new(frames),
                expected: metadata.frame_count,
                rate: metadata.frame_rate,
            }
        } else {
            debug!("Decoding the full sequence before the first stage");
            StageInput::Sequence(decoder.decode()?)
        };

        for (index, spec) in stages.iter().enumerate() {
            self.cancel.check()?;
            self.state = RunState::Running {
                stage: index,
                total: self.units,
            };
            info!("Stage {}/{}: {}", index + 1, stages.len(), spec);

            let sequence = self
                .run_stage(&pool, index, spec, input, rates[index])
                .map_err(|e| e.in_stage(spec.name(), index))?;

            info!("   {} frames @ {} fps", sequence.len(), sequence.frame_rate());
            self.progress.report(index, 1.0);
            input = StageInput::Sequence(sequence);
        }

        let sequence = input.into_sequence(&self.cancel)?;
        if stages.is_empty() {
            self.progress.report(0, 1.0);
        }
        sequence.ensure_non_empty().map_err(|e| match stages.last() {
            Some(last) => e.in_stage(last.name(), stages.len() - 1),
            None => e,
        })?;

        Ok((metadata, sequence))
    }

    fn execute_and_encode(
        &mut self,
        decoder: &mut dyn VideoDecoder,
        encoder: &mut dyn VideoEncoder,
        muxer: Option<&mut dyn AudioMuxer>,
        source: &Path,
        output: &Path,
        started_at: DateTime<Local>,
    ) -> Result<RunReport> {
        let (metadata, sequence) = self.execute(decoder)?;
        let encode_unit = self.units - 1;
        self.cancel.check()?;
        self.state = RunState::Running {
            stage: encode_unit,
            total: self.units,
        };

        // Scratch files live until this function returns, on every path
        let scratch = tempfile::Builder::new().prefix("vidfx-").tempdir()?;
        let extension = output
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4");
        let video_only = scratch.path().join(format!("video_only.{}", extension));

        let encoded = encoder
            .encode(&sequence, sequence.frame_rate(), &video_only)
            .map_err(|e| e.in_stage("encode", encode_unit))?;
        drop(sequence);
        self.progress.report(encode_unit, 0.8);

        let (final_path, audio) =
            self.reattach_audio(muxer, metadata.has_audio, source, &video_only, scratch.path());

        self.cancel.check()?;
        persist(&final_path, output)?;
        let file_size = std::fs::metadata(output)
            .map(|m| m.len())
            .unwrap_or(encoded.file_size);

        let report = RunReport {
            output: output.to_path_buf(),
            source: metadata,
            frame_rate: encoded.frame_rate,
            frame_count: encoded.frame_count,
            width: encoded.width,
            height: encoded.height,
            file_size,
            stages: self.pipeline.stages().iter().map(ToString::to_string).collect(),
            audio,
            started_at,
            finished_at: Local::now(),
        };
        info!(
            "Wrote {:?}: {} frames, {:.2}s, {}x{} @ {} fps",
            report.output,
            report.frame_count,
            report.duration(),
            report.width,
            report.height,
            report.frame_rate
        );
        Ok(report)
    }

    fn run_stage(
        &mut self,
        pool: &ThreadPool,
        index: usize,
        spec: &EffectSpec,
        input: StageInput<'_>,
        output_rate: u32,
    ) -> Result<FrameSequence> {
        match spec {
            EffectSpec::Reverse => temporal::reverse(input.into_sequence(&self.cancel)?),
            EffectSpec::Speed { mode, factor } => {
                self.resample(index, input, *mode, *factor, output_rate)
            }
            EffectSpec::MotionDiff { invert } => {
                let op = MotionDiffOperator::new(*invert);
                self.map_frames(pool, index, input, |i, frame, previous| {
                    match op.apply_pair(i, Some(frame), previous) {
                        Ok(out) => Ok(Some(out)),
                        Err(VidfxError::Effect(EffectError::MissingFrame { index })) => {
                            if index > 0 {
                                warn!("{}: frame {} has no predecessor, skipped", op.name(), index);
                            } else {
                                debug!("{}: first frame dropped", op.name());
                            }
                            Ok(None)
                        }
                        Err(e) => Err(e),
                    }
                })
            }
            EffectSpec::Shake { .. } => {
                // The motion series must cover every frame, so it is sized from the real count
                let sequence = input.into_sequence(&self.cancel)?;
                let op = self.frame_operator(spec, sequence.len(), sequence.frame_rate())?;
                self.map_frames(pool, index, StageInput::Sequence(sequence), |i, frame, _| {
                    op.apply(i, frame).map(Some)
                })
            }
            other => {
                let op = self.frame_operator(other, input.expected_len(), input.rate())?;
                self.map_frames(pool, index, input, |i, frame, _| op.apply(i, frame).map(Some))
            }
        }
    }

    fn frame_operator(&self, spec: &EffectSpec, len: usize, rate: u32) -> Result<Box<dyn FrameOperator>> {
        let op: Box<dyn FrameOperator> = match spec {
            EffectSpec::Flip { direction } => Box::new(FlipOperator::new(*direction)),
            EffectSpec::Tone { theme } => Box::new(ToneOperator::new(*theme)),
            EffectSpec::Sketch => Box::new(SketchOperator::new()),
            EffectSpec::Blur { strength } => Box::new(BlurOperator::new(*strength)),
            EffectSpec::Shake { seed, .. } => Box::new(self.shake_operator(spec, *seed, len, rate)?),
            other => {
                return Err(PipelineError::InvalidState {
                    details: format!("{} is not a per-frame operator", other.name()),
                }
                .into())
            }
        };
        Ok(op)
    }

    /// Generate the motion series for a shake stage of `len` frames
    fn shake_operator(&self, spec: &EffectSpec, seed: Option<u64>, len: usize, rate: u32) -> Result<ShakeApplicator> {
        let shake = &self.config.shake;
        let seed = seed.or(shake.seed).unwrap_or_else(rand::random);
        let magnitude = spec.effective_magnitude().unwrap_or(1.0);
        info!("   shake magnitude {:.2} (seed {})", magnitude, seed);

        let series = SeismicMotion::new(shake.low_cut_hz, shake.high_cut_hz).generate(
            len.max(1) as f64 / rate.max(1) as f64,
            rate,
            AxisMagnitudes::uniform(magnitude),
            seed,
        )?;
        Ok(ShakeApplicator::new(
            series,
            shake.motion_blur_threshold,
            shake.max_blur_kernel,
        ))
    }

    fn chunk_size(&self) -> usize {
        self.config.video.processing_threads.max(1) * 4
    }

    /// Apply `f` to every frame in parallel chunks, keeping input order
    ///
    /// `f` receives the frame position, the frame and its predecessor (also
    /// across chunk boundaries). Returning `Ok(None)` drops that position.
    fn map_frames<F>(
        &mut self,
        pool: &ThreadPool,
        index: usize,
        input: StageInput<'_>,
        f: F,
    ) -> Result<FrameSequence>
    where
        F: Fn(usize, &Frame, Option<&Frame>) -> Result<Option<Frame>> + Sync,
    {
        let rate = input.rate();
        let expected = input.expected_len().max(1);
        let chunk_size = self.chunk_size();
        let mut frames = input.into_frames();
        let mut output = Vec::with_capacity(expected);
        let mut previous: Option<Frame> = None;
        let mut position = 0usize;

        loop {
            self.cancel.check()?;
            let chunk = frames
                .by_ref()
                .take(chunk_size)
                .collect::<Result<Vec<Frame>>>()?;
            if chunk.is_empty() {
                break;
            }

            let base = position;
            let carried = previous.as_ref();
            let results: Vec<Result<Option<Frame>>> = pool.install(|| {
                chunk
                    .par_iter()
                    .enumerate()
                    .map(|(j, frame)| {
                        let prev = if j == 0 { carried } else { chunk.get(j - 1) };
                        f(base + j, frame, prev)
                    })
                    .collect()
            });
            for result in results {
                if let Some(frame) = result? {
                    output.push(frame);
                }
            }

            position += chunk.len();
            debug!("   {} frames through stage {}", position, index + 1);
            self.progress.report(index, position as f64 / expected as f64);
            previous = chunk.into_iter().last();
        }

        FrameSequence::new(output, rate)
    }

    /// Speed-up or slow motion, streamed when the input still comes from the decoder
    fn resample(
        &mut self,
        index: usize,
        input: StageInput<'_>,
        mode: SpeedMode,
        factor: f64,
        output_rate: u32,
    ) -> Result<FrameSequence> {
        let input = match input {
            StageInput::Sequence(seq) => {
                return match mode {
                    SpeedMode::Up => temporal::speed_up(&seq, factor),
                    SpeedMode::Down => temporal::slow_motion(&seq, factor),
                };
            }
            stream => stream,
        };

        let n = integer_factor(factor);
        let expected = input.expected_len().max(1);
        let mut output = Vec::new();
        for (i, frame) in input.into_frames().enumerate() {
            self.cancel.check()?;
            let frame = frame?;
            match mode {
                SpeedMode::Up => {
                    if temporal::keeps(i, n) {
                        output.push(frame);
                    }
                }
                SpeedMode::Down => output.extend(std::iter::repeat(frame).take(n as usize)),
            }
            self.progress.report(index, (i + 1) as f64 / expected as f64);
        }
        FrameSequence::new(output, output_rate)
    }

    fn reattach_audio(
        &self,
        muxer: Option<&mut dyn AudioMuxer>,
        source_has_audio: bool,
        source: &Path,
        video_only: &Path,
        scratch: &Path,
    ) -> (PathBuf, AudioOutcome) {
        let muxer = match muxer {
            Some(muxer) if self.config.video.preserve_audio => muxer,
            _ => return (video_only.to_path_buf(), AudioOutcome::NotRequested),
        };
        if !source_has_audio {
            info!("Source has no audio track");
            return (video_only.to_path_buf(), AudioOutcome::NoAudioTrack);
        }

        let handle = match muxer.extract_audio(source) {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                info!("No audio stream could be extracted");
                return (video_only.to_path_buf(), AudioOutcome::NoAudioTrack);
            }
            Err(e) => return degrade(video_only, e),
        };

        if self.pipeline.changes_timing() {
            info!("Frame timing changed; audio is cut to the shorter of the two streams");
        }

        let extension = video_only
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4");
        let muxed = scratch.join(format!("with_audio.{}", extension));
        match muxer.mux(video_only, &handle, &muxed) {
            Ok(path) => (path, AudioOutcome::Reattached),
            Err(e) => degrade(video_only, e),
        }
    }
}

/// Any audio failure is non-fatal: keep the video-only file and mark the result
fn degrade(video_only: &Path, error: VidfxError) -> (PathBuf, AudioOutcome) {
    let reason = match error.root() {
        VidfxError::Video(VideoError::AudioMuxFailure { reason }) => reason.clone(),
        other => other.to_string(),
    };
    warn!("Audio could not be re-attached, keeping video only: {}", reason);
    (video_only.to_path_buf(), AudioOutcome::Degraded { reason })
}

/// Copy `from` next to `output` and atomically rename it into place
fn persist(from: &Path, output: &Path) -> Result<()> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    let mut src = File::open(from)?;
    io::copy(&mut src, staged.as_file_mut())?;
    staged.as_file().sync_all()?;
    staged.persist(output).map_err(|e| VidfxError::Io(e.error))?;
    Ok(())
}

fn build_pool(threads: usize) -> Result<ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("vidfx-worker-{}", i))
        .build()
        .map_err(|e| VidfxError::generic(format!("failed to start worker pool: {}", e)))
}
