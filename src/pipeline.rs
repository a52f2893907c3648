use crate::config::RunConfig;
use crate::engine::{FrameProcessor, RemovalEngine};
use crate::error::{PipelineError, Result};
use crate::media::{FrameSink, FrameSource, VideoFileSink, VideoFileSource};
use crate::preview::{PreviewPair, PreviewPublisher};
use crate::progress::{Progress, RunState, RunStatus};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Everything the worker loop needs for one run. Built on the worker thread
/// so expensive construction (model load, container probing) never blocks
/// the caller.
pub struct RunComponents {
    pub source: Box<dyn FrameSource>,
    pub processor: Box<dyn FrameProcessor>,
    pub sink: Box<dyn FrameSink>,
}

/// Write-only abort handle, cheap to clone into signal handlers.
#[derive(Clone)]
pub struct AbortSignal(Arc<RunState>);

impl AbortSignal {
    pub fn request_abort(&self) {
        self.0.request_abort();
    }
}

/// Caller-side view of an active run.
pub struct RunHandle {
    state: Arc<RunState>,
    preview: Arc<PreviewPublisher>,
    worker: Option<JoinHandle<()>>,
}

impl RunHandle {
    /// Non-blocking progress snapshot.
    pub fn poll(&self) -> Progress {
        self.state.snapshot()
    }

    /// Request cooperative cancellation. Idempotent. The worker notices at
    /// the next frame boundary, so latency is at most one frame's
    /// processing time.
    pub fn request_abort(&self) {
        self.state.request_abort();
    }

    pub fn abort_signal(&self) -> AbortSignal {
        AbortSignal(Arc::clone(&self.state))
    }

    /// Latest raw/processed thumbnail pair, if one was published since the
    /// last call. Ownership transfers to the caller.
    pub fn latest_preview(&self) -> Option<PreviewPair> {
        self.preview.take()
    }

    /// Join the worker and return the terminal progress.
    pub fn wait(&mut self) -> Progress {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                // A worker panic is a bug; surface it as a failure rather
                // than letting it propagate into the caller.
                self.state
                    .finish(RunStatus::Failed, "worker thread panicked");
            }
        }
        self.poll()
    }
}

/// Orchestrates one run at a time: validates the configuration, spawns the
/// worker, and hands out the run handle.
pub struct PipelineController {
    current: Option<RunHandle>,
}

impl PipelineController {
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Start a video run with the real media stack: FFmpeg source/sink and
    /// the ONNX removal engine.
    pub fn start_run(&mut self, config: RunConfig) -> Result<&mut RunHandle> {
        self.start_run_with(config, build_components)
    }

    /// Start a run with a caller-supplied component builder. The builder
    /// executes on the worker thread; its errors surface as a `Failed`
    /// status through `poll`, not as a return value here.
    pub fn start_run_with<B>(&mut self, config: RunConfig, build: B) -> Result<&mut RunHandle>
    where
        B: FnOnce(&RunConfig) -> Result<RunComponents> + Send + 'static,
    {
        config.validate()?;

        if let Some(handle) = &self.current {
            if !handle.poll().status.is_terminal() {
                return Err(PipelineError::RunActive);
            }
        }

        let state = Arc::new(RunState::new());
        let preview = Arc::new(PreviewPublisher::new());

        let worker = {
            let state = Arc::clone(&state);
            let preview = Arc::clone(&preview);
            thread::Builder::new()
                .name("mattepipe-worker".into())
                .spawn(move || worker_entry(config, build, state, preview))
                .map_err(|err| PipelineError::io(format!("failed to spawn worker: {err}")))?
        };

        Ok(self.current.insert(RunHandle {
            state,
            preview,
            worker: Some(worker),
        }))
    }

    pub fn current_run(&mut self) -> Option<&mut RunHandle> {
        self.current.as_mut()
    }
}

impl Default for PipelineController {
    fn default() -> Self {
        Self::new()
    }
}

/// Open source, construct the engine, open the sink, in that order. Earlier
/// resources are dropped (and thereby released) if a later step fails.
fn build_components(config: &RunConfig) -> Result<RunComponents> {
    let source = VideoFileSource::open(&config.source)?;
    let info = source.info();
    let processor = RemovalEngine::from_config(config)?;
    let sink = VideoFileSink::open(
        config.output_video_path(),
        info.width,
        info.height,
        info.frame_rate,
    )?;
    Ok(RunComponents {
        source: Box::new(source),
        processor: Box::new(processor),
        sink: Box::new(sink),
    })
}

enum RunOutcome {
    Completed,
    Aborted,
}

fn worker_entry<B>(
    config: RunConfig,
    build: B,
    state: Arc<RunState>,
    preview: Arc<PreviewPublisher>,
) where
    B: FnOnce(&RunConfig) -> Result<RunComponents>,
{
    let RunComponents {
        mut source,
        mut processor,
        mut sink,
    } = match build(&config) {
        Ok(components) => components,
        Err(err) => {
            tracing::error!("Run setup failed: {err}");
            state.finish(RunStatus::Failed, err.to_string());
            return;
        }
    };

    state.set_total_frames(source.info().total_frames);

    let outcome = run_loop(
        source.as_mut(),
        processor.as_mut(),
        sink.as_mut(),
        &state,
        &preview,
    );

    // Teardown happens on every terminal path: source and sink are closed
    // exactly once, the preview slot is cleared, and one terminal status is
    // recorded. A partial output file is finalized rather than left
    // dangling.
    let sink_closed = sink.close();
    if let Err(err) = source.close() {
        tracing::warn!("Failed to close video source: {err}");
    }
    preview.clear();

    match outcome {
        Ok(RunOutcome::Completed) => match sink_closed {
            Ok(()) => {
                tracing::info!("Background removal for video completed");
                state.finish(RunStatus::Completed, "Background removal for video completed.");
            }
            Err(err) => {
                tracing::error!("Failed to finalize output: {err}");
                state.finish(RunStatus::Failed, err.to_string());
            }
        },
        Ok(RunOutcome::Aborted) => {
            if let Err(err) = sink_closed {
                tracing::warn!("Failed to finalize partial output: {err}");
            }
            tracing::info!("Background removal process aborted");
            state.finish(RunStatus::Aborted, "Background removal process aborted.");
        }
        Err(err) => {
            if let Err(close_err) = sink_closed {
                tracing::warn!("Failed to finalize partial output: {close_err}");
            }
            tracing::error!("Run failed: {err}");
            state.finish(RunStatus::Failed, err.to_string());
        }
    }
}

/// The per-frame loop: read, check abort, infer, write, count, publish,
/// yield. Frames reach the sink in exactly source order; abort is checked
/// once per iteration boundary, never mid-inference.
fn run_loop(
    source: &mut dyn FrameSource,
    processor: &mut dyn FrameProcessor,
    sink: &mut dyn FrameSink,
    state: &RunState,
    preview: &PreviewPublisher,
) -> Result<RunOutcome> {
    let mut frame_count = 0u64;
    let mut total_decode_time = Duration::ZERO;
    let mut total_process_time = Duration::ZERO;
    let mut total_encode_time = Duration::ZERO;

    tracing::info!("Starting pipeline loop");

    loop {
        let decode_start = Instant::now();
        let frame = match source.next_frame()? {
            Some(frame) => frame,
            None => return Ok(RunOutcome::Completed),
        };
        total_decode_time += decode_start.elapsed();

        if state.abort_requested() {
            return Ok(RunOutcome::Aborted);
        }

        let process_start = Instant::now();
        let processed = processor.process(&frame)?;
        total_process_time += process_start.elapsed();

        let encode_start = Instant::now();
        sink.write(&processed)?;
        total_encode_time += encode_start.elapsed();

        frame_count += 1;
        state.frame_done();
        preview.publish(&frame, &processed);

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let avg_decode_ms = total_decode_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_process_ms = total_process_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_encode_ms = total_encode_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let total_ms = avg_decode_ms + avg_process_ms + avg_encode_ms;
            tracing::info!(
                "Frame {}: decode={:.1}ms, process={:.1}ms, encode={:.1}ms, total={:.1}ms",
                frame_count,
                avg_decode_ms,
                avg_process_ms,
                avg_encode_ms,
                total_ms
            );
        }

        // Give the polling thread a chance to run between frames.
        thread::yield_now();
    }
}
