use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Terminal lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Aborted,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Snapshot returned by polling a run.
#[derive(Debug, Clone)]
pub struct Progress {
    pub frames_done: u64,
    /// 0 when the container does not report a frame count.
    pub total_frames: u64,
    pub status: RunStatus,
    /// Human-readable terminal message, set once the run ends.
    pub message: Option<String>,
}

/// Shared progress/abort state between the worker thread and the caller.
///
/// Single writer per field: the worker advances the frame counter and sets
/// the terminal status; the caller sets the abort request and reads
/// everything. No operation blocks on the other side.
pub struct RunState {
    frames_done: AtomicU64,
    total_frames: AtomicU64,
    abort_requested: AtomicBool,
    terminal: Mutex<Terminal>,
}

struct Terminal {
    status: RunStatus,
    message: Option<String>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            frames_done: AtomicU64::new(0),
            total_frames: AtomicU64::new(0),
            abort_requested: AtomicBool::new(false),
            terminal: Mutex::new(Terminal {
                status: RunStatus::Running,
                message: None,
            }),
        }
    }

    /// Worker side: record the total once the source has been opened.
    pub fn set_total_frames(&self, total: u64) {
        self.total_frames.store(total, Ordering::Relaxed);
    }

    /// Worker side: one frame fully processed and written.
    pub fn frame_done(&self) {
        self.frames_done.fetch_add(1, Ordering::Relaxed);
    }

    /// Caller side: request cooperative cancellation. Idempotent; repeated
    /// calls are no-ops.
    pub fn request_abort(&self) {
        self.abort_requested.store(true, Ordering::Relaxed);
    }

    pub fn abort_requested(&self) -> bool {
        self.abort_requested.load(Ordering::Relaxed)
    }

    /// Worker side: record the terminal status exactly once. Later calls are
    /// ignored so an already-terminal run never reverts.
    pub fn finish(&self, status: RunStatus, message: impl Into<String>) {
        let mut terminal = self.terminal.lock().unwrap();
        if terminal.status.is_terminal() {
            return;
        }
        terminal.status = status;
        terminal.message = Some(message.into());
    }

    pub fn snapshot(&self) -> Progress {
        let terminal = self.terminal.lock().unwrap();
        Progress {
            frames_done: self.frames_done.load(Ordering::Relaxed),
            total_frames: self.total_frames.load(Ordering::Relaxed),
            status: terminal.status,
            message: terminal.message.clone(),
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
