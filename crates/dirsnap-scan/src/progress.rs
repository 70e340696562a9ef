//! Scan progress reporting.
//!
//! Stages never talk to a UI directly. They receive a [`ProgressSink`] and
//! push events through a [`ProgressThrottle`], which drops events arriving
//! sooner than the configured interval after the previous one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

/// Default minimum spacing between two emitted events.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(50);

/// Pipeline stage that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// Enumerating directories.
    Collecting,
    /// Building per-directory file lists.
    Scanning,
    /// Writing the snapshot array.
    Writing,
}

/// Progress information during a snapshot run.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Stage that emitted the event.
    pub phase: ScanPhase,
    /// Human-readable status line.
    pub message: String,
    /// Items finished so far in this stage.
    pub items_processed: u64,
    /// Item being worked on.
    pub current_item: PathBuf,
    /// Time elapsed since the stage started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Calculate the stage rate in items per second.
    pub fn items_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.items_processed as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Receiver of progress events.
pub trait ProgressSink: Send + Sync {
    /// Accept one event. Must not block for long.
    fn report(&self, progress: ScanProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(ScanProgress) + Send + Sync,
{
    fn report(&self, progress: ScanProgress) {
        self(progress)
    }
}

/// Sink that fans events out to any number of broadcast subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<ScanProgress>,
}

impl BroadcastSink {
    /// Create a sink with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.tx.subscribe()
    }
}

impl ProgressSink for BroadcastSink {
    fn report(&self, progress: ScanProgress) {
        // No subscribers is fine.
        let _ = self.tx.send(progress);
    }
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: ScanProgress) {}
}

/// Time-throttled progress emitter shared by the workers of one stage.
pub struct ProgressThrottle<'a> {
    sink: &'a dyn ProgressSink,
    phase: ScanPhase,
    start: Instant,
    interval: Duration,
    processed: AtomicU64,
    // Milliseconds since `start` of the last emitted event, offset by one
    // so that zero means "never emitted".
    last_emit_ms: AtomicU64,
}

impl<'a> ProgressThrottle<'a> {
    /// Create a throttle with the default interval.
    pub fn new(sink: &'a dyn ProgressSink, phase: ScanPhase) -> Self {
        Self::with_interval(sink, phase, PROGRESS_INTERVAL)
    }

    /// Create a throttle with a custom interval.
    pub fn with_interval(sink: &'a dyn ProgressSink, phase: ScanPhase, interval: Duration) -> Self {
        Self {
            sink,
            phase,
            start: Instant::now(),
            interval,
            processed: AtomicU64::new(0),
            last_emit_ms: AtomicU64::new(0),
        }
    }

    /// Record one finished item and emit an event if the interval elapsed.
    pub fn tick(&self, message: &str, current: &Path) {
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        let now_ms = self.start.elapsed().as_millis() as u64 + 1;
        let last = self.last_emit_ms.load(Ordering::Relaxed);

        if last != 0 && now_ms.saturating_sub(last) < self.interval.as_millis() as u64 {
            return;
        }
        // Only one worker wins the slot.
        if self
            .last_emit_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        self.emit(message, current, processed);
    }

    /// Emit an event unconditionally, e.g. at the end of a stage.
    pub fn finish(&self, message: &str, current: &Path) {
        self.emit(message, current, self.processed());
    }

    /// Number of items recorded so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    fn emit(&self, message: &str, current: &Path, processed: u64) {
        self.sink.report(ScanProgress {
            phase: self.phase,
            message: message.to_string(),
            items_processed: processed,
            current_item: current.to_path_buf(),
            elapsed: self.start.elapsed(),
        });
    }
}
