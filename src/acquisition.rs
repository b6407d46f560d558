use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::double_buffer::{BatchPublisher, BatchView, double_buffer};
use crate::frame::{DecodeOutcome, DecoderStats, FrameDecoder, FrameFormat};
use crate::source::{ByteSource, SourceError};

/// Why a background acquisition ended abnormally.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("Acquisition thread panicked")]
    Panicked,
}

/// Receives each newly published batch. Must not hold on to the slice.
pub trait BatchSink: Send {
    fn render(&mut self, batch: &[f32]);
}

impl<F: FnMut(&[f32]) + Send> BatchSink for F {
    fn render(&mut self, batch: &[f32]) {
        self(batch)
    }
}

/// Wakes the egui event loop so the plot picks up the new batch.
pub struct RepaintSink(pub egui::Context);

impl BatchSink for RepaintSink {
    fn render(&mut self, _batch: &[f32]) {
        self.0.request_repaint();
    }
}

/// Logs a one-line summary per batch and optionally raises `stop` after
/// `limit` batches.
pub struct LogSink {
    bin_width_hz: f32,
    rendered: u64,
    limit: Option<u64>,
    stop: Arc<AtomicBool>,
}

impl LogSink {
    pub fn new(bin_width_hz: f32, limit: Option<u64>, stop: Arc<AtomicBool>) -> Self {
        Self {
            bin_width_hz,
            rendered: 0,
            limit,
            stop,
        }
    }
}

impl BatchSink for LogSink {
    fn render(&mut self, batch: &[f32]) {
        self.rendered += 1;
        if let Some((bin, magnitude)) = peak_bin(batch) {
            log::info!(
                "batch {}: peak {magnitude:.2} at bin {bin} ({:.1} Hz)",
                self.rendered,
                bin as f32 * self.bin_width_hz
            );
        }
        if self.limit.is_some_and(|limit| self.rendered >= limit) {
            self.stop.store(true, Ordering::Release);
        }
    }
}

/// Index and value of the largest finite sample.
pub fn peak_bin(batch: &[f32]) -> Option<(usize, f32)> {
    batch
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

/// Decoder counters mirrored for other threads.
#[derive(Default)]
pub struct LinkStats {
    decoded: AtomicU64,
    incomplete: AtomicU64,
    discarded_bytes: AtomicU64,
}

impl LinkStats {
    fn record(&self, stats: DecoderStats) {
        self.decoded.store(stats.decoded, Ordering::Relaxed);
        self.incomplete.store(stats.incomplete, Ordering::Relaxed);
        self.discarded_bytes
            .store(stats.discarded_bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DecoderStats {
        DecoderStats {
            decoded: self.decoded.load(Ordering::Relaxed),
            incomplete: self.incomplete.load(Ordering::Relaxed),
            discarded_bytes: self.discarded_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Everything the driving loop needs besides the byte source and sink.
pub struct Pipeline {
    pub decoder: FrameDecoder,
    pub publisher: BatchPublisher,
    pub poll_interval: Duration,
}

impl Pipeline {
    pub fn new(format: FrameFormat, poll_interval: Duration) -> (Self, BatchView) {
        let (publisher, view) = double_buffer(format.batch_len);
        (
            Self {
                decoder: FrameDecoder::new(format),
                publisher,
                poll_interval,
            },
            view,
        )
    }

    /// Decode, publish and render until `stop` is raised or the source
    /// fails. Decode misses only cost a poll interval.
    pub fn run(
        &mut self,
        source: &mut dyn ByteSource,
        sink: &mut dyn BatchSink,
        stop: &AtomicBool,
        stats: &LinkStats,
    ) -> Result<DecoderStats, SourceError> {
        while !stop.load(Ordering::Acquire) {
            let decoded = self.step(source, sink);
            stats.record(self.decoder.stats());
            match decoded {
                Ok(true) => {}
                Ok(false) => thread::sleep(self.poll_interval),
                Err(err) => {
                    log::error!("Acquisition from {} stopped: {err}", source.describe());
                    return Err(err);
                }
            }
        }
        Ok(self.decoder.stats())
    }

    /// One decode attempt. Returns whether a batch was published.
    pub fn step(
        &mut self,
        source: &mut dyn ByteSource,
        sink: &mut dyn BatchSink,
    ) -> Result<bool, SourceError> {
        let expected = self.decoder.format().payload_len();
        match self.decoder.try_read_batch(source)? {
            DecodeOutcome::Decoded(batch) => {
                self.publisher.publish(batch);
                sink.render(batch);
                Ok(true)
            }
            DecodeOutcome::IncompletePayload { received } => {
                log::debug!("Incomplete batch ({received}/{expected} bytes), ignoring");
                Ok(false)
            }
            DecodeOutcome::NoData => Ok(false),
        }
    }
}

/// Background acquisition thread plus the handles the UI reads from.
pub struct Acquisition {
    handle: Option<JoinHandle<Result<DecoderStats, SourceError>>>,
    stop: Arc<AtomicBool>,
    stats: Arc<LinkStats>,
    view: BatchView,
    label: String,
}

impl Acquisition {
    pub fn spawn(
        mut source: Box<dyn ByteSource>,
        format: FrameFormat,
        poll_interval: Duration,
        mut sink: Box<dyn BatchSink>,
    ) -> std::io::Result<Self> {
        let (mut pipeline, view) = Pipeline::new(format, poll_interval);
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(LinkStats::default());
        let label = source.describe();

        log::info!(
            "Starting acquisition from {label}: marker 0x{:02X}, {} values per batch",
            format.marker,
            format.batch_len
        );

        let thread_stop = Arc::clone(&stop);
        let thread_stats = Arc::clone(&stats);
        let handle = thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || {
                pipeline.run(source.as_mut(), sink.as_mut(), &thread_stop, &thread_stats)
            })?;

        Ok(Self {
            handle: Some(handle),
            stop,
            stats,
            view,
            label,
        })
    }

    pub fn view(&self) -> &BatchView {
        &self.view
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats.snapshot()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Raise the stop flag and wait for the loop to exit.
    pub fn stop(&mut self) -> Result<DecoderStats, LinkError> {
        self.stop.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => Ok(result?),
                Err(_) => {
                    log::error!("Acquisition thread from {} panicked", self.label);
                    Err(LinkError::Panicked)
                }
            },
            None => Ok(self.stats.snapshot()),
        }
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}
