//! Frame sink capability and the built-in consumers.

#[cfg(feature = "media-ffmpeg")]
mod file;

#[cfg(feature = "media-ffmpeg")]
pub use file::{FfmpegConsumer, FfmpegConsumerOpts};

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::foundation::error::PlayoutResult;
use crate::foundation::executor::{Executor, Priority};
use crate::format::VideoFormat;
use crate::mixer::OutputFrame;
use crate::stage::Ticket;

/// A sink receiving one mixed frame per channel tick.
///
/// `consume` runs on the consumer's own serial executor; it may block (that
/// is how a synchronization clock paces the channel) but must eventually
/// return so its ticket clone releases.
pub trait Consumer: Send {
    /// Called once when attached to a channel.
    fn initialize(&mut self, format: &VideoFormat) -> PlayoutResult<()> {
        let _ = format;
        Ok(())
    }

    /// Handle one frame.
    fn consume(&mut self, frame: &OutputFrame) -> PlayoutResult<()>;

    /// `true` when this consumer owns the channel's timing clock.
    fn has_synchronization_clock(&self) -> bool {
        false
    }

    /// Frames of internal buffering this consumer adds.
    fn buffer_depth(&self) -> u32 {
        1
    }

    /// One-line human description.
    fn print(&self) -> String;

    /// Idempotent early shutdown.
    fn abort(&mut self) {}
}

struct ConsumerEntry {
    index: i32,
    executor: Arc<Executor>,
    consumer: Arc<Mutex<Box<dyn Consumer>>>,
}

/// Indexed set of consumers fanning out each output frame in parallel.
///
/// Every consumer gets its own serial executor; each dispatched frame holds a
/// ticket clone until that consumer's `consume` returns, which is the whole
/// back-pressure mechanism: the stage cannot tick again until the slowest
/// consumer lets go.
pub struct ConsumerSet {
    format: VideoFormat,
    entries: Vec<ConsumerEntry>,
}

impl ConsumerSet {
    /// Create an empty set for one channel format.
    pub fn new(format: VideoFormat) -> Self {
        Self {
            format,
            entries: Vec::new(),
        }
    }

    /// Attach a consumer under `index`, replacing any previous holder.
    pub fn add(&mut self, index: i32, mut consumer: Box<dyn Consumer>) -> PlayoutResult<()> {
        consumer.initialize(&self.format)?;
        self.remove(index);
        self.entries.push(ConsumerEntry {
            index,
            executor: Arc::new(Executor::new(&format!("consumer-{index}"))),
            consumer: Arc::new(Mutex::new(consumer)),
        });
        self.entries.sort_by_key(|e| e.index);
        Ok(())
    }

    /// Detach and abort the consumer under `index`.
    pub fn remove(&mut self, index: i32) -> bool {
        if let Some(pos) = self.entries.iter().position(|e| e.index == index) {
            let entry = self.entries.remove(pos);
            entry
                .consumer
                .lock()
                .expect("consumer lock poisoned")
                .abort();
            true
        } else {
            false
        }
    }

    /// Number of attached consumers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no consumer is attached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` when some attached consumer owns a synchronization clock.
    pub fn has_synchronization_clock(&self) -> bool {
        self.entries.iter().any(|e| {
            e.consumer
                .lock()
                .expect("consumer lock poisoned")
                .has_synchronization_clock()
        })
    }

    /// Fan a frame out to every consumer; each holds a ticket clone until
    /// its `consume` call finishes.
    pub fn dispatch(&self, frame: Arc<OutputFrame>, ticket: Ticket) {
        for entry in &self.entries {
            let consumer = entry.consumer.clone();
            let frame = frame.clone();
            let ticket = ticket.clone();
            let index = entry.index;
            entry.executor.begin_invoke(Priority::Normal, move || {
                let mut consumer = consumer.lock().expect("consumer lock poisoned");
                if let Err(e) = consumer.consume(&frame) {
                    tracing::warn!(consumer = index, error = %e, "consumer failed on frame");
                }
                drop(ticket);
            });
        }
        drop(ticket);
    }

    /// Structured description of the set.
    pub fn info(&self) -> serde_json::Value {
        let consumers: Vec<_> = self
            .entries
            .iter()
            .map(|e| {
                let c = e.consumer.lock().expect("consumer lock poisoned");
                serde_json::json!({
                    "index": e.index,
                    "print": c.print(),
                    "clock": c.has_synchronization_clock(),
                    "buffer-depth": c.buffer_depth(),
                })
            })
            .collect();
        serde_json::Value::Array(consumers)
    }

    /// Abort every consumer and drop the set's executors.
    pub fn abort_all(&mut self) {
        for entry in &self.entries {
            entry
                .consumer
                .lock()
                .expect("consumer lock poisoned")
                .abort();
        }
        self.entries.clear();
    }
}

/// Paces the channel to wall-clock time; owns the synchronization clock.
pub struct SystemClockConsumer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl SystemClockConsumer {
    /// Create an unpaced clock; the interval comes from `initialize`.
    pub fn new() -> Self {
        Self {
            interval: Duration::ZERO,
            deadline: None,
        }
    }
}

impl Default for SystemClockConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl Consumer for SystemClockConsumer {
    fn initialize(&mut self, format: &VideoFormat) -> PlayoutResult<()> {
        self.interval = format.frame_interval();
        self.deadline = None;
        Ok(())
    }

    fn consume(&mut self, _frame: &OutputFrame) -> PlayoutResult<()> {
        let now = Instant::now();
        match self.deadline {
            Some(deadline) => {
                if deadline > now {
                    std::thread::sleep(deadline - now);
                }
                // Late frames re-anchor instead of bursting to catch up.
                let next = deadline + self.interval;
                self.deadline = Some(if next < now { now + self.interval } else { next });
            }
            None => self.deadline = Some(now + self.interval),
        }
        Ok(())
    }

    fn has_synchronization_clock(&self) -> bool {
        true
    }

    fn print(&self) -> String {
        "system-clock".to_owned()
    }
}

/// Shared view over the frames an [`InMemoryConsumer`] captured.
#[derive(Clone)]
pub struct FrameLog {
    frames: Arc<Mutex<Vec<Arc<OutputFrame>>>>,
}

impl FrameLog {
    /// Number of captured frames.
    pub fn len(&self) -> usize {
        self.frames.lock().expect("frame log lock poisoned").len()
    }

    /// `true` when nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the captured frames.
    pub fn frames(&self) -> Vec<Arc<OutputFrame>> {
        self.frames.lock().expect("frame log lock poisoned").clone()
    }
}

/// Captures frames in memory; tests use the optional hold to simulate a slow
/// consumer.
pub struct InMemoryConsumer {
    log: FrameLog,
    hold: Option<Duration>,
}

impl InMemoryConsumer {
    /// Create a consumer and the handle for inspecting what it captured.
    pub fn new(hold: Option<Duration>) -> (Self, FrameLog) {
        let log = FrameLog {
            frames: Arc::new(Mutex::new(Vec::new())),
        };
        (
            Self {
                log: log.clone(),
                hold,
            },
            log,
        )
    }
}

impl Consumer for InMemoryConsumer {
    fn consume(&mut self, frame: &OutputFrame) -> PlayoutResult<()> {
        if let Some(hold) = self.hold {
            std::thread::sleep(hold);
        }
        self.log
            .frames
            .lock()
            .expect("frame log lock poisoned")
            .push(Arc::new(frame.clone()));
        Ok(())
    }

    fn print(&self) -> String {
        "in-memory".to_owned()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/consumer/consumer.rs"]
mod tests;
