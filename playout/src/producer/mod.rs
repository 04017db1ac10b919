//! Frame source capability and the built-in reference producers.

mod color;
mod image;
#[cfg(feature = "media-ffmpeg")]
mod media;

pub use color::{ColorProducer, parse_color};
pub use image::{ImageProducer, probe_image_path};
#[cfg(feature = "media-ffmpeg")]
pub use media::{MediaProducer, MediaProducerOpts};

use std::sync::Arc;

use crate::foundation::error::{PlayoutError, PlayoutResult};
use crate::foundation::executor::TaskFuture;
use crate::format::VideoFormat;
use crate::frame::draw_frame::DrawFrame;
use crate::frame::pixel::PixelDesc;

/// Per-receive hints handed down from the stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReceiveFlags(u8);

impl ReceiveFlags {
    /// No hints.
    pub const NONE: ReceiveFlags = ReceiveFlags(0);
    /// The frame will be scaled/moved vertically on an interlaced channel;
    /// the producer should deinterlace.
    pub const DEINTERLACE: ReceiveFlags = ReceiveFlags(1);
    /// Only the alpha channel will be used (the layer is a key).
    pub const ALPHA_ONLY: ReceiveFlags = ReceiveFlags(2);

    /// Union of two flag sets.
    pub fn with(self, other: ReceiveFlags) -> ReceiveFlags {
        ReceiveFlags(self.0 | other.0)
    }

    /// `true` when every flag in `other` is set.
    pub fn contains(self, other: ReceiveFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Allocates GPU-backed frames for producers.
///
/// A producer receives a factory handle in [`Producer::initialize`] and must
/// not outlive it in any way that keeps the channel alive; the handle is a
/// capability, not ownership of the channel.
pub trait FrameFactory: Send + Sync {
    /// Upload plane bytes and build a leaf frame.
    fn create_frame(&self, desc: &PixelDesc, planes: &[&[u8]]) -> PlayoutResult<DrawFrame>;

    /// The owning channel's output format.
    fn video_format(&self) -> &VideoFormat;
}

/// A source of frames, pulled once per output frame.
///
/// Contract highlights:
/// - `receive` must not block the stage longer than one frame budget; a
///   producer that is not ready returns its previous frame or the empty
///   sentinel, by its own smoothness policy.
/// - at end-of-media `receive` returns the eof sentinel exactly once and the
///   empty sentinel on every later call.
/// - destruction must promptly unblock any internal queue (see `abort`).
pub trait Producer: Send {
    /// Produce the next frame.
    fn receive(&mut self, flags: ReceiveFlags) -> PlayoutResult<DrawFrame>;

    /// Bind to the channel's frame factory; called once before any `receive`.
    fn initialize(&mut self, _factory: Arc<dyn FrameFactory>) -> PlayoutResult<()> {
        Ok(())
    }

    /// Producer-specific async command (seek, loop, ...).
    fn call(&mut self, params: &[String]) -> TaskFuture<PlayoutResult<String>> {
        let _ = params;
        TaskFuture::ready(Err(PlayoutError::validation(format!(
            "producer '{}' accepts no commands",
            self.name()
        ))))
    }

    /// Short stable identifier, e.g. `color` or `ffmpeg`.
    fn name(&self) -> &str;

    /// Structured description for the control surface.
    fn info(&self) -> serde_json::Value {
        serde_json::json!({ "type": self.name() })
    }

    /// One-line human description.
    fn print(&self) -> String {
        self.name().to_owned()
    }

    /// Nominal length in frames; `u32::MAX` for infinite or looping media.
    fn nb_frames(&self) -> u32 {
        u32::MAX
    }

    /// Idempotent early shutdown: abort internal queues and join workers.
    fn abort(&mut self) {}
}

/// The producer that has nothing to say; `receive` is always empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyProducer;

impl Producer for EmptyProducer {
    fn receive(&mut self, _flags: ReceiveFlags) -> PlayoutResult<DrawFrame> {
        Ok(DrawFrame::empty())
    }

    fn name(&self) -> &str {
        "empty"
    }

    fn nb_frames(&self) -> u32 {
        0
    }
}

/// Boxed [`EmptyProducer`].
pub fn empty_producer() -> Box<dyn Producer> {
    Box::new(EmptyProducer)
}
