//! Playout is a realtime broadcast video compositor.
//!
//! A [`Server`] owns numbered [`Channel`]s, one per output [`VideoFormat`].
//! Each channel runs an independent pipeline:
//!
//! ```text
//! Producers -> Layers -> Stage -> Mixer (GPU) -> OutputFrame -> Consumers
//! ```
//!
//! - The **stage** ticks once per output frame, pulling every layer's
//!   producer in parallel under its tweened [`FrameTransform`].
//! - The **mixer** flattens the resulting frame trees and composites them on
//!   a [`mixer::GpuDevice`] with blend modes, alpha keys, scissor clipping,
//!   and interlaced field stipple.
//! - **Consumers** receive finished frames; back-pressure travels through a
//!   per-bundle [`stage::Ticket`], so the slowest clock-owning consumer
//!   paces the whole channel.
//!
//! The crate ships reference endpoints on both sides: color/image/media
//! producers, and clock/in-memory/ffmpeg consumers. A CPU
//! [`mixer::SoftwareDevice`] implements the full device contract, so the
//! complete pipeline runs (and is tested) without graphics hardware.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod channel;
pub mod consumer;
pub mod diag;
mod foundation;
pub mod format;
pub mod frame;
pub mod mixer;
pub mod producer;
pub mod server;
pub mod stage;

pub use channel::Channel;
pub use consumer::{Consumer, ConsumerSet, FrameLog, InMemoryConsumer, SystemClockConsumer};
#[cfg(feature = "media-ffmpeg")]
pub use consumer::{FfmpegConsumer, FfmpegConsumerOpts};
pub use diag::{MetricSink, NullMetricSink, TraceMetricSink};
pub use format::{FieldMode, Framerate, VideoFormat, rescale};
pub use foundation::error::{PlayoutError, PlayoutResult};
pub use foundation::executor::{Executor, Priority, TaskFuture, TaskPromise};
pub use foundation::queue::{AbortGuard, QueueReceiver, QueueSender, frame_queue};
pub use frame::draw_frame::{ConstFrame, DrawFrame, RenderItem};
pub use frame::pixel::{PixelDesc, PixelFormat, PlaneDesc};
pub use frame::transform::{BlendMode, FrameTransform, Levels};
pub use mixer::{GpuContext, GpuDevice, GpuFrameFactory, Mixer, OutputFrame, SoftwareDevice};
pub use producer::{
    ColorProducer, EmptyProducer, FrameFactory, ImageProducer, Producer, ReceiveFlags,
    empty_producer, parse_color, probe_image_path,
};
#[cfg(feature = "media-ffmpeg")]
pub use producer::{MediaProducer, MediaProducerOpts};
pub use server::Server;
pub use stage::{FrameBundle, Layer, LayerState, Stage, Ticket, Tweener};
