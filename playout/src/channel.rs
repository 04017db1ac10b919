//! One output pipeline: stage → mixer → consumers, bound to a format.

use std::sync::{Arc, Mutex};

use crate::consumer::{Consumer, ConsumerSet};
use crate::diag::MetricSink;
use crate::foundation::error::{PlayoutError, PlayoutResult};
use crate::foundation::executor::TaskFuture;
use crate::format::VideoFormat;
use crate::frame::transform::FrameTransform;
use crate::mixer::{GpuContext, GpuFrameFactory, Mixer};
use crate::producer::{FrameFactory, Producer};
use crate::stage::{FrameBundle, Stage, StageTarget, Tweener};

/// A channel owns the tick pipeline for one video format and exposes the
/// control surface the outer server calls.
///
/// The loop never blocks on consumers; back-pressure travels exclusively
/// through bundle tickets. A failed draw drops that bundle only; a device
/// fault additionally resets the mixer's cached resources. Producers survive
/// both.
pub struct Channel {
    format: VideoFormat,
    stage: Arc<Stage>,
    consumers: Arc<Mutex<ConsumerSet>>,
    factory: Arc<dyn FrameFactory>,
}

impl Channel {
    /// Build a channel on a shared GPU context and start ticking.
    pub fn new(
        format: VideoFormat,
        gpu: Arc<GpuContext>,
        metrics: Arc<dyn MetricSink>,
    ) -> Arc<Self> {
        let consumers = Arc::new(Mutex::new(ConsumerSet::new(format.clone())));
        let mixer = Arc::new(Mixer::new(gpu.clone(), format.clone(), metrics.clone()));
        let factory: Arc<dyn FrameFactory> =
            Arc::new(GpuFrameFactory::new(gpu.clone(), format.clone()));

        let target: StageTarget = {
            let mixer = mixer.clone();
            let consumers = consumers.clone();
            Arc::new(move |bundle: FrameBundle| {
                let FrameBundle { frames, ticket } = bundle;
                let consumers = consumers.clone();
                let mixer_for_reset = mixer.clone();
                mixer.render_async(frames, move |result| match result {
                    Ok(frame) => {
                        consumers
                            .lock()
                            .expect("consumer set lock poisoned")
                            .dispatch(Arc::new(frame), ticket);
                    }
                    Err(e) => {
                        if matches!(e, PlayoutError::GpuDevice(_)) {
                            tracing::error!(error = %e, "gpu device fault; resetting mixer");
                            mixer_for_reset.reset();
                        } else {
                            tracing::error!(error = %e, "dropping bundle after draw failure");
                        }
                        drop(ticket);
                    }
                });
            })
        };

        let stage = Arc::new(Stage::new(format.clone(), target, metrics));
        stage.spawn_tick();

        Arc::new(Self {
            format,
            stage,
            consumers,
            factory,
        })
    }

    /// The channel's output format.
    pub fn format(&self) -> &VideoFormat {
        &self.format
    }

    /// The stage, for advanced callers (tests, cross-channel swaps).
    pub fn stage(&self) -> &Arc<Stage> {
        &self.stage
    }

    /// Attach a consumer under `index`.
    pub fn add_consumer(&self, index: i32, consumer: Box<dyn Consumer>) -> PlayoutResult<()> {
        self.consumers
            .lock()
            .expect("consumer set lock poisoned")
            .add(index, consumer)
    }

    /// Detach the consumer under `index`.
    pub fn remove_consumer(&self, index: i32) -> bool {
        self.consumers
            .lock()
            .expect("consumer set lock poisoned")
            .remove(index)
    }

    /// Initialize a producer against this channel and load it into a layer.
    pub fn load(
        &self,
        index: i32,
        mut producer: Box<dyn Producer>,
        play_on_load: bool,
        auto_play_delta: Option<u32>,
    ) -> PlayoutResult<TaskFuture<()>> {
        producer.initialize(self.factory.clone())?;
        let loaded = self.stage.load(index, producer, false, auto_play_delta);
        if play_on_load {
            Ok(self.stage.play(index))
        } else {
            Ok(loaded)
        }
    }

    /// Initialize a producer and show its first frame paused.
    pub fn preview(&self, index: i32, mut producer: Box<dyn Producer>) -> PlayoutResult<TaskFuture<()>> {
        producer.initialize(self.factory.clone())?;
        Ok(self.stage.load(index, producer, true, None))
    }

    /// Start or resume a layer.
    pub fn play(&self, index: i32) -> TaskFuture<()> {
        self.stage.play(index)
    }

    /// Freeze a layer.
    pub fn pause(&self, index: i32) -> TaskFuture<()> {
        self.stage.pause(index)
    }

    /// Stop a layer.
    pub fn stop(&self, index: i32) -> TaskFuture<()> {
        self.stage.stop(index)
    }

    /// Remove one layer, or all layers when `None`.
    pub fn clear(&self, index: Option<i32>) -> TaskFuture<()> {
        self.stage.clear(index)
    }

    /// Tween a layer's opacity.
    pub fn set_video_opacity(
        &self,
        index: i32,
        value: f64,
        mix_duration: u32,
        tween: Tweener,
    ) -> TaskFuture<()> {
        self.stage.apply_transform(
            index,
            move |mut t| {
                t.opacity = value.clamp(0.0, 1.0);
                t
            },
            mix_duration,
            tween,
        )
    }

    /// Tween a layer's video gain (multiplicative brightness).
    pub fn set_video_gain(
        &self,
        index: i32,
        value: f64,
        mix_duration: u32,
        tween: Tweener,
    ) -> TaskFuture<()> {
        self.stage.apply_transform(
            index,
            move |mut t| {
                t.brightness = value;
                t
            },
            mix_duration,
            tween,
        )
    }

    /// Tween a layer's audio gain.
    pub fn set_audio_gain(
        &self,
        index: i32,
        value: f64,
        mix_duration: u32,
        tween: Tweener,
    ) -> TaskFuture<()> {
        self.stage.apply_transform(
            index,
            move |mut t| {
                t.audio_gain = value;
                t
            },
            mix_duration,
            tween,
        )
    }

    /// Replace a layer's transform tween.
    pub fn set_frame_transform(
        &self,
        index: i32,
        transform: FrameTransform,
        mix_duration: u32,
        tween: Tweener,
    ) -> TaskFuture<()> {
        self.stage.set_transform(index, transform, mix_duration, tween)
    }

    /// Derive a layer's transform tween from its current value.
    pub fn apply_frame_transform(
        &self,
        index: i32,
        f: impl FnOnce(FrameTransform) -> FrameTransform + Send + 'static,
        mix_duration: u32,
        tween: Tweener,
    ) -> TaskFuture<()> {
        self.stage.apply_transform(index, f, mix_duration, tween)
    }

    /// Drop transform tweens for one layer or all layers.
    pub fn clear_frame_transforms(&self, index: Option<i32>) -> TaskFuture<()> {
        self.stage.clear_transforms(index)
    }

    /// Swap two layers inside this channel.
    pub fn swap_layer(&self, index: i32, other_index: i32) -> TaskFuture<()> {
        self.stage.swap_layer(index, other_index)
    }

    /// Swap a layer with a layer of another channel.
    pub fn swap_layer_with(&self, index: i32, other_index: i32, other: &Channel) -> TaskFuture<()> {
        self.stage.swap_layer_with(index, other_index, &other.stage)
    }

    /// Swap every layer with another channel.
    pub fn swap_layers(&self, other: &Channel) -> TaskFuture<()> {
        self.stage.swap_layers(&other.stage)
    }

    /// Async command to a layer's producer.
    pub fn call(
        &self,
        index: i32,
        foreground: bool,
        params: Vec<String>,
    ) -> PlayoutResult<TaskFuture<PlayoutResult<String>>> {
        self.stage.call(index, foreground, params)
    }

    /// Describe a layer's foreground producer.
    pub fn foreground(&self, index: i32) -> TaskFuture<serde_json::Value> {
        self.stage.foreground_info(index)
    }

    /// Describe a layer's background producer.
    pub fn background(&self, index: i32) -> TaskFuture<serde_json::Value> {
        self.stage.background_info(index)
    }

    /// Structured description of the whole channel.
    pub fn info(&self) -> PlayoutResult<serde_json::Value> {
        let stage_info = self.stage.info().wait()?;
        let consumers = self
            .consumers
            .lock()
            .expect("consumer set lock poisoned")
            .info();
        Ok(serde_json::json!({
            "format": self.format.name,
            "stage": stage_info,
            "consumers": consumers,
        }))
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        // Dependency order: consumers first, then stage/mixer executors wind
        // down as their Arcs drop; the shared GPU context outlives us.
        self.consumers
            .lock()
            .expect("consumer set lock poisoned")
            .abort_all();
    }
}

#[cfg(test)]
#[path = "../tests/unit/channel.rs"]
mod tests;
