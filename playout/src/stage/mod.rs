//! The per-channel stage: ordered layers, tweened transforms, and the tick
//! protocol that feeds the mixer.

mod layer;
mod tween;

pub use layer::{Layer, LayerState};
pub use tween::{Tween, TweenedTransform, Tweener};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use rayon::prelude::*;

use crate::diag::MetricSink;
use crate::foundation::error::PlayoutResult;
use crate::foundation::executor::{Executor, Priority, TaskFuture};
use crate::format::VideoFormat;
use crate::frame::draw_frame::DrawFrame;
use crate::frame::transform::FrameTransform;
use crate::producer::{Producer, ReceiveFlags};

const DEINTERLACE_EPSILON: f64 = 1e-4;

/// Disposable back-pressure token attached to every emitted bundle.
///
/// Clones share one release action; when the last clone drops, the action
/// runs (the stage uses it to schedule the next tick). Consumers hold a
/// clone until they are done with the frame, so the slowest consumer paces
/// the channel.
#[derive(Clone)]
pub struct Ticket {
    inner: Arc<TicketInner>,
}

struct TicketInner {
    on_release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Ticket {
    /// Create a ticket whose final drop runs `on_release`.
    pub fn new(on_release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(TicketInner {
                on_release: Mutex::new(Some(Box::new(on_release))),
            }),
        }
    }
}

impl Drop for TicketInner {
    fn drop(&mut self) {
        if let Some(f) = self
            .on_release
            .lock()
            .expect("ticket lock poisoned")
            .take()
        {
            f();
        }
    }
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket").finish_non_exhaustive()
    }
}

/// One tick's worth of layer frames plus the back-pressure ticket.
#[derive(Debug)]
pub struct FrameBundle {
    /// Per-layer frames in layer order; stopped layers contribute the empty
    /// sentinel so the map always names every layer.
    pub frames: BTreeMap<i32, DrawFrame>,
    /// Released when every downstream reference drops.
    pub ticket: Ticket,
}

/// Where the stage sends finished bundles (the mixer front door).
pub type StageTarget = Arc<dyn Fn(FrameBundle) + Send + Sync>;

struct StageState {
    format: VideoFormat,
    layers: BTreeMap<i32, Layer>,
    transforms: BTreeMap<i32, TweenedTransform<FrameTransform>>,
    target: StageTarget,
    metrics: Arc<dyn MetricSink>,
}

/// Ordered layers plus their tweened transforms for one channel.
///
/// All mutations run on the stage's own serial executor; control operations
/// are queued at high priority so they land between ticks, before the next
/// one. A new tick is scheduled only when the previous bundle's ticket has
/// been fully released.
pub struct Stage {
    executor: Arc<Executor>,
    state: Arc<Mutex<StageState>>,
}

impl Stage {
    /// Create a stage sending bundles to `target`. Ticking starts with
    /// [`Stage::spawn_tick`].
    pub fn new(format: VideoFormat, target: StageTarget, metrics: Arc<dyn MetricSink>) -> Self {
        Self {
            executor: Arc::new(Executor::new("stage")),
            state: Arc::new(Mutex::new(StageState {
                format,
                layers: BTreeMap::new(),
                transforms: BTreeMap::new(),
                target,
                metrics,
            })),
        }
    }

    /// Kick off the tick loop; called exactly once by the owning channel.
    pub fn spawn_tick(&self) {
        schedule_tick(&self.executor, &Arc::downgrade(&self.state));
    }

    /// Replace the tween for `index` with one running toward `transform`.
    ///
    /// The tween starts from the transform's *current* in-between value, so
    /// retargeting mid-flight never jumps.
    pub fn set_transform(
        &self,
        index: i32,
        transform: FrameTransform,
        mix_duration: u32,
        tween: Tweener,
    ) -> TaskFuture<()> {
        let state = self.state.clone();
        self.executor.invoke(Priority::High, move || {
            let mut st = lock(&state);
            let src = st.transforms.entry(index).or_default().fetch();
            st.transforms
                .insert(index, TweenedTransform::new(src, transform, mix_duration, tween));
        })
    }

    /// Like [`Stage::set_transform`], but the destination is derived from the
    /// current value.
    pub fn apply_transform(
        &self,
        index: i32,
        f: impl FnOnce(FrameTransform) -> FrameTransform + Send + 'static,
        mix_duration: u32,
        tween: Tweener,
    ) -> TaskFuture<()> {
        let state = self.state.clone();
        self.executor.invoke(Priority::High, move || {
            let mut st = lock(&state);
            let src = st.transforms.entry(index).or_default().fetch();
            let dst = f(src.clone());
            st.transforms
                .insert(index, TweenedTransform::new(src, dst, mix_duration, tween));
        })
    }

    /// Drop the tween for one layer, or for all layers when `None`.
    pub fn clear_transforms(&self, index: Option<i32>) -> TaskFuture<()> {
        let state = self.state.clone();
        self.executor.invoke(Priority::High, move || {
            let mut st = lock(&state);
            match index {
                Some(i) => {
                    st.transforms.remove(&i);
                }
                None => st.transforms.clear(),
            }
        })
    }

    /// Load a producer into a layer (see [`Layer::load`]).
    pub fn load(
        &self,
        index: i32,
        producer: Box<dyn Producer>,
        preview: bool,
        auto_play_delta: Option<u32>,
    ) -> TaskFuture<()> {
        let state = self.state.clone();
        self.executor.invoke(Priority::High, move || {
            lock(&state)
                .layers
                .entry(index)
                .or_insert_with(|| Layer::new(index))
                .load(producer, preview, auto_play_delta);
        })
    }

    /// Start or resume a layer.
    pub fn play(&self, index: i32) -> TaskFuture<()> {
        self.with_layer(index, Layer::play)
    }

    /// Freeze a layer on its current frame.
    pub fn pause(&self, index: i32) -> TaskFuture<()> {
        self.with_layer(index, Layer::pause)
    }

    /// Stop a layer; it emits empty frames until played again.
    pub fn stop(&self, index: i32) -> TaskFuture<()> {
        self.with_layer(index, Layer::stop)
    }

    /// Remove one layer, or every layer when `None`.
    pub fn clear(&self, index: Option<i32>) -> TaskFuture<()> {
        let state = self.state.clone();
        self.executor.invoke(Priority::High, move || {
            let mut st = lock(&state);
            match index {
                Some(i) => {
                    if let Some(mut layer) = st.layers.remove(&i) {
                        layer.clear();
                    }
                }
                None => {
                    for (_, layer) in st.layers.iter_mut() {
                        layer.clear();
                    }
                    st.layers.clear();
                }
            }
        })
    }

    /// Swap two layers within this stage.
    pub fn swap_layer(&self, index: i32, other_index: i32) -> TaskFuture<()> {
        let state = self.state.clone();
        self.executor.invoke(Priority::High, move || {
            if index == other_index {
                return;
            }
            let mut st = lock(&state);
            let a = st
                .layers
                .remove(&index)
                .unwrap_or_else(|| Layer::new(index));
            let b = st
                .layers
                .remove(&other_index)
                .unwrap_or_else(|| Layer::new(other_index));
            st.layers.insert(index, b);
            st.layers.insert(other_index, a);
        })
    }

    /// Swap a layer with a layer of another stage.
    pub fn swap_layer_with(&self, index: i32, other_index: i32, other: &Stage) -> TaskFuture<()> {
        if Arc::ptr_eq(&self.state, &other.state) {
            return self.swap_layer(index, other_index);
        }
        self.paired_invoke(other, move |a, b| {
            let la = a.layers.remove(&index).unwrap_or_else(|| Layer::new(index));
            let lb = b
                .layers
                .remove(&other_index)
                .unwrap_or_else(|| Layer::new(other_index));
            a.layers.insert(index, lb);
            b.layers.insert(other_index, la);
        })
    }

    /// Swap the complete layer sets of two stages. No-op on the same stage.
    pub fn swap_layers(&self, other: &Stage) -> TaskFuture<()> {
        if Arc::ptr_eq(&self.state, &other.state) {
            return TaskFuture::ready(());
        }
        self.paired_invoke(other, |a, b| {
            std::mem::swap(&mut a.layers, &mut b.layers);
        })
    }

    /// Issue an async command to a layer's producer.
    pub fn call(
        &self,
        index: i32,
        foreground: bool,
        params: Vec<String>,
    ) -> PlayoutResult<TaskFuture<PlayoutResult<String>>> {
        let state = self.state.clone();
        self.executor
            .invoke(Priority::High, move || {
                lock(&state)
                    .layers
                    .entry(index)
                    .or_insert_with(|| Layer::new(index))
                    .call(foreground, &params)
            })
            .wait()
    }

    /// Description of a layer's foreground producer.
    pub fn foreground_info(&self, index: i32) -> TaskFuture<serde_json::Value> {
        let state = self.state.clone();
        self.executor.invoke(Priority::High, move || {
            lock(&state)
                .layers
                .get(&index)
                .map(Layer::foreground_info)
                .unwrap_or(serde_json::Value::Null)
        })
    }

    /// Description of a layer's background producer.
    pub fn background_info(&self, index: i32) -> TaskFuture<serde_json::Value> {
        let state = self.state.clone();
        self.executor.invoke(Priority::High, move || {
            lock(&state)
                .layers
                .get(&index)
                .map(Layer::background_info)
                .unwrap_or(serde_json::Value::Null)
        })
    }

    /// Structured dump of every layer.
    pub fn info(&self) -> TaskFuture<serde_json::Value> {
        let state = self.state.clone();
        self.executor.invoke(Priority::High, move || {
            let st = lock(&state);
            let layers: Vec<_> = st.layers.values().map(Layer::info).collect();
            serde_json::json!({
                "format": st.format.name,
                "layers": layers,
            })
        })
    }

    /// Swap in a new output format; takes effect on the next tick.
    pub fn set_video_format(&self, format: VideoFormat) -> TaskFuture<()> {
        let state = self.state.clone();
        self.executor.invoke(Priority::High, move || {
            lock(&state).format = format;
        })
    }

    fn with_layer(&self, index: i32, f: impl FnOnce(&mut Layer) + Send + 'static) -> TaskFuture<()> {
        let state = self.state.clone();
        self.executor.invoke(Priority::High, move || {
            let mut st = lock(&state);
            if let Some(layer) = st.layers.get_mut(&index) {
                f(layer);
            }
        })
    }

    /// Run `f` over both stages' states with both executors quiesced.
    ///
    /// The outer hop always lands on the executor with the smaller id, so two
    /// stages swapping with each other concurrently cannot deadlock.
    fn paired_invoke(
        &self,
        other: &Stage,
        f: impl FnOnce(&mut StageState, &mut StageState) + Send + 'static,
    ) -> TaskFuture<()> {
        let (outer_ex, inner_ex) = if self.executor.id() <= other.executor.id() {
            (self.executor.clone(), other.executor.clone())
        } else {
            (other.executor.clone(), self.executor.clone())
        };
        let self_state = self.state.clone();
        let other_state = other.state.clone();

        outer_ex.invoke(Priority::High, move || {
            let inner_job = inner_ex.invoke(Priority::High, move || {
                let mut a = lock(&self_state);
                let mut b = lock(&other_state);
                f(&mut a, &mut b);
            });
            let _ = inner_job.wait();
        })
    }
}

fn lock(state: &Arc<Mutex<StageState>>) -> std::sync::MutexGuard<'_, StageState> {
    state.lock().expect("stage state lock poisoned")
}

fn schedule_tick(executor: &Arc<Executor>, state: &Weak<Mutex<StageState>>) {
    let ex = executor.clone();
    let st = state.clone();
    executor.begin_invoke(Priority::Normal, move || {
        if let Some(state) = st.upgrade() {
            run_tick(&state, &ex);
        }
    });
}

struct LayerPlan {
    first: FrameTransform,
    second: Option<FrameTransform>,
    flags: ReceiveFlags,
}

fn run_tick(state: &Arc<Mutex<StageState>>, executor: &Arc<Executor>) {
    let started = Instant::now();
    let mut st = lock(state);
    let format = st.format.clone();
    let interlaced = format.field_mode.is_interlaced();

    // Advance tweens and derive flags serially; producer pulls go wide.
    let indices: Vec<i32> = st.layers.keys().copied().collect();
    let mut plans = BTreeMap::<i32, LayerPlan>::new();
    for index in indices {
        let tween = st.transforms.entry(index).or_default();
        let first = tween.fetch_and_tick(1);

        let mut flags = ReceiveFlags::NONE;
        if interlaced
            && ((first.fill_scale[1] - 1.0).abs() > DEINTERLACE_EPSILON
                || first.fill_translation[1].abs() > DEINTERLACE_EPSILON)
        {
            flags = flags.with(ReceiveFlags::DEINTERLACE);
        }
        if first.is_key {
            flags = flags.with(ReceiveFlags::ALPHA_ONLY);
        }

        let second = interlaced.then(|| tween.fetch_and_tick(1));
        plans.insert(
            index,
            LayerPlan {
                first,
                second,
                flags,
            },
        );
    }

    let frames: BTreeMap<i32, DrawFrame> = st
        .layers
        .par_iter_mut()
        .map(|(index, layer)| {
            let plan = &plans[index];
            let first = DrawFrame::with_transform(layer.receive(plan.flags), plan.first.clone());
            let frame = match &plan.second {
                Some(second_transform) => {
                    let second = DrawFrame::with_transform(
                        layer.receive(plan.flags),
                        second_transform.clone(),
                    );
                    DrawFrame::interlace(first, second, format.field_mode)
                }
                None => first,
            };
            (*index, frame)
        })
        .collect();

    let budget = format.frame_interval().as_secs_f64();
    st.metrics
        .set_value("produce-time", started.elapsed().as_secs_f64() / budget);

    let ticket = {
        let ex = executor.clone();
        let weak = Arc::downgrade(state);
        Ticket::new(move || schedule_tick(&ex, &weak))
    };

    let target = st.target.clone();
    drop(st);
    target(FrameBundle { frames, ticket });
}

#[cfg(test)]
#[path = "../../tests/unit/stage/stage.rs"]
mod tests;
