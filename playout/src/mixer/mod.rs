//! GPU-backed compositing of layer bundles into output frames.

pub mod device;
mod kernel;
mod software;

pub use device::{
    BlendFactor, GpuCapabilities, GpuContext, GpuDevice, Quad, RenderTarget, ShaderKind, Texture,
    TextureDesc, TexturePool, TexturePoolOpts, TexturePoolStats, Toggle, UniformValue,
};
pub use kernel::{LOWER_PATTERN, UPPER_PATTERN, draw_item};
pub use software::SoftwareDevice;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use smallvec::SmallVec;

use crate::diag::MetricSink;
use crate::foundation::error::{PlayoutError, PlayoutResult};
use crate::foundation::executor::TaskFuture;
use crate::format::VideoFormat;
use crate::frame::draw_frame::{ConstFrame, DrawFrame};
use crate::frame::pixel::PixelDesc;
use crate::producer::FrameFactory;

/// The mixed result of one tick: an immutable packed-BGRA view.
#[derive(Clone, Debug)]
pub struct OutputFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Premultiplied BGRA bytes, row-major, shared read-only.
    pub data: Arc<Vec<u8>>,
}

struct MixCache {
    background: Option<RenderTarget>,
}

/// Composites [`crate::stage::FrameBundle`] contents into [`OutputFrame`]s.
///
/// All drawing happens on the GPU context's serial executor. Layers are drawn
/// bottom to top; a run of key items inside a layer builds the local key for
/// the following fill item, and a layer that ends in an unconsumed key chain
/// provides the layer key for the next layer up.
pub struct Mixer {
    gpu: Arc<GpuContext>,
    format: VideoFormat,
    metrics: Arc<dyn MetricSink>,
    cache: Arc<Mutex<MixCache>>,
}

impl Mixer {
    /// Create a mixer drawing at `format` dimensions.
    pub fn new(gpu: Arc<GpuContext>, format: VideoFormat, metrics: Arc<dyn MetricSink>) -> Self {
        Self {
            gpu,
            format,
            metrics,
            cache: Arc::new(Mutex::new(MixCache { background: None })),
        }
    }

    /// Drop cached device resources; used when recovering from a device
    /// fault.
    pub fn reset(&self) {
        self.cache.lock().expect("mixer cache lock poisoned").background = None;
    }

    /// Queue a bundle for compositing and hand the result to `on_done` on the
    /// device executor.
    pub fn render_async(
        &self,
        frames: BTreeMap<i32, DrawFrame>,
        on_done: impl FnOnce(PlayoutResult<OutputFrame>) + Send + 'static,
    ) {
        let format = self.format.clone();
        let cache = self.cache.clone();
        let metrics = self.metrics.clone();
        self.gpu.begin_invoke(move |device| {
            let started = Instant::now();
            let result = mix(device, &format, &cache, frames);
            metrics.set_value(
                "mix-time",
                started.elapsed().as_secs_f64() / format.frame_interval().as_secs_f64(),
            );
            on_done(result);
        });
    }

    /// Composite a bundle and return the result as a future.
    pub fn render(&self, frames: BTreeMap<i32, DrawFrame>) -> TaskFuture<PlayoutResult<OutputFrame>> {
        let (promise, future) = TaskFuture::pair();
        self.render_async(frames, move |result| promise.set(result));
        future
    }

    /// The GPU context this mixer draws through.
    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }
}

fn mix(
    device: &mut dyn GpuDevice,
    format: &VideoFormat,
    cache: &Arc<Mutex<MixCache>>,
    frames: BTreeMap<i32, DrawFrame>,
) -> PlayoutResult<OutputFrame> {
    let background = {
        let mut cache = cache.lock().expect("mixer cache lock poisoned");
        let reusable = cache
            .background
            .as_ref()
            .is_some_and(|t| t.width() == format.width && t.height() == format.height);
        if !reusable {
            cache.background = Some(device.create_target(format.width, format.height)?);
        }
        cache.background.clone().expect("background target present")
    };
    device.clear_target(&background);

    let mut layer_key: Option<RenderTarget> = None;
    for frame in frames.into_values() {
        let items = frame.flatten();
        if items.is_empty() {
            continue;
        }

        let mut local_key: Option<RenderTarget> = None;
        for item in items {
            if item.transform.is_key {
                let key_target = match local_key.take() {
                    Some(t) => t,
                    None => {
                        let t = device.create_target(format.width, format.height)?;
                        device.clear_target(&t);
                        t
                    }
                };
                draw_item(device, item, &key_target, None, None)?;
                local_key = Some(key_target);
            } else {
                draw_item(
                    device,
                    item,
                    &background,
                    local_key.take().as_ref(),
                    layer_key.as_ref(),
                )?;
            }
        }
        // An unconsumed key chain masks the next layer up.
        layer_key = local_key;
    }

    let data = device.download(&background)?;
    Ok(OutputFrame {
        width: format.width,
        height: format.height,
        data: Arc::new(data),
    })
}

/// [`FrameFactory`] uploading through a channel's GPU context.
pub struct GpuFrameFactory {
    gpu: Arc<GpuContext>,
    format: VideoFormat,
}

impl GpuFrameFactory {
    /// Create a factory for one channel.
    pub fn new(gpu: Arc<GpuContext>, format: VideoFormat) -> Self {
        Self { gpu, format }
    }
}

impl FrameFactory for GpuFrameFactory {
    fn create_frame(&self, desc: &PixelDesc, planes: &[&[u8]]) -> PlayoutResult<DrawFrame> {
        desc.validate()?;
        if planes.len() != desc.planes.len() {
            return Err(PlayoutError::validation(format!(
                "frame factory got {} plane buffers for {} planes",
                planes.len(),
                desc.planes.len()
            )));
        }

        let uploads: Vec<(TextureDesc, Vec<u8>)> = desc
            .planes
            .iter()
            .zip(planes)
            .map(|(p, bytes)| {
                (
                    TextureDesc {
                        width: p.width,
                        height: p.height,
                        stride: p.stride,
                        channels: p.channels,
                    },
                    bytes.to_vec(),
                )
            })
            .collect();

        let textures = self
            .gpu
            .invoke(move |device| -> PlayoutResult<SmallVec<[Texture; 4]>> {
                uploads
                    .into_iter()
                    .map(|(d, bytes)| device.upload(d, &bytes))
                    .collect()
            })
            .wait()??;

        Ok(DrawFrame::leaf(Arc::new(ConstFrame {
            desc: desc.clone(),
            textures,
        })))
    }

    fn video_format(&self) -> &VideoFormat {
        &self.format
    }
}

#[cfg(test)]
#[path = "../../tests/unit/mixer/mixer.rs"]
mod tests;
