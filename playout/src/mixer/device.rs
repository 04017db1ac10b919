//! Graphics device capability and pooled texture handles.
//!
//! The mixer's image kernel speaks only to [`GpuDevice`]; the crate ships a
//! CPU reference implementation ([`crate::mixer::SoftwareDevice`]) and tests
//! use recording fakes. All device calls serialize through the context's own
//! executor, which is the single authority on resource lifetime ordering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::foundation::error::PlayoutResult;
use crate::foundation::executor::{Executor, Priority, TaskFuture};

/// Geometry of a texture allocation; also the pool bucket key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes per row.
    pub stride: u32,
    /// Components per pixel.
    pub channels: u32,
}

impl TextureDesc {
    /// Total byte size of the allocation.
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }
}

/// Static capabilities a device advertises.
#[derive(Clone, Copy, Debug, Default)]
pub struct GpuCapabilities {
    /// In-shader programmable blending; when set the kernel samples the
    /// background and issues texture barriers instead of fixed-function
    /// blend funcs.
    pub blend_modes: bool,
}

/// Shaders the kernel can select.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderKind {
    /// The per-item compositing shader.
    Image,
}

/// A value bound to a named shader uniform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer (format/mode codes, texture units).
    Int(i32),
    /// Scalar.
    Float(f64),
}

impl UniformValue {
    /// Read as f64, with bools mapping to 0/1.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Int(i) => f64::from(i),
            Self::Float(f) => f,
        }
    }

    /// Read as bool; numbers are truthy when non-zero.
    pub fn as_bool(&self) -> bool {
        match *self {
            Self::Bool(b) => b,
            Self::Int(i) => i != 0,
            Self::Float(f) => f != 0.0,
        }
    }

    /// Read as i32 (rounding floats).
    pub fn as_i32(&self) -> i32 {
        match *self {
            Self::Bool(b) => i32::from(b),
            Self::Int(i) => i,
            Self::Float(f) => f.round() as i32,
        }
    }
}

/// Fixed-function blend factors for devices without programmable blending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFactor {
    /// 1.
    One,
    /// 0.
    Zero,
    /// Source alpha.
    SrcAlpha,
    /// 1 - source alpha.
    OneMinusSrcAlpha,
}

/// Device state toggles used by the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Toggle {
    /// Scissor rectangle test.
    ScissorTest,
    /// 32x32 polygon stipple mask.
    PolygonStipple,
}

/// A textured quad: positions in clip space, two sets of texture coordinates.
///
/// Unit 0 samples the source planes canonically over `[0,1]^2`; unit 1 holds
/// the placement coordinates used for background/key lookups.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quad {
    /// Vertex positions in clip space, counter-clockwise from lower-left.
    pub positions: [[f64; 2]; 4],
    /// Canonical source sampling coordinates.
    pub tex0: [[f64; 2]; 4],
    /// Placement-space coordinates.
    pub tex1: [[f64; 2]; 4],
}

/// Texture binding units used by the image shader.
pub mod texture_unit {
    /// First source plane; planes N bind to `PLANE0 + N`.
    pub const PLANE0: usize = 0;
    /// Local key alpha mask.
    pub const LOCAL_KEY: usize = 4;
    /// Layer key alpha mask.
    pub const LAYER_KEY: usize = 5;
    /// Background sampler for in-shader blending.
    pub const BACKGROUND: usize = 6;
}

/// Serialized access to graphics resources.
///
/// The call sequence for one drawn item is prescribed by the image kernel;
/// implementations hold whatever state those calls establish until the next
/// `draw_quad`.
pub trait GpuDevice: Send {
    /// Capability flags.
    fn capabilities(&self) -> GpuCapabilities;

    /// Transfer host bytes into a (pooled) device texture.
    fn upload(&mut self, desc: TextureDesc, bytes: &[u8]) -> PlayoutResult<Texture>;

    /// Read back a render target as packed BGRA bytes.
    fn download(&mut self, target: &RenderTarget) -> PlayoutResult<Vec<u8>>;

    /// Allocate a BGRA render target.
    fn create_target(&mut self, width: u32, height: u32) -> PlayoutResult<RenderTarget>;

    /// Zero a render target.
    fn clear_target(&mut self, target: &RenderTarget);

    /// Select the active shader.
    fn use_shader(&mut self, shader: ShaderKind) -> PlayoutResult<()>;

    /// Set a named uniform on the active shader.
    fn set_uniform(&mut self, name: &str, value: UniformValue);

    /// Bind a texture to a unit.
    fn bind(&mut self, texture: &Texture, unit: usize);

    /// Bind a render target's contents as a sampler (background blending).
    fn bind_target(&mut self, target: &RenderTarget, unit: usize);

    /// Unbind every texture unit.
    fn unbind_all(&mut self);

    /// Attach the draw destination.
    fn attach(&mut self, target: &RenderTarget);

    /// Set the viewport rectangle.
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);

    /// Set the scissor rectangle (only honored while scissor is enabled).
    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32);

    /// Enable a state toggle.
    fn enable(&mut self, toggle: Toggle);

    /// Disable a state toggle.
    fn disable(&mut self, toggle: Toggle);

    /// Set the 32x32 (128-byte) stipple pattern.
    fn stipple_pattern(&mut self, pattern: &[u8; 128]);

    /// Configure fixed-function blending.
    fn blend_func_separate(
        &mut self,
        src: BlendFactor,
        dst: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    );

    /// Draw one textured quad with the current state.
    fn draw_quad(&mut self, quad: &Quad) -> PlayoutResult<()>;

    /// Make preceding writes to the attached target visible to samplers.
    ///
    /// Only meaningful when `blend_modes` is advertised.
    fn texture_barrier(&mut self);

    /// Give background transfers a chance to complete.
    fn yield_now(&mut self);
}

/// Owning handle to a pooled device texture. Cloning shares the allocation;
/// the backing buffer returns to its pool when the last clone drops.
#[derive(Clone)]
pub struct Texture {
    inner: Arc<TextureInner>,
}

struct TextureInner {
    desc: TextureDesc,
    data: Mutex<Vec<u8>>,
    ready: AtomicBool,
    pool: Weak<PoolShared>,
}

impl Texture {
    /// Geometry of this texture.
    pub fn desc(&self) -> TextureDesc {
        self.inner.desc
    }

    /// `true` once the host-to-device transfer completed.
    pub fn ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    pub(crate) fn mark_ready(&self) {
        self.inner.ready.store(true, Ordering::Release);
    }

    /// Run `f` over the texel bytes.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.inner.data.lock().expect("texture lock poisoned"))
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("desc", &self.inner.desc)
            .field("ready", &self.ready())
            .finish()
    }
}

impl Drop for TextureInner {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            let data = std::mem::take(self.data.get_mut().expect("texture lock poisoned"));
            pool.release(self.desc, data);
        }
    }
}

/// Pool retention limits.
#[derive(Clone, Copy, Debug)]
pub struct TexturePoolOpts {
    /// Maximum bytes retained across all buckets.
    pub max_pool_bytes: usize,
    /// Maximum retained buffers per `(w,h,stride,channels)` bucket.
    pub max_per_bucket: usize,
}

impl Default for TexturePoolOpts {
    fn default() -> Self {
        Self {
            max_pool_bytes: 512 * 1024 * 1024,
            max_per_bucket: 8,
        }
    }
}

/// Running pool counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TexturePoolStats {
    /// Buffers currently parked in the pool.
    pub retained: usize,
    /// Bytes currently parked in the pool.
    pub retained_bytes: usize,
    /// Fresh allocations since construction.
    pub allocations: u64,
    /// Buffers dropped at release because a cap was hit.
    pub dropped_on_release: u64,
}

struct PoolBuckets {
    map: HashMap<TextureDesc, Vec<Vec<u8>>>,
    stats: TexturePoolStats,
}

struct PoolShared {
    opts: TexturePoolOpts,
    buckets: Mutex<PoolBuckets>,
}

impl PoolShared {
    fn release(&self, desc: TextureDesc, mut data: Vec<u8>) {
        let mut b = self.buckets.lock().expect("texture pool lock poisoned");
        let bytes = desc.byte_len();
        let bucket_full = b.map.get(&desc).map(Vec::len).unwrap_or(0) >= self.opts.max_per_bucket;
        if bucket_full || b.stats.retained_bytes + bytes > self.opts.max_pool_bytes {
            b.stats.dropped_on_release += 1;
            return;
        }
        data.clear();
        b.map.entry(desc).or_default().push(data);
        b.stats.retained += 1;
        b.stats.retained_bytes += bytes;
    }
}

/// Device-local texture pool keyed by geometry.
pub struct TexturePool {
    shared: Arc<PoolShared>,
}

impl TexturePool {
    /// Create a pool with the given retention limits.
    pub fn new(opts: TexturePoolOpts) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                opts,
                buckets: Mutex::new(PoolBuckets {
                    map: HashMap::new(),
                    stats: TexturePoolStats::default(),
                }),
            }),
        }
    }

    /// Create a texture from host bytes, reusing a pooled buffer when one fits.
    pub fn create(&self, desc: TextureDesc, bytes: &[u8]) -> PlayoutResult<Texture> {
        if bytes.len() != desc.byte_len() {
            return Err(crate::foundation::error::PlayoutError::validation(format!(
                "texture upload size mismatch: got {} bytes, descriptor needs {}",
                bytes.len(),
                desc.byte_len()
            )));
        }

        let mut data = {
            let mut b = self.shared.buckets.lock().expect("texture pool lock poisoned");
            match b.map.get_mut(&desc).and_then(Vec::pop) {
                Some(buf) => {
                    b.stats.retained -= 1;
                    b.stats.retained_bytes -= desc.byte_len();
                    buf
                }
                None => {
                    b.stats.allocations += 1;
                    Vec::with_capacity(desc.byte_len())
                }
            }
        };
        data.clear();
        data.extend_from_slice(bytes);

        let texture = Texture {
            inner: Arc::new(TextureInner {
                desc,
                data: Mutex::new(data),
                ready: AtomicBool::new(false),
                pool: Arc::downgrade(&self.shared),
            }),
        };
        texture.mark_ready();
        Ok(texture)
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> TexturePoolStats {
        self.shared
            .buckets
            .lock()
            .expect("texture pool lock poisoned")
            .stats
    }
}

impl Default for TexturePool {
    fn default() -> Self {
        Self::new(TexturePoolOpts::default())
    }
}

/// A BGRA render target (the mixer's accumulator and key buffers).
#[derive(Clone)]
pub struct RenderTarget {
    inner: Arc<TargetInner>,
}

struct TargetInner {
    width: u32,
    height: u32,
    data: Mutex<Vec<u8>>,
}

impl RenderTarget {
    /// Allocate a zeroed target.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(TargetInner {
                width,
                height,
                data: Mutex::new(vec![0u8; width as usize * height as usize * 4]),
            }),
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.inner.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.inner.height
    }

    /// Run `f` over the pixel bytes.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.inner.data.lock().expect("render target lock poisoned"))
    }

    /// Run `f` over the mutable pixel bytes.
    pub fn with_data_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.inner.data.lock().expect("render target lock poisoned"))
    }

    /// Zero the target.
    pub fn clear(&self) {
        self.with_data_mut(|d| d.fill(0));
    }
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .finish()
    }
}

/// A device plus the serial executor every call goes through.
pub struct GpuContext {
    executor: Executor,
    device: Arc<Mutex<Box<dyn GpuDevice>>>,
}

impl GpuContext {
    /// Wrap a device with its own serial executor.
    pub fn new(device: Box<dyn GpuDevice>) -> Arc<Self> {
        Arc::new(Self {
            executor: Executor::new("gpu"),
            device: Arc::new(Mutex::new(device)),
        })
    }

    /// Run `f` on the device executor and return its result as a future.
    pub fn invoke<T, F>(&self, f: F) -> TaskFuture<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn GpuDevice) -> T + Send + 'static,
    {
        let device = self.device.clone();
        self.executor.invoke(Priority::Normal, move || {
            let mut device = device.lock().expect("gpu device lock poisoned");
            f(device.as_mut())
        })
    }

    /// Fire-and-forget variant of [`GpuContext::invoke`].
    pub fn begin_invoke<F>(&self, f: F)
    where
        F: FnOnce(&mut dyn GpuDevice) + Send + 'static,
    {
        let device = self.device.clone();
        self.executor.begin_invoke(Priority::Normal, move || {
            let mut device = device.lock().expect("gpu device lock poisoned");
            f(device.as_mut());
        });
    }
}

#[cfg(test)]
#[path = "../../tests/unit/mixer/device.rs"]
mod tests;
