//! CPU reference implementation of the [`GpuDevice`] capability.
//!
//! Renders exactly what the image kernel programs: plane sampling with
//! BT.601/709 selection, levels and contrast/saturation/brightness, key
//! masks, in-shader blend modes over a premultiplied background, scissor,
//! and even/odd line stipple. Pixels are BGRA8 end to end.

use std::collections::HashMap;

use crate::foundation::error::{PlayoutError, PlayoutResult};
use crate::frame::pixel::PixelFormat;
use crate::frame::transform::BlendMode;
use crate::mixer::device::{
    BlendFactor, GpuCapabilities, GpuDevice, Quad, RenderTarget, ShaderKind, Texture, TextureDesc,
    TexturePool, TexturePoolOpts, Toggle, UniformValue, texture_unit,
};

/// CPU rasterizer advertising programmable blending.
pub struct SoftwareDevice {
    pool: TexturePool,
    uniforms: HashMap<String, UniformValue>,
    bound_textures: HashMap<usize, Texture>,
    bound_targets: HashMap<usize, RenderTarget>,
    attached: Option<RenderTarget>,
    shader: Option<ShaderKind>,
    viewport: (i32, i32, i32, i32),
    scissor: (i32, i32, i32, i32),
    scissor_enabled: bool,
    stipple: [u8; 128],
    stipple_enabled: bool,
}

impl SoftwareDevice {
    /// Create a device with default pool limits.
    pub fn new() -> Self {
        Self::with_pool(TexturePoolOpts::default())
    }

    /// Create a device with explicit texture pool limits.
    pub fn with_pool(opts: TexturePoolOpts) -> Self {
        Self {
            pool: TexturePool::new(opts),
            uniforms: HashMap::new(),
            bound_textures: HashMap::new(),
            bound_targets: HashMap::new(),
            attached: None,
            shader: None,
            viewport: (0, 0, 0, 0),
            scissor: (0, 0, 0, 0),
            scissor_enabled: false,
            stipple: [0xff; 128],
            stipple_enabled: false,
        }
    }

    fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }

    fn uniform_bool(&self, name: &str) -> bool {
        self.uniform(name).map(|v| v.as_bool()).unwrap_or(false)
    }

    fn uniform_f64(&self, name: &str, default: f64) -> f64 {
        self.uniform(name).map(|v| v.as_f64()).unwrap_or(default)
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for SoftwareDevice {
    fn capabilities(&self) -> GpuCapabilities {
        GpuCapabilities { blend_modes: true }
    }

    fn upload(&mut self, desc: TextureDesc, bytes: &[u8]) -> PlayoutResult<Texture> {
        self.pool.create(desc, bytes)
    }

    fn download(&mut self, target: &RenderTarget) -> PlayoutResult<Vec<u8>> {
        Ok(target.with_data(|d| d.to_vec()))
    }

    fn create_target(&mut self, width: u32, height: u32) -> PlayoutResult<RenderTarget> {
        if width == 0 || height == 0 {
            return Err(PlayoutError::gpu("render target must be non-empty"));
        }
        Ok(RenderTarget::new(width, height))
    }

    fn clear_target(&mut self, target: &RenderTarget) {
        target.clear();
    }

    fn use_shader(&mut self, shader: ShaderKind) -> PlayoutResult<()> {
        self.shader = Some(shader);
        Ok(())
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        self.uniforms.insert(name.to_owned(), value);
    }

    fn bind(&mut self, texture: &Texture, unit: usize) {
        self.bound_textures.insert(unit, texture.clone());
    }

    fn bind_target(&mut self, target: &RenderTarget, unit: usize) {
        self.bound_targets.insert(unit, target.clone());
    }

    fn unbind_all(&mut self) {
        self.bound_textures.clear();
        self.bound_targets.clear();
    }

    fn attach(&mut self, target: &RenderTarget) {
        self.attached = Some(target.clone());
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.viewport = (x, y, width, height);
    }

    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.scissor = (x, y, width, height);
    }

    fn enable(&mut self, toggle: Toggle) {
        match toggle {
            Toggle::ScissorTest => self.scissor_enabled = true,
            Toggle::PolygonStipple => self.stipple_enabled = true,
        }
    }

    fn disable(&mut self, toggle: Toggle) {
        match toggle {
            Toggle::ScissorTest => self.scissor_enabled = false,
            Toggle::PolygonStipple => self.stipple_enabled = false,
        }
    }

    fn stipple_pattern(&mut self, pattern: &[u8; 128]) {
        self.stipple = *pattern;
    }

    fn blend_func_separate(
        &mut self,
        _src: BlendFactor,
        _dst: BlendFactor,
        _src_alpha: BlendFactor,
        _dst_alpha: BlendFactor,
    ) {
        // Programmable blending is advertised, so the kernel never takes the
        // fixed-function path against this device.
    }

    fn draw_quad(&mut self, quad: &Quad) -> PlayoutResult<()> {
        if self.shader.is_none() {
            return Err(PlayoutError::gpu("draw without an active shader"));
        }
        let target = self
            .attached
            .clone()
            .ok_or_else(|| PlayoutError::gpu("draw without an attached target"))?;

        let format = match self.uniform("pixel_format").map(|v| v.as_i32()) {
            Some(0) => PixelFormat::Bgra,
            Some(1) => PixelFormat::Rgba,
            Some(2) => PixelFormat::Ycbcr420,
            Some(3) => PixelFormat::Ycbcr422,
            Some(4) => PixelFormat::Ycbcr444,
            Some(5) => PixelFormat::Ycbcra,
            other => {
                return Err(PlayoutError::gpu(format!(
                    "unknown pixel_format uniform {other:?}"
                )));
            }
        };

        let plane_count = format.plane_count();
        let mut planes = Vec::with_capacity(plane_count);
        for unit in 0..plane_count {
            planes.push(
                self.bound_textures
                    .get(&(texture_unit::PLANE0 + unit))
                    .cloned()
                    .ok_or_else(|| {
                        PlayoutError::gpu(format!("plane {unit} is not bound"))
                    })?,
            );
        }

        let opacity = self.uniform_f64("opacity", 1.0);
        let is_hd = self.uniform_bool("is_hd");
        let blend_mode = match self.uniform("blend_mode").map(|v| v.as_i32()) {
            Some(1) => BlendMode::Replace,
            Some(2) => BlendMode::Add,
            Some(3) => BlendMode::Screen,
            Some(4) => BlendMode::Multiply,
            Some(5) => BlendMode::Overlay,
            _ => BlendMode::Normal,
        };
        let local_key = self
            .uniform_bool("has_local_key")
            .then(|| self.bound_targets.get(&texture_unit::LOCAL_KEY).cloned())
            .flatten();
        let layer_key = self
            .uniform_bool("has_layer_key")
            .then(|| self.bound_targets.get(&texture_unit::LAYER_KEY).cloned())
            .flatten();

        let levels = self.uniform_bool("levels").then(|| LevelsParams {
            min_input: self.uniform_f64("min_input", 0.0),
            max_input: self.uniform_f64("max_input", 1.0),
            min_output: self.uniform_f64("min_output", 0.0),
            max_output: self.uniform_f64("max_output", 1.0),
            gamma: self.uniform_f64("gamma", 1.0),
        });
        let csb = self.uniform_bool("csb").then(|| CsbParams {
            brightness: self.uniform_f64("brt", 1.0),
            saturation: self.uniform_f64("sat", 1.0),
            contrast: self.uniform_f64("con", 1.0),
        });

        // Map clip-space corners into viewport pixels. The kernel emits
        // axis-aligned quads: corner 0 -> 1 spans u, corner 0 -> 3 spans v.
        let (vx, vy, vw, vh) = self.viewport;
        let to_px = |p: [f64; 2]| {
            [
                (p[0] + 1.0) * 0.5 * f64::from(vw) + f64::from(vx),
                (p[1] + 1.0) * 0.5 * f64::from(vh) + f64::from(vy),
            ]
        };
        let c0 = to_px(quad.positions[0]);
        let c1 = to_px(quad.positions[1]);
        let c3 = to_px(quad.positions[3]);
        let du = c1[0] - c0[0];
        let dv = c3[1] - c0[1];
        if du.abs() < f64::EPSILON || dv.abs() < f64::EPSILON {
            return Ok(());
        }

        let tw = target.width() as i32;
        let th = target.height() as i32;
        let min_x = c0[0].min(c1[0]).floor().max(0.0) as i32;
        let max_x = c0[0].max(c1[0]).ceil().min(f64::from(tw)) as i32;
        let min_y = c0[1].min(c3[1]).floor().max(0.0) as i32;
        let max_y = c0[1].max(c3[1]).ceil().min(f64::from(th)) as i32;

        let scissor = self.scissor_enabled.then_some(self.scissor);
        let stipple = self.stipple_enabled.then_some(self.stipple);

        target.with_data_mut(|dst| {
            for y in min_y.max(0)..max_y {
                if let Some(pattern) = &stipple
                    && !stipple_row_lit(pattern, y)
                {
                    continue;
                }
                if let Some((_, sy, _, sh)) = scissor
                    && (y < sy || y >= sy + sh)
                {
                    continue;
                }
                for x in min_x.max(0)..max_x {
                    if let Some((sx, _, sw, _)) = scissor
                        && (x < sx || x >= sx + sw)
                    {
                        continue;
                    }

                    let cx = f64::from(x) + 0.5;
                    let cy = f64::from(y) + 0.5;
                    let u = (cx - c0[0]) / du;
                    let v = (cy - c0[1]) / dv;
                    if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
                        continue;
                    }

                    let mut rgba = sample_source(format, &planes, u, v, is_hd);

                    if let Some(levels) = &levels {
                        for c in rgba.iter_mut().take(3) {
                            *c = levels.apply(*c);
                        }
                    }
                    if let Some(csb) = &csb {
                        rgba = csb.apply(rgba);
                    }

                    let mut alpha = rgba[3] * opacity;
                    let placement_u = cx / f64::from(tw);
                    let placement_v = cy / f64::from(th);
                    if let Some(key) = &local_key {
                        alpha *= sample_target_alpha(key, placement_u, placement_v);
                    }
                    if let Some(key) = &layer_key {
                        alpha *= sample_target_alpha(key, placement_u, placement_v);
                    }
                    if alpha <= 0.0 && blend_mode != BlendMode::Replace {
                        continue;
                    }

                    let idx = (y as usize * tw as usize + x as usize) * 4;
                    let dst_px = [
                        f64::from(dst[idx + 2]) / 255.0,
                        f64::from(dst[idx + 1]) / 255.0,
                        f64::from(dst[idx]) / 255.0,
                        f64::from(dst[idx + 3]) / 255.0,
                    ];
                    let out = blend_premul(
                        [rgba[0], rgba[1], rgba[2], alpha],
                        dst_px,
                        blend_mode,
                    );
                    dst[idx] = to_u8(out[2]);
                    dst[idx + 1] = to_u8(out[1]);
                    dst[idx + 2] = to_u8(out[0]);
                    dst[idx + 3] = to_u8(out[3]);
                }
            }
        });
        Ok(())
    }

    fn texture_barrier(&mut self) {
        // Pixels are read back per write; nothing to flush.
    }

    fn yield_now(&mut self) {}
}

struct LevelsParams {
    min_input: f64,
    max_input: f64,
    min_output: f64,
    max_output: f64,
    gamma: f64,
}

impl LevelsParams {
    fn apply(&self, v: f64) -> f64 {
        let range = (self.max_input - self.min_input).max(1e-9);
        let normalized = ((v - self.min_input) / range).clamp(0.0, 1.0);
        let powed = normalized.powf(1.0 / self.gamma.max(1e-9));
        (self.min_output + powed * (self.max_output - self.min_output)).clamp(0.0, 1.0)
    }
}

struct CsbParams {
    brightness: f64,
    saturation: f64,
    contrast: f64,
}

impl CsbParams {
    fn apply(&self, rgba: [f64; 4]) -> [f64; 4] {
        let brt = [
            rgba[0] * self.brightness,
            rgba[1] * self.brightness,
            rgba[2] * self.brightness,
        ];
        let intensity = brt[0] * 0.3 + brt[1] * 0.59 + brt[2] * 0.11;
        let mut out = [0.0; 4];
        for c in 0..3 {
            let sat = intensity + (brt[c] - intensity) * self.saturation;
            let con = 0.5 + (sat - 0.5) * self.contrast;
            out[c] = con.clamp(0.0, 1.0);
        }
        out[3] = rgba[3];
        out
    }
}

fn stipple_row_lit(pattern: &[u8; 128], y: i32) -> bool {
    let row = (y.rem_euclid(32)) as usize;
    // Rows are uniform in the field masks; testing the first byte suffices,
    // but honor the actual bits so custom patterns behave.
    pattern[row * 4] != 0
}

fn to_u8(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Sample the source planes at `(u, v)` and return straight-alpha RGBA.
fn sample_source(
    format: PixelFormat,
    planes: &[Texture],
    u: f64,
    v: f64,
    is_hd: bool,
) -> [f64; 4] {
    match format {
        PixelFormat::Bgra => {
            let s = sample_plane(&planes[0], u, v);
            [s[2], s[1], s[0], s[3]]
        }
        PixelFormat::Rgba => sample_plane(&planes[0], u, v),
        PixelFormat::Ycbcr420 | PixelFormat::Ycbcr422 | PixelFormat::Ycbcr444
        | PixelFormat::Ycbcra => {
            let y = sample_plane(&planes[0], u, v)[0];
            let cb = sample_plane(&planes[1], u, v)[0];
            let cr = sample_plane(&planes[2], u, v)[0];
            let alpha = if format == PixelFormat::Ycbcra {
                sample_plane(&planes[3], u, v)[0]
            } else {
                1.0
            };
            let (r, g, b) = ycbcr_to_rgb(y, cb, cr, is_hd);
            [r, g, b, alpha]
        }
    }
}

/// Bilinear, clamp-to-edge sample of up to four channels.
fn sample_plane(texture: &Texture, u: f64, v: f64) -> [f64; 4] {
    let desc = texture.desc();
    let w = desc.width as i64;
    let h = desc.height as i64;
    let channels = desc.channels as usize;

    let fx = (u * desc.width as f64 - 0.5).clamp(0.0, (w - 1) as f64);
    let fy = (v * desc.height as f64 - 0.5).clamp(0.0, (h - 1) as f64);
    let x0 = fx.floor() as i64;
    let y0 = fy.floor() as i64;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let tx = fx - x0 as f64;
    let ty = fy - y0 as f64;

    texture.with_data(|data| {
        let fetch = |x: i64, y: i64, c: usize| -> f64 {
            let idx = y as usize * desc.stride as usize + x as usize * channels + c;
            f64::from(data[idx]) / 255.0
        };
        let mut out = [0.0, 0.0, 0.0, 1.0];
        for (c, slot) in out.iter_mut().enumerate().take(channels) {
            let top = fetch(x0, y0, c) * (1.0 - tx) + fetch(x1, y0, c) * tx;
            let bottom = fetch(x0, y1, c) * (1.0 - tx) + fetch(x1, y1, c) * tx;
            *slot = top * (1.0 - ty) + bottom * ty;
        }
        out
    })
}

fn sample_target_alpha(target: &RenderTarget, u: f64, v: f64) -> f64 {
    let w = target.width() as i64;
    let h = target.height() as i64;
    let x = ((u * w as f64) as i64).clamp(0, w - 1);
    let y = ((v * h as f64) as i64).clamp(0, h - 1);
    target.with_data(|data| {
        let idx = (y as usize * w as usize + x as usize) * 4;
        f64::from(data[idx + 3]) / 255.0
    })
}

/// Studio-swing YCbCr to RGB; BT.709 for HD sources, BT.601 otherwise.
fn ycbcr_to_rgb(y: f64, cb: f64, cr: f64, hd: bool) -> (f64, f64, f64) {
    let yn = (y * 255.0 - 16.0) / 219.0;
    let pb = (cb * 255.0 - 128.0) / 224.0;
    let pr = (cr * 255.0 - 128.0) / 224.0;
    let (r, g, b) = if hd {
        (
            yn + 1.5748 * pr,
            yn - 0.1873 * pb - 0.4681 * pr,
            yn + 1.8556 * pb,
        )
    } else {
        (
            yn + 1.402 * pr,
            yn - 0.344136 * pb - 0.714136 * pr,
            yn + 1.772 * pb,
        )
    };
    (r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0))
}

/// Porter-Duff source-over with a separable blend function, operating on a
/// straight-alpha source and a premultiplied destination.
fn blend_premul(src: [f64; 4], dst: [f64; 4], mode: BlendMode) -> [f64; 4] {
    let sa = src[3].clamp(0.0, 1.0);
    let da = dst[3].clamp(0.0, 1.0);

    if mode == BlendMode::Replace {
        return [src[0] * sa, src[1] * sa, src[2] * sa, sa];
    }

    let blend = |s: f64, d: f64| -> f64 {
        match mode {
            BlendMode::Normal | BlendMode::Replace => s,
            BlendMode::Add => (s + d).min(1.0),
            BlendMode::Screen => s + d - s * d,
            BlendMode::Multiply => s * d,
            BlendMode::Overlay => {
                if d <= 0.5 {
                    2.0 * s * d
                } else {
                    1.0 - 2.0 * (1.0 - s) * (1.0 - d)
                }
            }
        }
    };

    let mut out = [0.0; 4];
    out[3] = sa + da * (1.0 - sa);
    for c in 0..3 {
        let sc = src[c].clamp(0.0, 1.0);
        // Unpremultiply the destination for the blend function.
        let dc = if da > 0.0 { (dst[c] / da).clamp(0.0, 1.0) } else { 0.0 };
        out[c] = sc * sa * (1.0 - da) + dst[c] * (1.0 - sa) + blend(sc, dc) * sa * da;
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/mixer/software.rs"]
mod tests;
