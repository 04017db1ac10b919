//! The per-item image kernel: programs the device and draws one textured
//! quad into the accumulation target.

use crate::foundation::error::{PlayoutError, PlayoutResult};
use crate::format::FieldMode;
use crate::frame::draw_frame::RenderItem;
use crate::frame::transform::BlendMode;
use crate::mixer::device::{
    BlendFactor, GpuDevice, Quad, RenderTarget, ShaderKind, Toggle, UniformValue, texture_unit,
};

const EPSILON: f64 = 1e-3;

/// Scanline mask selecting the even (upper-field) lines: each 4-byte row of
/// the 32x32 pattern is all-ones on even rows and all-zeroes on odd rows.
pub const UPPER_PATTERN: [u8; 128] = build_pattern(true);

/// Complement of [`UPPER_PATTERN`]: selects the odd (lower-field) lines.
pub const LOWER_PATTERN: [u8; 128] = build_pattern(false);

const fn build_pattern(upper: bool) -> [u8; 128] {
    let mut pattern = [0u8; 128];
    let mut row = 0;
    while row < 32 {
        let lit = (row % 2 == 0) == upper;
        let value = if lit { 0xff } else { 0x00 };
        let mut byte = 0;
        while byte < 4 {
            pattern[row * 4 + byte] = value;
            byte += 1;
        }
        row += 1;
    }
    pattern
}

/// Draw one flattened item into `background`.
///
/// `local_key`/`layer_key` are alpha masks rendered from preceding key items
/// (same layer / previous layer). The call order against the device follows
/// a fixed script; see the module tests for the recorded sequence.
pub fn draw_item(
    device: &mut dyn GpuDevice,
    item: RenderItem,
    background: &RenderTarget,
    local_key: Option<&RenderTarget>,
    layer_key: Option<&RenderTarget>,
) -> PlayoutResult<()> {
    if item.desc.planes.len() != item.textures.len() {
        return Err(PlayoutError::mixer_draw(format!(
            "plane/texture count mismatch: {} descriptors, {} textures",
            item.desc.planes.len(),
            item.textures.len()
        )));
    }

    if item.textures.is_empty() {
        return Ok(());
    }
    if item.transform.opacity < EPSILON {
        return Ok(());
    }

    if !item.textures.iter().all(|t| t.ready()) {
        tracing::warn!("host to device transfer not complete, GPU may stall");
        device.yield_now();
    }

    for (unit, texture) in item.textures.iter().enumerate() {
        device.bind(texture, texture_unit::PLANE0 + unit);
    }
    if let Some(key) = local_key {
        device.bind_target(key, texture_unit::LOCAL_KEY);
    }
    if let Some(key) = layer_key {
        device.bind_target(key, texture_unit::LAYER_KEY);
    }

    device.use_shader(ShaderKind::Image)?;

    for unit in 0..4 {
        device.set_uniform(
            &format!("plane[{unit}]"),
            UniformValue::Int((texture_unit::PLANE0 + unit) as i32),
        );
    }
    device.set_uniform("local_key", UniformValue::Int(texture_unit::LOCAL_KEY as i32));
    device.set_uniform("layer_key", UniformValue::Int(texture_unit::LAYER_KEY as i32));
    device.set_uniform("has_local_key", UniformValue::Bool(local_key.is_some()));
    device.set_uniform("has_layer_key", UniformValue::Bool(layer_key.is_some()));
    device.set_uniform(
        "is_hd",
        UniformValue::Bool(item.desc.planes[0].height > 700),
    );
    device.set_uniform("pixel_format", UniformValue::Int(item.desc.format.code()));
    device.set_uniform(
        "opacity",
        UniformValue::Float(if item.transform.is_key {
            1.0
        } else {
            item.transform.opacity
        }),
    );

    let blend_mode = if item.transform.is_key {
        BlendMode::Normal
    } else {
        item.transform.blend_mode
    };

    if device.capabilities().blend_modes {
        device.bind_target(background, texture_unit::BACKGROUND);
        device.set_uniform("background", UniformValue::Int(texture_unit::BACKGROUND as i32));
        device.set_uniform("blend_mode", UniformValue::Int(blend_mode.code()));
    } else {
        match blend_mode {
            BlendMode::Replace => device.blend_func_separate(
                BlendFactor::One,
                BlendFactor::Zero,
                BlendFactor::One,
                BlendFactor::One,
            ),
            _ => device.blend_func_separate(
                BlendFactor::One,
                BlendFactor::OneMinusSrcAlpha,
                BlendFactor::One,
                BlendFactor::OneMinusSrcAlpha,
            ),
        }
    }

    if item.transform.levels.deviates(EPSILON) {
        device.set_uniform("levels", UniformValue::Bool(true));
        device.set_uniform("min_input", UniformValue::Float(item.transform.levels.min_input));
        device.set_uniform("max_input", UniformValue::Float(item.transform.levels.max_input));
        device.set_uniform(
            "min_output",
            UniformValue::Float(item.transform.levels.min_output),
        );
        device.set_uniform(
            "max_output",
            UniformValue::Float(item.transform.levels.max_output),
        );
        device.set_uniform("gamma", UniformValue::Float(item.transform.levels.gamma));
    } else {
        device.set_uniform("levels", UniformValue::Bool(false));
    }

    let csb = (item.transform.brightness - 1.0).abs() > EPSILON
        || (item.transform.saturation - 1.0).abs() > EPSILON
        || (item.transform.contrast - 1.0).abs() > EPSILON;
    if csb {
        device.set_uniform("csb", UniformValue::Bool(true));
        device.set_uniform("brt", UniformValue::Float(item.transform.brightness));
        device.set_uniform("sat", UniformValue::Float(item.transform.saturation));
        device.set_uniform("con", UniformValue::Float(item.transform.contrast));
    } else {
        device.set_uniform("csb", UniformValue::Bool(false));
    }

    match item.transform.field_mode {
        FieldMode::Progressive => device.disable(Toggle::PolygonStipple),
        FieldMode::Upper => {
            device.enable(Toggle::PolygonStipple);
            device.stipple_pattern(&UPPER_PATTERN);
        }
        FieldMode::Lower => {
            device.enable(Toggle::PolygonStipple);
            device.stipple_pattern(&LOWER_PATTERN);
        }
    }

    let width = f64::from(background.width());
    let height = f64::from(background.height());
    device.viewport(0, 0, width as i32, height as i32);

    if item.transform.has_clip(EPSILON) {
        let cp = item.transform.clip_translation;
        let cs = item.transform.clip_scale;
        device.enable(Toggle::ScissorTest);
        device.scissor(
            (cp[0] * width).round() as i32,
            (cp[1] * height).round() as i32,
            (cs[0] * width).round() as i32,
            (cs[1] * height).round() as i32,
        );
    }

    device.attach(background);

    let fp = item.transform.fill_translation;
    let fs = item.transform.fill_scale;
    let corners = [
        [fp[0], fp[1]],
        [fp[0] + fs[0], fp[1]],
        [fp[0] + fs[0], fp[1] + fs[1]],
        [fp[0], fp[1] + fs[1]],
    ];
    let quad = Quad {
        positions: corners.map(|p| [p[0] * 2.0 - 1.0, p[1] * 2.0 - 1.0]),
        tex0: [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
        tex1: corners,
    };
    let drawn = device.draw_quad(&quad);

    device.disable(Toggle::ScissorTest);
    drop(item.textures);
    device.unbind_all();
    device.yield_now();

    if device.capabilities().blend_modes {
        // The background is sampled and written within the same target.
        device.texture_barrier();
    }

    drawn
}

#[cfg(test)]
#[path = "../../tests/unit/mixer/kernel.rs"]
mod tests;
