use super::*;
use crate::frame::pixel::PixelDesc;
use crate::frame::transform::FrameTransform;
use crate::mixer::device::{GpuCapabilities, Texture, TextureDesc, TexturePool};
use smallvec::smallvec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Recording {
    calls: Vec<String>,
    uniforms: HashMap<String, UniformValue>,
}

struct RecordingDevice {
    caps: GpuCapabilities,
    pool: TexturePool,
    log: Arc<Mutex<Recording>>,
}

impl RecordingDevice {
    fn new(blend_modes: bool) -> (Self, Arc<Mutex<Recording>>) {
        let log = Arc::new(Mutex::new(Recording::default()));
        (
            Self {
                caps: GpuCapabilities { blend_modes },
                pool: TexturePool::default(),
                log: log.clone(),
            },
            log,
        )
    }

    fn push(&self, call: impl Into<String>) {
        self.log.lock().unwrap().calls.push(call.into());
    }
}

impl GpuDevice for RecordingDevice {
    fn capabilities(&self) -> GpuCapabilities {
        self.caps
    }

    fn upload(&mut self, desc: TextureDesc, bytes: &[u8]) -> crate::foundation::error::PlayoutResult<Texture> {
        self.pool.create(desc, bytes)
    }

    fn download(&mut self, _target: &RenderTarget) -> crate::foundation::error::PlayoutResult<Vec<u8>> {
        Ok(Vec::new())
    }

    fn create_target(&mut self, width: u32, height: u32) -> crate::foundation::error::PlayoutResult<RenderTarget> {
        Ok(RenderTarget::new(width, height))
    }

    fn clear_target(&mut self, target: &RenderTarget) {
        target.clear();
    }

    fn use_shader(&mut self, _shader: ShaderKind) -> crate::foundation::error::PlayoutResult<()> {
        self.push("use_shader");
        Ok(())
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        self.log
            .lock()
            .unwrap()
            .uniforms
            .insert(name.to_owned(), value);
    }

    fn bind(&mut self, _texture: &Texture, unit: usize) {
        self.push(format!("bind:{unit}"));
    }

    fn bind_target(&mut self, _target: &RenderTarget, unit: usize) {
        self.push(format!("bind_target:{unit}"));
    }

    fn unbind_all(&mut self) {
        self.push("unbind_all");
    }

    fn attach(&mut self, _target: &RenderTarget) {
        self.push("attach");
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.push(format!("viewport:{x},{y},{width},{height}"));
    }

    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.push(format!("scissor:{x},{y},{width},{height}"));
    }

    fn enable(&mut self, toggle: Toggle) {
        self.push(format!("enable:{toggle:?}"));
    }

    fn disable(&mut self, toggle: Toggle) {
        self.push(format!("disable:{toggle:?}"));
    }

    fn stipple_pattern(&mut self, pattern: &[u8; 128]) {
        let which = if pattern == &UPPER_PATTERN {
            "upper"
        } else if pattern == &LOWER_PATTERN {
            "lower"
        } else {
            "custom"
        };
        self.push(format!("stipple:{which}"));
    }

    fn blend_func_separate(
        &mut self,
        src: BlendFactor,
        dst: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        self.push(format!("blend_func:{src:?},{dst:?},{src_alpha:?},{dst_alpha:?}"));
    }

    fn draw_quad(&mut self, _quad: &Quad) -> crate::foundation::error::PlayoutResult<()> {
        self.push("draw_quad");
        Ok(())
    }

    fn texture_barrier(&mut self) {
        self.push("texture_barrier");
    }

    fn yield_now(&mut self) {
        self.push("yield");
    }
}

fn item_with(device: &mut RecordingDevice, transform: FrameTransform) -> RenderItem {
    let desc = TextureDesc {
        width: 2,
        height: 2,
        stride: 8,
        channels: 4,
    };
    let tex = device.upload(desc, &vec![128u8; desc.byte_len()]).unwrap();
    RenderItem {
        desc: PixelDesc::bgra(2, 2),
        textures: smallvec![tex],
        transform,
    }
}

#[test]
fn zero_opacity_skips_everything() {
    let (mut device, log) = RecordingDevice::new(true);
    let mut t = FrameTransform::default();
    t.opacity = 0.0;
    let item = item_with(&mut device, t);
    let background = RenderTarget::new(16, 16);

    draw_item(&mut device, item, &background, None, None).unwrap();
    assert!(log.lock().unwrap().calls.is_empty(), "no draw call may be issued");
}

#[test]
fn plane_texture_mismatch_is_a_draw_error() {
    let (mut device, _) = RecordingDevice::new(true);
    let mut item = item_with(&mut device, FrameTransform::default());
    item.textures.clear();
    item.textures = smallvec![];
    let mut desc = item.desc.clone();
    desc.planes.push(desc.planes[0]);
    item.desc = desc;
    let background = RenderTarget::new(16, 16);
    assert!(draw_item(&mut device, item, &background, None, None).is_err());
}

#[test]
fn progressive_identity_draw_has_no_scissor_or_stipple() {
    let (mut device, log) = RecordingDevice::new(true);
    let item = item_with(&mut device, FrameTransform::default());
    let background = RenderTarget::new(16, 16);

    draw_item(&mut device, item, &background, None, None).unwrap();
    let calls = log.lock().unwrap().calls.clone();
    assert!(calls.contains(&"draw_quad".to_owned()));
    assert!(calls.contains(&"disable:PolygonStipple".to_owned()));
    assert!(!calls.iter().any(|c| c.starts_with("scissor:")));
    assert!(!calls.iter().any(|c| c.starts_with("enable:ScissorTest")));
}

#[test]
fn key_items_force_normal_blend_at_full_opacity() {
    let (mut device, log) = RecordingDevice::new(true);
    let mut t = FrameTransform::default();
    t.is_key = true;
    t.opacity = 0.3;
    t.blend_mode = crate::frame::transform::BlendMode::Multiply;
    let item = item_with(&mut device, t);
    let background = RenderTarget::new(16, 16);

    draw_item(&mut device, item, &background, None, None).unwrap();
    let log = log.lock().unwrap();
    assert_eq!(log.uniforms["opacity"].as_f64(), 1.0);
    assert_eq!(log.uniforms["blend_mode"].as_i32(), 0, "forced to normal");
}

#[test]
fn scissor_rect_scales_clip_to_target_pixels() {
    // clip (0.25, 0.25) x (0.5, 0.5) on 1920x1080 -> (480, 270, 960, 540).
    let (mut device, log) = RecordingDevice::new(true);
    let mut t = FrameTransform::default();
    t.clip_translation = [0.25, 0.25];
    t.clip_scale = [0.5, 0.5];
    let item = item_with(&mut device, t);
    let background = RenderTarget::new(1920, 1080);

    draw_item(&mut device, item, &background, None, None).unwrap();
    let calls = log.lock().unwrap().calls.clone();
    assert!(calls.contains(&"enable:ScissorTest".to_owned()));
    assert!(calls.contains(&"scissor:480,270,960,540".to_owned()));
    // Scissor is always disabled again afterwards.
    assert!(calls.contains(&"disable:ScissorTest".to_owned()));
}

#[test]
fn field_modes_select_the_matching_stipple_pattern() {
    for (mode, expected) in [
        (crate::format::FieldMode::Upper, "stipple:upper"),
        (crate::format::FieldMode::Lower, "stipple:lower"),
    ] {
        let (mut device, log) = RecordingDevice::new(true);
        let mut t = FrameTransform::default();
        t.field_mode = mode;
        let item = item_with(&mut device, t);
        let background = RenderTarget::new(16, 16);

        draw_item(&mut device, item, &background, None, None).unwrap();
        let calls = log.lock().unwrap().calls.clone();
        assert!(calls.contains(&"enable:PolygonStipple".to_owned()));
        assert!(calls.contains(&expected.to_owned()));
    }
}

#[test]
fn programmable_blending_binds_background_and_barriers() {
    let (mut device, log) = RecordingDevice::new(true);
    let item = item_with(&mut device, FrameTransform::default());
    let background = RenderTarget::new(16, 16);

    draw_item(&mut device, item, &background, None, None).unwrap();
    let calls = log.lock().unwrap().calls.clone();
    assert!(calls.contains(&format!("bind_target:{}", texture_unit::BACKGROUND)));
    assert!(calls.contains(&"texture_barrier".to_owned()));
    assert!(!calls.iter().any(|c| c.starts_with("blend_func:")));
}

#[test]
fn fixed_function_fallback_maps_blend_modes() {
    let (mut device, log) = RecordingDevice::new(false);
    let mut t = FrameTransform::default();
    t.blend_mode = crate::frame::transform::BlendMode::Replace;
    let item = item_with(&mut device, t);
    let background = RenderTarget::new(16, 16);
    draw_item(&mut device, item, &background, None, None).unwrap();
    {
        let calls = log.lock().unwrap().calls.clone();
        assert!(calls.contains(&"blend_func:One,Zero,One,One".to_owned()));
        assert!(!calls.contains(&"texture_barrier".to_owned()));
    }

    let (mut device, log) = RecordingDevice::new(false);
    let item = item_with(&mut device, FrameTransform::default());
    draw_item(&mut device, item, &background, None, None).unwrap();
    let calls = log.lock().unwrap().calls.clone();
    assert!(calls.contains(
        &"blend_func:One,OneMinusSrcAlpha,One,OneMinusSrcAlpha".to_owned()
    ));
}

#[test]
fn key_masks_bind_to_reserved_units() {
    let (mut device, log) = RecordingDevice::new(true);
    let item = item_with(&mut device, FrameTransform::default());
    let background = RenderTarget::new(16, 16);
    let local = RenderTarget::new(16, 16);
    let layer = RenderTarget::new(16, 16);

    draw_item(&mut device, item, &background, Some(&local), Some(&layer)).unwrap();
    let log = log.lock().unwrap();
    assert!(log.calls.contains(&format!("bind_target:{}", texture_unit::LOCAL_KEY)));
    assert!(log.calls.contains(&format!("bind_target:{}", texture_unit::LAYER_KEY)));
    assert!(log.uniforms["has_local_key"].as_bool());
    assert!(log.uniforms["has_layer_key"].as_bool());
}

#[test]
fn hd_flag_follows_plane_height() {
    let (mut device, log) = RecordingDevice::new(true);
    let desc = TextureDesc {
        width: 4,
        height: 1080,
        stride: 16,
        channels: 4,
    };
    let tex = device
        .upload(desc, &vec![0u8; desc.byte_len()])
        .unwrap();
    let item = RenderItem {
        desc: PixelDesc::bgra(4, 1080),
        textures: smallvec![tex],
        transform: FrameTransform::default(),
    };
    let background = RenderTarget::new(16, 16);
    draw_item(&mut device, item, &background, None, None).unwrap();
    assert!(log.lock().unwrap().uniforms["is_hd"].as_bool());
}

#[test]
fn patterns_are_exact_complements_with_row_granularity() {
    for row in 0..32 {
        for byte in 0..4 {
            let upper = UPPER_PATTERN[row * 4 + byte];
            let lower = LOWER_PATTERN[row * 4 + byte];
            assert_eq!(upper ^ lower, 0xff, "row {row} must be complementary");
            let expected = if row % 2 == 0 { 0xff } else { 0x00 };
            assert_eq!(upper, expected);
        }
    }
}
