use super::*;
use crate::frame::draw_frame::RenderItem;
use crate::frame::pixel::PixelDesc;
use crate::frame::transform::FrameTransform;
use crate::mixer::kernel::draw_item;
use smallvec::smallvec;

fn solid_bgra_item(device: &mut SoftwareDevice, bgra: [u8; 4], transform: FrameTransform) -> RenderItem {
    let desc = TextureDesc {
        width: 2,
        height: 2,
        stride: 8,
        channels: 4,
    };
    let mut bytes = Vec::new();
    for _ in 0..4 {
        bytes.extend_from_slice(&bgra);
    }
    let tex = device.upload(desc, &bytes).unwrap();
    RenderItem {
        desc: PixelDesc::bgra(2, 2),
        textures: smallvec![tex],
        transform,
    }
}

fn pixel(target: &RenderTarget, x: u32, y: u32) -> [u8; 4] {
    target.with_data(|d| {
        let idx = (y * target.width() + x) as usize * 4;
        [d[idx], d[idx + 1], d[idx + 2], d[idx + 3]]
    })
}

#[test]
fn opaque_draw_covers_the_full_target() {
    let mut device = SoftwareDevice::new();
    let background = device.create_target(8, 8).unwrap();
    let item = solid_bgra_item(&mut device, [0, 0, 255, 255], FrameTransform::default());

    draw_item(&mut device, item, &background, None, None).unwrap();
    for (x, y) in [(0, 0), (7, 0), (3, 4), (7, 7)] {
        assert_eq!(pixel(&background, x, y), [0, 0, 255, 255], "pixel {x},{y}");
    }
}

#[test]
fn fill_rect_places_the_quad() {
    let mut device = SoftwareDevice::new();
    let background = device.create_target(8, 8).unwrap();
    let mut t = FrameTransform::default();
    t.fill_translation = [0.5, 0.5];
    t.fill_scale = [0.5, 0.5];
    let item = solid_bgra_item(&mut device, [255, 255, 255, 255], t);

    draw_item(&mut device, item, &background, None, None).unwrap();
    assert_eq!(pixel(&background, 0, 0)[3], 0, "outside the quad stays empty");
    assert_eq!(pixel(&background, 3, 3)[3], 0);
    assert_eq!(pixel(&background, 4, 4), [255, 255, 255, 255]);
    assert_eq!(pixel(&background, 7, 7), [255, 255, 255, 255]);
}

#[test]
fn opacity_premultiplies_the_output() {
    let mut device = SoftwareDevice::new();
    let background = device.create_target(4, 4).unwrap();
    let mut t = FrameTransform::default();
    t.opacity = 0.5;
    let item = solid_bgra_item(&mut device, [0, 0, 255, 255], t);

    draw_item(&mut device, item, &background, None, None).unwrap();
    let px = pixel(&background, 1, 1);
    assert_eq!(px[3], 128);
    assert_eq!(px[2], 128, "premultiplied red at half opacity");
}

#[test]
fn upper_stipple_writes_even_rows_only() {
    let mut device = SoftwareDevice::new();
    let background = device.create_target(4, 8).unwrap();
    let mut t = FrameTransform::default();
    t.field_mode = crate::format::FieldMode::Upper;
    let item = solid_bgra_item(&mut device, [255, 255, 255, 255], t);

    draw_item(&mut device, item, &background, None, None).unwrap();
    for y in 0..8 {
        let expected = if y % 2 == 0 { 255 } else { 0 };
        assert_eq!(pixel(&background, 1, y)[3], expected, "row {y}");
    }
}

#[test]
fn both_fields_together_cover_every_row() {
    let mut device = SoftwareDevice::new();
    let background = device.create_target(4, 8).unwrap();

    let mut upper = FrameTransform::default();
    upper.field_mode = crate::format::FieldMode::Upper;
    let item = solid_bgra_item(&mut device, [0, 255, 0, 255], upper);
    draw_item(&mut device, item, &background, None, None).unwrap();

    let mut lower = FrameTransform::default();
    lower.field_mode = crate::format::FieldMode::Lower;
    let item = solid_bgra_item(&mut device, [0, 0, 255, 255], lower);
    draw_item(&mut device, item, &background, None, None).unwrap();

    for y in 0..8 {
        let px = pixel(&background, 2, y);
        assert_eq!(px[3], 255, "row {y} covered");
        if y % 2 == 0 {
            assert_eq!(px[1], 255, "even rows from the upper field");
        } else {
            assert_eq!(px[2], 255, "odd rows from the lower field");
        }
    }
}

#[test]
fn scissor_confines_the_draw() {
    let mut device = SoftwareDevice::new();
    let background = device.create_target(8, 8).unwrap();
    let mut t = FrameTransform::default();
    t.clip_translation = [0.25, 0.25];
    t.clip_scale = [0.5, 0.5];
    let item = solid_bgra_item(&mut device, [255, 255, 255, 255], t);

    draw_item(&mut device, item, &background, None, None).unwrap();
    assert_eq!(pixel(&background, 1, 1)[3], 0, "outside the scissor rect");
    assert_eq!(pixel(&background, 6, 6)[3], 0);
    assert_eq!(pixel(&background, 3, 3)[3], 255);
    assert_eq!(pixel(&background, 5, 5)[3], 255);
}

#[test]
fn multiply_blend_darkens_the_background() {
    let mut device = SoftwareDevice::new();
    let background = device.create_target(4, 4).unwrap();

    // Opaque mid gray background first.
    let item = solid_bgra_item(&mut device, [128, 128, 128, 255], FrameTransform::default());
    draw_item(&mut device, item, &background, None, None).unwrap();

    let mut t = FrameTransform::default();
    t.blend_mode = crate::frame::transform::BlendMode::Multiply;
    let item = solid_bgra_item(&mut device, [128, 128, 128, 255], t);
    draw_item(&mut device, item, &background, None, None).unwrap();

    let px = pixel(&background, 1, 1);
    // 0.5 * 0.5 = 0.25.
    assert!((i32::from(px[0]) - 64).abs() <= 2, "got {px:?}");
}

#[test]
fn add_blend_saturates() {
    let mut device = SoftwareDevice::new();
    let background = device.create_target(4, 4).unwrap();

    let item = solid_bgra_item(&mut device, [200, 0, 0, 255], FrameTransform::default());
    draw_item(&mut device, item, &background, None, None).unwrap();

    let mut t = FrameTransform::default();
    t.blend_mode = crate::frame::transform::BlendMode::Add;
    let item = solid_bgra_item(&mut device, [200, 0, 0, 255], t);
    draw_item(&mut device, item, &background, None, None).unwrap();

    assert_eq!(pixel(&background, 1, 1)[0], 255);
}

#[test]
fn replace_blend_overwrites_alpha() {
    let mut device = SoftwareDevice::new();
    let background = device.create_target(4, 4).unwrap();

    let item = solid_bgra_item(&mut device, [255, 255, 255, 255], FrameTransform::default());
    draw_item(&mut device, item, &background, None, None).unwrap();

    let mut t = FrameTransform::default();
    t.blend_mode = crate::frame::transform::BlendMode::Replace;
    let item = solid_bgra_item(&mut device, [0, 0, 0, 0], t);
    draw_item(&mut device, item, &background, None, None).unwrap();

    assert_eq!(pixel(&background, 1, 1), [0, 0, 0, 0]);
}

#[test]
fn ycbcr_black_and_white_roundtrip() {
    let mut device = SoftwareDevice::new();
    let background = device.create_target(2, 2).unwrap();

    // 2x2 4:4:4 planes: luma 16 (black) / 235 (white), neutral chroma 128.
    let desc = TextureDesc {
        width: 2,
        height: 2,
        stride: 2,
        channels: 1,
    };
    let luma = device.upload(desc, &[16, 235, 16, 235]).unwrap();
    let chroma = device.upload(desc, &[128, 128, 128, 128]).unwrap();
    let item = RenderItem {
        desc: PixelDesc::ycbcr(crate::frame::pixel::PixelFormat::Ycbcr444, 2, 2).unwrap(),
        textures: smallvec![luma, chroma.clone(), chroma],
        transform: FrameTransform::default(),
    };

    draw_item(&mut device, item, &background, None, None).unwrap();
    let black = pixel(&background, 0, 0);
    let white = pixel(&background, 1, 0);
    assert!(black[0] < 16 && black[1] < 16 && black[2] < 16, "{black:?}");
    assert!(white[0] > 240 && white[1] > 240 && white[2] > 240, "{white:?}");
}

#[test]
fn local_key_masks_the_fill() {
    let mut device = SoftwareDevice::new();
    let background = device.create_target(8, 8).unwrap();

    // Key covering the left half, rendered into a key target first.
    let key_target = device.create_target(8, 8).unwrap();
    let mut key_t = FrameTransform::default();
    key_t.is_key = true;
    key_t.fill_scale = [0.5, 1.0];
    let key_item = solid_bgra_item(&mut device, [255, 255, 255, 255], key_t);
    draw_item(&mut device, key_item, &key_target, None, None).unwrap();

    let fill_item = solid_bgra_item(&mut device, [0, 0, 255, 255], FrameTransform::default());
    draw_item(&mut device, fill_item, &background, Some(&key_target), None).unwrap();

    assert_eq!(pixel(&background, 1, 4)[3], 255, "keyed-in on the left");
    assert_eq!(pixel(&background, 6, 4)[3], 0, "keyed-out on the right");
}

#[test]
fn levels_remap_output_range() {
    let mut device = SoftwareDevice::new();
    let background = device.create_target(4, 4).unwrap();
    let mut t = FrameTransform::default();
    t.levels.min_output = 0.5;
    t.levels.max_output = 0.5;
    let item = solid_bgra_item(&mut device, [255, 255, 255, 255], t);

    draw_item(&mut device, item, &background, None, None).unwrap();
    let px = pixel(&background, 1, 1);
    assert!((i32::from(px[0]) - 128).abs() <= 1, "{px:?}");
}

#[test]
fn draw_without_attach_is_a_device_error() {
    let mut device = SoftwareDevice::new();
    device.use_shader(ShaderKind::Image).unwrap();
    device.set_uniform("pixel_format", UniformValue::Int(0));
    let quad = Quad {
        positions: [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]],
        tex0: [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
        tex1: [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
    };
    assert!(device.draw_quad(&quad).is_err());
}
