use super::*;

#[test]
fn identity_is_neutral_under_combine() {
    let mut t = FrameTransform::default();
    t.opacity = 0.5;
    t.fill_translation = [0.1, 0.2];
    t.fill_scale = [0.5, 0.5];
    t.blend_mode = BlendMode::Screen;

    let id = FrameTransform::default();
    assert_eq!(FrameTransform::combine(&id, &t), t);
    assert_eq!(FrameTransform::combine(&t, &id), t);
}

#[test]
fn combine_is_associative() {
    let mut a = FrameTransform::default();
    a.opacity = 0.8;
    a.fill_translation = [0.25, 0.0];
    a.fill_scale = [0.5, 1.0];

    let mut b = FrameTransform::default();
    b.opacity = 0.5;
    b.fill_translation = [0.5, 0.5];
    b.fill_scale = [0.5, 0.5];

    let mut c = FrameTransform::default();
    c.brightness = 2.0;
    c.fill_translation = [0.0, 0.1];

    let left = FrameTransform::combine(&FrameTransform::combine(&a, &b), &c);
    let right = FrameTransform::combine(&a, &FrameTransform::combine(&b, &c));

    assert!((left.opacity - right.opacity).abs() < 1e-12);
    for i in 0..2 {
        assert!((left.fill_translation[i] - right.fill_translation[i]).abs() < 1e-12);
        assert!((left.fill_scale[i] - right.fill_scale[i]).abs() < 1e-12);
    }
}

#[test]
fn fill_rect_nests_inside_parent() {
    let mut parent = FrameTransform::default();
    parent.fill_translation = [0.5, 0.0];
    parent.fill_scale = [0.5, 0.5];

    let mut child = FrameTransform::default();
    child.fill_translation = [0.5, 0.5];
    child.fill_scale = [0.5, 0.5];

    let out = FrameTransform::combine(&parent, &child);
    assert_eq!(out.fill_translation, [0.75, 0.25]);
    assert_eq!(out.fill_scale, [0.25, 0.25]);
}

#[test]
fn is_key_is_sticky_and_child_blend_wins() {
    let mut parent = FrameTransform::default();
    parent.is_key = true;
    parent.blend_mode = BlendMode::Multiply;

    let mut child = FrameTransform::default();
    child.blend_mode = BlendMode::Screen;

    let out = FrameTransform::combine(&parent, &child);
    assert!(out.is_key);
    assert_eq!(out.blend_mode, BlendMode::Screen);

    let normal_child = FrameTransform::default();
    let out = FrameTransform::combine(&parent, &normal_child);
    assert_eq!(out.blend_mode, BlendMode::Multiply);
}

#[test]
fn lerp_endpoints_and_midpoint() {
    let a = FrameTransform::default();
    let mut b = FrameTransform::default();
    b.opacity = 0.0;
    b.fill_translation = [1.0, 0.0];

    let start = FrameTransform::lerp(&a, &b, 0.0);
    assert_eq!(start.opacity, 1.0);
    let mid = FrameTransform::lerp(&a, &b, 0.5);
    assert!((mid.opacity - 0.5).abs() < 1e-12);
    assert!((mid.fill_translation[0] - 0.5).abs() < 1e-12);
    let end = FrameTransform::lerp(&a, &b, 1.0);
    assert_eq!(end.opacity, 0.0);
}

#[test]
fn levels_deviation_threshold() {
    let mut l = Levels::default();
    assert!(!l.deviates(1e-3));
    l.gamma = 1.2;
    assert!(l.deviates(1e-3));
}

#[test]
fn clip_detection() {
    let mut t = FrameTransform::default();
    assert!(!t.has_clip(1e-6));
    t.clip_translation = [0.25, 0.25];
    t.clip_scale = [0.5, 0.5];
    assert!(t.has_clip(1e-6));
}
