use super::*;

#[test]
fn parse_accepts_ease_prefix_and_mixed_case() {
    assert_eq!(Tweener::parse("linear"), Some(Tweener::Linear));
    assert_eq!(Tweener::parse("easeInQuad"), Some(Tweener::InQuad));
    assert_eq!(Tweener::parse("OUTCUBIC"), Some(Tweener::OutCubic));
    assert_eq!(Tweener::parse("easeOutBounce"), Some(Tweener::OutBounce));
    assert_eq!(Tweener::parse("wobble"), None);
}

#[test]
fn easings_hit_endpoints() {
    for tw in [
        Tweener::Linear,
        Tweener::InQuad,
        Tweener::OutQuad,
        Tweener::InOutQuad,
        Tweener::InCubic,
        Tweener::OutCubic,
        Tweener::InOutCubic,
        Tweener::InQuart,
        Tweener::OutQuart,
        Tweener::OutBounce,
    ] {
        assert!((tw.apply(0.0)).abs() < 1e-12, "{tw:?} at 0");
        assert!((tw.apply(1.0) - 1.0).abs() < 1e-12, "{tw:?} at 1");
    }
}

#[test]
fn apply_clamps_out_of_range_progress() {
    assert_eq!(Tweener::Linear.apply(-1.0), 0.0);
    assert_eq!(Tweener::Linear.apply(2.0), 1.0);
}

#[test]
fn zero_duration_returns_dest_immediately() {
    let mut tw = TweenedTransform::new(0.0f64, 10.0, 0, Tweener::Linear);
    assert_eq!(tw.fetch(), 10.0);
    assert_eq!(tw.fetch_and_tick(1), 10.0);
}

#[test]
fn linear_steps_and_saturation() {
    let mut tw = TweenedTransform::new(0.0f64, 10.0, 10, Tweener::Linear);
    assert_eq!(tw.fetch(), 0.0);
    assert_eq!(tw.fetch_and_tick(1), 1.0);
    assert_eq!(tw.fetch_and_tick(4), 5.0);
    assert!(!tw.done());
    assert_eq!(tw.fetch_and_tick(100), 10.0);
    assert!(tw.done());
    assert_eq!(tw.fetch_and_tick(1), 10.0);
}

#[test]
fn dest_is_returned_iff_time_reaches_duration() {
    let mut tw = TweenedTransform::new(0.0f64, 1.0, 3, Tweener::Linear);
    tw.fetch_and_tick(2);
    assert!(!tw.done());
    assert!(tw.fetch() < 1.0);
    tw.fetch_and_tick(1);
    assert!(tw.done());
    assert_eq!(tw.fetch(), 1.0);
}

#[test]
fn frame_transform_tween_interpolates_opacity() {
    use crate::frame::transform::FrameTransform;
    let a = FrameTransform::default();
    let mut b = FrameTransform::default();
    b.opacity = 0.0;

    let mut tw = TweenedTransform::new(a, b, 50, Tweener::Linear);
    let mid = tw.fetch_and_tick(25);
    assert!((mid.opacity - 0.5).abs() <= 1.0 / 50.0);
}
