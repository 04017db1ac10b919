use super::*;
use crate::frame::transform::BlendMode;
use crate::mixer::device::{TextureDesc, TexturePool};
use smallvec::smallvec;

fn test_leaf(pool: &TexturePool) -> DrawFrame {
    let desc = TextureDesc {
        width: 2,
        height: 2,
        stride: 8,
        channels: 4,
    };
    let tex = pool.create(desc, &vec![0u8; desc.byte_len()]).unwrap();
    DrawFrame::leaf(Arc::new(ConstFrame {
        desc: PixelDesc::bgra(2, 2),
        textures: smallvec![tex],
    }))
}

#[test]
fn sentinels_flatten_to_nothing() {
    assert!(DrawFrame::empty().flatten().is_empty());
    assert!(DrawFrame::eof().flatten().is_empty());
}

#[test]
fn leaf_flattens_to_one_item() {
    let pool = TexturePool::default();
    let items = test_leaf(&pool).flatten();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].transform, FrameTransform::default());
}

#[test]
fn flatten_composes_transforms_depth_first() {
    let pool = TexturePool::default();

    let mut inner = test_leaf(&pool);
    inner.transform.opacity = 0.5;

    let mut wrapped = DrawFrame::composite(vec![inner]);
    wrapped.transform.opacity = 0.5;
    wrapped.transform.fill_scale = [0.5, 0.5];

    let items = wrapped.flatten();
    assert_eq!(items.len(), 1);
    assert!((items[0].transform.opacity - 0.25).abs() < 1e-12);
    assert_eq!(items[0].transform.fill_scale, [0.5, 0.5]);
}

#[test]
fn flatten_matches_manual_composition() {
    // Flattening a composite must equal issuing each child under the
    // composed transform by hand.
    let pool = TexturePool::default();

    let mut a = test_leaf(&pool);
    a.transform.opacity = 0.8;
    let mut b = test_leaf(&pool);
    b.transform.blend_mode = BlendMode::Screen;

    let mut parent = DrawFrame::composite(vec![a.clone(), b.clone()]);
    parent.transform.opacity = 0.5;

    let flat = parent.flatten();
    let manual: Vec<_> = [a, b]
        .iter()
        .map(|c| FrameTransform::combine(&parent.transform, &c.transform))
        .collect();

    assert_eq!(flat.len(), manual.len());
    for (item, expected) in flat.iter().zip(&manual) {
        assert_eq!(&item.transform, expected);
    }
}

#[test]
fn interlace_assigns_complementary_field_modes() {
    let pool = TexturePool::default();
    let frame = DrawFrame::interlace(test_leaf(&pool), test_leaf(&pool), FieldMode::Upper);
    let items = frame.flatten();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].transform.field_mode, FieldMode::Upper);
    assert_eq!(items[1].transform.field_mode, FieldMode::Lower);
}

#[test]
fn interlace_lower_first_formats_swap_fields() {
    let pool = TexturePool::default();
    let frame = DrawFrame::interlace(test_leaf(&pool), test_leaf(&pool), FieldMode::Lower);
    let items = frame.flatten();
    assert_eq!(items[0].transform.field_mode, FieldMode::Lower);
    assert_eq!(items[1].transform.field_mode, FieldMode::Upper);
}

#[test]
fn interlace_collapses_matching_sentinels() {
    let f = DrawFrame::interlace(DrawFrame::empty(), DrawFrame::empty(), FieldMode::Upper);
    assert!(f.is_empty());
    let f = DrawFrame::interlace(DrawFrame::eof(), DrawFrame::eof(), FieldMode::Upper);
    assert!(f.is_eof());
}

#[test]
fn interlace_on_progressive_passes_first_through() {
    let pool = TexturePool::default();
    let first = test_leaf(&pool);
    let frame = DrawFrame::interlace(first, test_leaf(&pool), FieldMode::Progressive);
    assert_eq!(frame.flatten().len(), 1);
}
