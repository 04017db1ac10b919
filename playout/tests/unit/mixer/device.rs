use super::*;

fn desc(w: u32, h: u32) -> TextureDesc {
    TextureDesc {
        width: w,
        height: h,
        stride: w * 4,
        channels: 4,
    }
}

#[test]
fn create_rejects_wrong_size() {
    let pool = TexturePool::default();
    let err = pool.create(desc(2, 2), &[0u8; 3]).unwrap_err();
    assert!(err.to_string().contains("size mismatch"));
}

#[test]
fn dropped_texture_buffer_is_reused() {
    let pool = TexturePool::default();
    let d = desc(4, 4);
    let bytes = vec![7u8; d.byte_len()];

    let t = pool.create(d, &bytes).unwrap();
    drop(t);
    assert_eq!(pool.stats().retained, 1);

    let t2 = pool.create(d, &bytes).unwrap();
    assert_eq!(pool.stats().retained, 0);
    assert_eq!(pool.stats().allocations, 1, "second create must reuse");
    t2.with_data(|data| assert_eq!(data, &bytes[..]));
}

#[test]
fn clones_share_one_pooled_buffer() {
    let pool = TexturePool::default();
    let d = desc(4, 4);
    let t = pool.create(d, &vec![1u8; d.byte_len()]).unwrap();
    let t2 = t.clone();
    drop(t);
    assert_eq!(pool.stats().retained, 0, "still referenced");
    drop(t2);
    assert_eq!(pool.stats().retained, 1);
}

#[test]
fn bucket_cap_is_honored() {
    let pool = TexturePool::new(TexturePoolOpts {
        max_pool_bytes: 1 << 30,
        max_per_bucket: 1,
    });
    let d = desc(4, 4);
    let a = pool.create(d, &vec![0u8; d.byte_len()]).unwrap();
    let b = pool.create(d, &vec![0u8; d.byte_len()]).unwrap();
    drop(a);
    drop(b);
    let st = pool.stats();
    assert_eq!(st.retained, 1);
    assert_eq!(st.dropped_on_release, 1);
}

#[test]
fn global_byte_cap_is_honored() {
    let d = desc(4, 4);
    let pool = TexturePool::new(TexturePoolOpts {
        max_pool_bytes: d.byte_len(),
        max_per_bucket: 8,
    });
    let a = pool.create(d, &vec![0u8; d.byte_len()]).unwrap();
    let b = pool.create(d, &vec![0u8; d.byte_len()]).unwrap();
    drop(a);
    drop(b);
    let st = pool.stats();
    assert_eq!(st.retained_bytes, d.byte_len());
    assert_eq!(st.retained, 1);
}

#[test]
fn render_target_starts_cleared() {
    let t = RenderTarget::new(2, 2);
    t.with_data(|d| assert!(d.iter().all(|&b| b == 0)));
    t.with_data_mut(|d| d[0] = 9);
    t.clear();
    t.with_data(|d| assert!(d.iter().all(|&b| b == 0)));
}

#[test]
fn uniform_value_conversions() {
    assert_eq!(UniformValue::Bool(true).as_f64(), 1.0);
    assert!(UniformValue::Int(3).as_bool());
    assert_eq!(UniformValue::Float(2.6).as_i32(), 3);
}
