//! The frame data model: pixel layouts, per-layer transforms, and the
//! recursive drawable value flowing from producers to the mixer.

/// Recursive drawable value flowing from producers to the mixer.
pub mod draw_frame;
/// Pixel layouts and plane descriptions.
pub mod pixel;
/// Per-layer geometric transforms.
pub mod transform;
