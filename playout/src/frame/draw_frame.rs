use std::sync::Arc;

use smallvec::SmallVec;

use crate::format::FieldMode;
use crate::frame::pixel::PixelDesc;
use crate::frame::transform::FrameTransform;
use crate::mixer::device::Texture;

/// Immutable pixel payload of a leaf frame: uploaded planes plus their
/// description. Shared between the pipeline and the device texture pool.
#[derive(Clone, Debug)]
pub struct ConstFrame {
    /// Pixel layout.
    pub desc: PixelDesc,
    /// One texture per plane, in binding order.
    pub textures: SmallVec<[Texture; 4]>,
}

#[derive(Clone, Debug)]
enum FrameContent {
    Empty,
    Eof,
    Leaf(Arc<ConstFrame>),
    Composite(Vec<DrawFrame>),
}

/// A recursive drawable value flowing from producers to the mixer.
///
/// Either a sentinel (`empty` for "nothing this tick", `eof` for
/// end-of-media), a leaf referencing uploaded textures, or an ordered
/// composite of children. Every node carries a transform; transforms compose
/// root-to-leaf when the mixer flattens the tree.
#[derive(Clone, Debug)]
pub struct DrawFrame {
    content: FrameContent,
    /// Transform applied to this node and everything below it.
    pub transform: FrameTransform,
}

impl DrawFrame {
    /// The "no frame this tick" sentinel.
    pub fn empty() -> Self {
        Self {
            content: FrameContent::Empty,
            transform: FrameTransform::default(),
        }
    }

    /// The end-of-media sentinel; a producer returns it exactly once.
    pub fn eof() -> Self {
        Self {
            content: FrameContent::Eof,
            transform: FrameTransform::default(),
        }
    }

    /// A leaf over uploaded textures.
    pub fn leaf(frame: Arc<ConstFrame>) -> Self {
        Self {
            content: FrameContent::Leaf(frame),
            transform: FrameTransform::default(),
        }
    }

    /// An ordered composite of children (drawn first to last).
    pub fn composite(children: Vec<DrawFrame>) -> Self {
        Self {
            content: FrameContent::Composite(children),
            transform: FrameTransform::default(),
        }
    }

    /// Wrap `inner` under an extra transform node.
    pub fn with_transform(inner: DrawFrame, transform: FrameTransform) -> Self {
        Self {
            content: FrameContent::Composite(vec![inner]),
            transform,
        }
    }

    /// Build the two-field composite for an interlaced output frame.
    ///
    /// `first`/`second` are the temporally ordered field frames; `field_mode`
    /// says which field the format emits first. Each child gets the matching
    /// per-field mode so the kernel can stipple the right lines. When both
    /// fields are the same sentinel the composite collapses to it.
    pub fn interlace(first: DrawFrame, second: DrawFrame, field_mode: FieldMode) -> DrawFrame {
        if !field_mode.is_interlaced() {
            return first;
        }
        if first.is_empty() && second.is_empty() {
            return DrawFrame::empty();
        }
        if first.is_eof() && second.is_eof() {
            return DrawFrame::eof();
        }

        let mut first = first;
        let mut second = second;
        first.transform.field_mode = field_mode;
        second.transform.field_mode = field_mode.other_field();
        DrawFrame::composite(vec![first, second])
    }

    /// `true` for the empty sentinel.
    pub fn is_empty(&self) -> bool {
        matches!(self.content, FrameContent::Empty)
    }

    /// `true` for the eof sentinel.
    pub fn is_eof(&self) -> bool {
        matches!(self.content, FrameContent::Eof)
    }

    /// Flatten the tree into ordered [`RenderItem`]s under composed
    /// transforms, skipping sentinels.
    pub fn flatten(&self) -> Vec<RenderItem> {
        let mut items = Vec::new();
        self.flatten_into(&FrameTransform::default(), &mut items);
        items
    }

    fn flatten_into(&self, parent: &FrameTransform, items: &mut Vec<RenderItem>) {
        let composed = FrameTransform::combine(parent, &self.transform);
        match &self.content {
            FrameContent::Empty | FrameContent::Eof => {}
            FrameContent::Leaf(frame) => items.push(RenderItem {
                desc: frame.desc.clone(),
                textures: frame.textures.clone(),
                transform: composed,
            }),
            FrameContent::Composite(children) => {
                for child in children {
                    child.flatten_into(&composed, items);
                }
            }
        }
    }
}

/// A flattened unit of drawing handed to the image kernel.
#[derive(Clone, Debug)]
pub struct RenderItem {
    /// Pixel layout of the planes.
    pub desc: PixelDesc,
    /// Textures, one per plane; released after the draw.
    pub textures: SmallVec<[Texture; 4]>,
    /// Fully composed transform (blend mode included).
    pub transform: FrameTransform,
}

#[cfg(test)]
#[path = "../../tests/unit/frame/draw_frame.rs"]
mod tests;
