use crate::format::FieldMode;

/// How a layer combines with the pixels already in the output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// Porter-Duff source-over.
    #[default]
    Normal,
    /// Source replaces destination.
    Replace,
    /// Saturating add.
    Add,
    /// `s + d - s*d`.
    Screen,
    /// `s * d`.
    Multiply,
    /// Multiply or screen depending on destination.
    Overlay,
}

impl BlendMode {
    /// Shader-side mode code.
    pub fn code(self) -> i32 {
        match self {
            Self::Normal => 0,
            Self::Replace => 1,
            Self::Add => 2,
            Self::Screen => 3,
            Self::Multiply => 4,
            Self::Overlay => 5,
        }
    }

    /// Parse a case-insensitive mode name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "replace" => Some(Self::Replace),
            "add" => Some(Self::Add),
            "screen" => Some(Self::Screen),
            "multiply" => Some(Self::Multiply),
            "overlay" => Some(Self::Overlay),
            _ => None,
        }
    }
}

/// Input/output level mapping with gamma, applied before blending.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Levels {
    /// Black point of the input range.
    pub min_input: f64,
    /// White point of the input range.
    pub max_input: f64,
    /// Black point of the output range.
    pub min_output: f64,
    /// White point of the output range.
    pub max_output: f64,
    /// Gamma exponent (1.0 is identity).
    pub gamma: f64,
}

impl Default for Levels {
    fn default() -> Self {
        Self {
            min_input: 0.0,
            max_input: 1.0,
            min_output: 0.0,
            max_output: 1.0,
            gamma: 1.0,
        }
    }
}

impl Levels {
    /// `true` when any component deviates from identity by more than `epsilon`.
    pub fn deviates(&self, epsilon: f64) -> bool {
        self.min_input > epsilon
            || self.max_input < 1.0 - epsilon
            || self.min_output > epsilon
            || self.max_output < 1.0 - epsilon
            || (self.gamma - 1.0).abs() > epsilon
    }
}

/// Per-layer rendering parameters.
///
/// Transforms compose associatively; [`FrameTransform::default`] is the
/// identity of that composition.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrameTransform {
    /// Overall opacity in `[0, 1]`.
    pub opacity: f64,
    /// Multiplicative brightness (1.0 is identity).
    pub brightness: f64,
    /// Multiplicative saturation (1.0 is identity).
    pub saturation: f64,
    /// Multiplicative contrast (1.0 is identity).
    pub contrast: f64,
    /// Level mapping.
    pub levels: Levels,
    /// Source quad position in normalized `[0,1]` output space.
    pub fill_translation: [f64; 2],
    /// Source quad size in normalized output space.
    pub fill_scale: [f64; 2],
    /// Scissor rectangle position in normalized output space.
    pub clip_translation: [f64; 2],
    /// Scissor rectangle size in normalized output space.
    pub clip_scale: [f64; 2],
    /// Per-layer interlacing override.
    pub field_mode: FieldMode,
    /// This layer is an alpha key for another layer.
    pub is_key: bool,
    /// Blend mode against the accumulated output.
    pub blend_mode: BlendMode,
    /// Linear audio gain.
    pub audio_gain: f64,
}

impl Default for FrameTransform {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            brightness: 1.0,
            saturation: 1.0,
            contrast: 1.0,
            levels: Levels::default(),
            fill_translation: [0.0, 0.0],
            fill_scale: [1.0, 1.0],
            clip_translation: [0.0, 0.0],
            clip_scale: [1.0, 1.0],
            field_mode: FieldMode::Progressive,
            is_key: false,
            blend_mode: BlendMode::Normal,
            audio_gain: 1.0,
        }
    }
}

impl FrameTransform {
    /// Compose a parent transform with a child.
    ///
    /// Scalars multiply; fill/clip rectangles nest (the child rectangle is
    /// expressed inside the parent's); levels tighten toward the narrower
    /// range; field modes intersect; `is_key` is sticky; a non-normal child
    /// blend mode overrides the parent's.
    pub fn combine(parent: &Self, child: &Self) -> Self {
        Self {
            opacity: parent.opacity * child.opacity,
            brightness: parent.brightness * child.brightness,
            saturation: parent.saturation * child.saturation,
            contrast: parent.contrast * child.contrast,
            levels: Levels {
                min_input: parent.levels.min_input.max(child.levels.min_input),
                max_input: parent.levels.max_input.min(child.levels.max_input),
                min_output: parent.levels.min_output.max(child.levels.min_output),
                max_output: parent.levels.max_output.min(child.levels.max_output),
                gamma: parent.levels.gamma * child.levels.gamma,
            },
            fill_translation: [
                parent.fill_translation[0] + parent.fill_scale[0] * child.fill_translation[0],
                parent.fill_translation[1] + parent.fill_scale[1] * child.fill_translation[1],
            ],
            fill_scale: [
                parent.fill_scale[0] * child.fill_scale[0],
                parent.fill_scale[1] * child.fill_scale[1],
            ],
            clip_translation: [
                parent.clip_translation[0] + parent.clip_scale[0] * child.clip_translation[0],
                parent.clip_translation[1] + parent.clip_scale[1] * child.clip_translation[1],
            ],
            clip_scale: [
                parent.clip_scale[0] * child.clip_scale[0],
                parent.clip_scale[1] * child.clip_scale[1],
            ],
            field_mode: parent.field_mode.intersect(child.field_mode),
            is_key: parent.is_key || child.is_key,
            blend_mode: if child.blend_mode != BlendMode::Normal {
                child.blend_mode
            } else {
                parent.blend_mode
            },
            audio_gain: parent.audio_gain * child.audio_gain,
        }
    }

    /// Component-wise interpolation for tweening.
    ///
    /// `t` is the already-eased progress in `[0, 1]`. Continuous fields
    /// interpolate linearly; discrete fields (field mode, key flag, blend
    /// mode) adopt the destination as soon as the tween starts.
    pub fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        let l = |x: f64, y: f64| x + (y - x) * t;
        let l2 = |x: [f64; 2], y: [f64; 2]| [l(x[0], y[0]), l(x[1], y[1])];
        Self {
            opacity: l(a.opacity, b.opacity),
            brightness: l(a.brightness, b.brightness),
            saturation: l(a.saturation, b.saturation),
            contrast: l(a.contrast, b.contrast),
            levels: Levels {
                min_input: l(a.levels.min_input, b.levels.min_input),
                max_input: l(a.levels.max_input, b.levels.max_input),
                min_output: l(a.levels.min_output, b.levels.min_output),
                max_output: l(a.levels.max_output, b.levels.max_output),
                gamma: l(a.levels.gamma, b.levels.gamma),
            },
            fill_translation: l2(a.fill_translation, b.fill_translation),
            fill_scale: l2(a.fill_scale, b.fill_scale),
            clip_translation: l2(a.clip_translation, b.clip_translation),
            clip_scale: l2(a.clip_scale, b.clip_scale),
            field_mode: b.field_mode,
            is_key: b.is_key,
            blend_mode: b.blend_mode,
            audio_gain: l(a.audio_gain, b.audio_gain),
        }
    }

    /// `true` when the clip rectangle deviates from the full frame.
    pub fn has_clip(&self, epsilon: f64) -> bool {
        self.clip_translation[0].abs() > epsilon
            || self.clip_translation[1].abs() > epsilon
            || (self.clip_scale[0] - 1.0).abs() > epsilon
            || (self.clip_scale[1] - 1.0).abs() > epsilon
    }
}

#[cfg(test)]
#[path = "../../tests/unit/frame/transform.rs"]
mod tests;
