use crate::frame::transform::FrameTransform;

/// Named easing functions mapping normalized progress `[0,1] -> [0,1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tweener {
    /// Straight line.
    #[default]
    Linear,
    /// Quadratic ease-in.
    InQuad,
    /// Quadratic ease-out.
    OutQuad,
    /// Quadratic ease-in/out.
    InOutQuad,
    /// Cubic ease-in.
    InCubic,
    /// Cubic ease-out.
    OutCubic,
    /// Cubic ease-in/out.
    InOutCubic,
    /// Quartic ease-in.
    InQuart,
    /// Quartic ease-out.
    OutQuart,
    /// Bouncing ease-out.
    OutBounce,
}

impl Tweener {
    /// Parse a case-insensitive tween name; the `ease` prefix is optional
    /// (`easeInQuad` and `inquad` both work).
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let stripped = lower.strip_prefix("ease").unwrap_or(&lower);
        match stripped {
            "linear" => Some(Self::Linear),
            "inquad" => Some(Self::InQuad),
            "outquad" => Some(Self::OutQuad),
            "inoutquad" => Some(Self::InOutQuad),
            "incubic" => Some(Self::InCubic),
            "outcubic" => Some(Self::OutCubic),
            "inoutcubic" => Some(Self::InOutCubic),
            "inquart" => Some(Self::InQuart),
            "outquart" => Some(Self::OutQuart),
            "outbounce" => Some(Self::OutBounce),
            _ => None,
        }
    }

    /// Apply this easing to progress `t`, clamped into `[0, 1]`.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::InQuad => t * t,
            Self::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Self::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(2) / 2.0)
                }
            }
            Self::InCubic => t * t * t,
            Self::OutCubic => 1.0 - (1.0 - t).powi(3),
            Self::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(3) / 2.0)
                }
            }
            Self::InQuart => t.powi(4),
            Self::OutQuart => 1.0 - (1.0 - t).powi(4),
            Self::OutBounce => {
                const N1: f64 = 7.5625;
                const D1: f64 = 2.75;
                if t < 1.0 / D1 {
                    N1 * t * t
                } else if t < 2.0 / D1 {
                    let t = t - 1.5 / D1;
                    N1 * t * t + 0.75
                } else if t < 2.5 / D1 {
                    let t = t - 2.25 / D1;
                    N1 * t * t + 0.9375
                } else {
                    let t = t - 2.625 / D1;
                    N1 * t * t + 0.984375
                }
            }
        }
    }
}

/// Anything a [`TweenedTransform`] can interpolate.
pub trait Tween: Clone {
    /// Interpolate between `a` and `b` at eased progress `t`.
    fn interp(a: &Self, b: &Self, t: f64) -> Self;
}

impl Tween for FrameTransform {
    fn interp(a: &Self, b: &Self, t: f64) -> Self {
        FrameTransform::lerp(a, b, t)
    }
}

impl Tween for f64 {
    fn interp(a: &Self, b: &Self, t: f64) -> Self {
        a + (b - a) * t
    }
}

/// A value animating from `source` to `dest` over a frame count.
///
/// `fetch_and_tick(n)` advances time by `n` frames, saturating at the
/// duration, and returns the eased in-between value; once time reaches the
/// duration it returns `dest` exactly.
#[derive(Clone, Debug)]
pub struct TweenedTransform<T: Tween> {
    source: T,
    dest: T,
    duration: u32,
    time: u32,
    tweener: Tweener,
}

impl<T: Tween + Default> Default for TweenedTransform<T> {
    fn default() -> Self {
        Self {
            source: T::default(),
            dest: T::default(),
            duration: 0,
            time: 0,
            tweener: Tweener::Linear,
        }
    }
}

impl<T: Tween> TweenedTransform<T> {
    /// Start a tween from `source` to `dest` over `duration` frames.
    pub fn new(source: T, dest: T, duration: u32, tweener: Tweener) -> Self {
        Self {
            source,
            dest,
            duration,
            time: 0,
            tweener,
        }
    }

    /// Current value without advancing time.
    pub fn fetch(&self) -> T {
        if self.time >= self.duration {
            return self.dest.clone();
        }
        let progress = f64::from(self.time) / f64::from(self.duration);
        T::interp(&self.source, &self.dest, self.tweener.apply(progress))
    }

    /// Advance time by `num` frames (saturating) and return the new value.
    pub fn fetch_and_tick(&mut self, num: u32) -> T {
        self.time = (self.time + num).min(self.duration);
        self.fetch()
    }

    /// `true` once the tween has reached its destination.
    pub fn done(&self) -> bool {
        self.time >= self.duration
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stage/tween.rs"]
mod tests;
