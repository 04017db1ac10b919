//! Output video formats and exact-rational clock arithmetic.

use std::time::Duration;

use crate::foundation::error::{PlayoutError, PlayoutResult};

/// Interlacing mode of a format or of a single drawn field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldMode {
    /// Full frames, no field separation.
    Progressive,
    /// Upper (even) lines first.
    Upper,
    /// Lower (odd) lines first.
    Lower,
}

impl FieldMode {
    /// `true` for upper or lower field modes.
    pub fn is_interlaced(self) -> bool {
        !matches!(self, Self::Progressive)
    }

    /// The opposite field; progressive maps to itself.
    pub fn other_field(self) -> Self {
        match self {
            Self::Progressive => Self::Progressive,
            Self::Upper => Self::Lower,
            Self::Lower => Self::Upper,
        }
    }

    /// Combine a parent and child field constraint.
    ///
    /// Progressive places no constraint, so the other side wins. Two equal
    /// constraints keep it. Disjoint constraints (upper ∩ lower) select no
    /// lines at all and degenerate back to progressive.
    pub fn intersect(self, other: Self) -> Self {
        match (self, other) {
            (Self::Progressive, x) | (x, Self::Progressive) => x,
            (a, b) if a == b => a,
            _ => Self::Progressive,
        }
    }
}

/// Frames-per-second as an exact rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Framerate {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), non-zero.
    pub den: u32,
}

impl Framerate {
    /// Create a validated framerate.
    pub fn new(num: u32, den: u32) -> PlayoutResult<Self> {
        if num == 0 || den == 0 {
            return Err(PlayoutError::validation("framerate num/den must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Floating-point frames per second.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame.
    pub fn frame_interval(self) -> Duration {
        Duration::from_secs_f64(f64::from(self.den) / f64::from(self.num))
    }
}

/// Exact rescale of `v` from timebase `src_num/src_den` to `dst_num/dst_den`,
/// rounding half away from zero.
///
/// This is the conversion producers use to translate container timestamps to
/// channel frame indices and back; it must stay exact for NTSC rates.
pub fn rescale(v: i64, src: (i64, i64), dst: (i64, i64)) -> i64 {
    let num = i128::from(v) * i128::from(src.0) * i128::from(dst.1);
    let den = i128::from(src.1) * i128::from(dst.0);
    debug_assert!(den != 0);
    let half = den.abs() / 2;
    let rounded = if num >= 0 { num + half } else { num - half } / den;
    rounded as i64
}

/// Immutable description of one channel's output format.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VideoFormat {
    /// Lookup name, e.g. `1080i50`.
    pub name: String,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Field handling for the whole channel.
    pub field_mode: FieldMode,
    /// Output frames per second (frame rate, not field rate).
    pub framerate: Framerate,
    /// Timebase numerator: fields (or frames when progressive) per second.
    pub time_scale: u32,
    /// Timebase denominator.
    pub duration: u32,
}

impl VideoFormat {
    /// Fields fetched per output frame: 2 when interlaced, 1 otherwise.
    pub fn field_count(&self) -> u32 {
        if self.field_mode.is_interlaced() { 2 } else { 1 }
    }

    /// Floating-point output frame rate.
    pub fn fps(&self) -> f64 {
        self.framerate.as_f64()
    }

    /// Wall-clock interval between output frames.
    pub fn frame_interval(&self) -> Duration {
        self.framerate.frame_interval()
    }

    /// Bytes in one packed BGRA output frame.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Convert a microsecond timestamp into an output frame index.
    pub fn us_to_frames(&self, us: i64) -> i64 {
        rescale(
            us,
            (1, 1_000_000),
            (i64::from(self.framerate.den), i64::from(self.framerate.num)),
        )
    }

    /// Convert an output frame index into a microsecond timestamp.
    pub fn frames_to_us(&self, frames: i64) -> i64 {
        rescale(
            frames,
            (i64::from(self.framerate.den), i64::from(self.framerate.num)),
            (1, 1_000_000),
        )
    }

    /// Look up a broadcast format by case-insensitive name.
    pub fn find(name: &str) -> Option<VideoFormat> {
        let wanted = name.to_ascii_lowercase();
        FORMAT_TABLE
            .iter()
            .find(|f| f.0 == wanted)
            .map(|f| f.build())
    }

    /// Names of every built-in format.
    pub fn names() -> Vec<&'static str> {
        FORMAT_TABLE.iter().map(|f| f.0).collect()
    }
}

struct FormatEntry(
    &'static str,
    u32,
    u32,
    FieldMode,
    (u32, u32),
    (u32, u32),
);

impl FormatEntry {
    fn build(&self) -> VideoFormat {
        VideoFormat {
            name: self.0.to_owned(),
            width: self.1,
            height: self.2,
            field_mode: self.3,
            framerate: Framerate {
                num: self.4.0,
                den: self.4.1,
            },
            time_scale: self.5.0,
            duration: self.5.1,
        }
    }
}

// Framerate is the output frame rate; (time_scale, duration) is the field
// rate timebase for interlaced formats and equals the frame rate otherwise.
const FORMAT_TABLE: &[FormatEntry] = &[
    FormatEntry("pal", 720, 576, FieldMode::Upper, (25, 1), (50, 1)),
    FormatEntry("ntsc", 720, 486, FieldMode::Lower, (30000, 1001), (60000, 1001)),
    FormatEntry("720p50", 1280, 720, FieldMode::Progressive, (50, 1), (50, 1)),
    FormatEntry("720p5994", 1280, 720, FieldMode::Progressive, (60000, 1001), (60000, 1001)),
    FormatEntry("1080i50", 1920, 1080, FieldMode::Upper, (25, 1), (50, 1)),
    FormatEntry("1080i5994", 1920, 1080, FieldMode::Upper, (30000, 1001), (60000, 1001)),
    FormatEntry("1080p25", 1920, 1080, FieldMode::Progressive, (25, 1), (25, 1)),
    FormatEntry("1080p2997", 1920, 1080, FieldMode::Progressive, (30000, 1001), (30000, 1001)),
    FormatEntry("1080p50", 1920, 1080, FieldMode::Progressive, (50, 1), (50, 1)),
    FormatEntry("1080p5994", 1920, 1080, FieldMode::Progressive, (60000, 1001), (60000, 1001)),
    FormatEntry("2160p25", 3840, 2160, FieldMode::Progressive, (25, 1), (25, 1)),
    FormatEntry("2160p2997", 3840, 2160, FieldMode::Progressive, (30000, 1001), (30000, 1001)),
    FormatEntry("2160p50", 3840, 2160, FieldMode::Progressive, (50, 1), (50, 1)),
    FormatEntry("2160p5994", 3840, 2160, FieldMode::Progressive, (60000, 1001), (60000, 1001)),
];

#[cfg(test)]
#[path = "../tests/unit/format.rs"]
mod tests;
