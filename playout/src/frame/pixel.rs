use smallvec::{SmallVec, smallvec};

use crate::foundation::error::{PlayoutError, PlayoutResult};

/// Pixel layout of a producer frame.
///
/// The numeric codes match the image shader's `pixel_format` uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Packed 8-bit BGRA, one plane.
    Bgra,
    /// Packed 8-bit RGBA, one plane.
    Rgba,
    /// Planar YCbCr 4:2:0, three planes.
    Ycbcr420,
    /// Planar YCbCr 4:2:2, three planes.
    Ycbcr422,
    /// Planar YCbCr 4:4:4, three planes.
    Ycbcr444,
    /// Planar YCbCr 4:4:4 plus full-resolution alpha, four planes.
    Ycbcra,
}

impl PixelFormat {
    /// Shader-side format code.
    pub fn code(self) -> i32 {
        match self {
            Self::Bgra => 0,
            Self::Rgba => 1,
            Self::Ycbcr420 => 2,
            Self::Ycbcr422 => 3,
            Self::Ycbcr444 => 4,
            Self::Ycbcra => 5,
        }
    }

    /// Number of planes this format carries.
    pub fn plane_count(self) -> usize {
        match self {
            Self::Bgra | Self::Rgba => 1,
            Self::Ycbcr420 | Self::Ycbcr422 | Self::Ycbcr444 => 3,
            Self::Ycbcra => 4,
        }
    }

    /// `true` for the planar luma/chroma formats.
    pub fn is_ycbcr(self) -> bool {
        !matches!(self, Self::Bgra | Self::Rgba)
    }
}

/// One plane of image data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PlaneDesc {
    /// Plane width in pixels.
    pub width: u32,
    /// Plane height in pixels.
    pub height: u32,
    /// Bytes per row.
    pub stride: u32,
    /// Components per pixel in this plane (4 for packed BGRA, 1 for Y).
    pub channels: u32,
}

impl PlaneDesc {
    /// Total byte size of the plane.
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }
}

/// Full pixel description: format tag plus per-plane geometry.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PixelDesc {
    /// Format tag.
    pub format: PixelFormat,
    /// Planes, in shader binding order.
    pub planes: SmallVec<[PlaneDesc; 4]>,
}

impl PixelDesc {
    /// Packed BGRA description.
    pub fn bgra(width: u32, height: u32) -> Self {
        Self {
            format: PixelFormat::Bgra,
            planes: smallvec![PlaneDesc {
                width,
                height,
                stride: width * 4,
                channels: 4,
            }],
        }
    }

    /// Packed RGBA description.
    pub fn rgba(width: u32, height: u32) -> Self {
        Self {
            format: PixelFormat::Rgba,
            planes: smallvec![PlaneDesc {
                width,
                height,
                stride: width * 4,
                channels: 4,
            }],
        }
    }

    /// Planar YCbCr description with the given chroma subsampling.
    pub fn ycbcr(format: PixelFormat, width: u32, height: u32) -> PlayoutResult<Self> {
        let (cw, ch) = match format {
            PixelFormat::Ycbcr420 => (width.div_ceil(2), height.div_ceil(2)),
            PixelFormat::Ycbcr422 => (width.div_ceil(2), height),
            PixelFormat::Ycbcr444 | PixelFormat::Ycbcra => (width, height),
            other => {
                return Err(PlayoutError::validation(format!(
                    "{other:?} is not a planar ycbcr format"
                )));
            }
        };
        let luma = PlaneDesc {
            width,
            height,
            stride: width,
            channels: 1,
        };
        let chroma = PlaneDesc {
            width: cw,
            height: ch,
            stride: cw,
            channels: 1,
        };
        let mut planes: SmallVec<[PlaneDesc; 4]> = smallvec![luma, chroma, chroma];
        if format == PixelFormat::Ycbcra {
            planes.push(luma);
        }
        Ok(Self { format, planes })
    }

    /// Check the plane list against the format tag.
    pub fn validate(&self) -> PlayoutResult<()> {
        if self.planes.len() != self.format.plane_count() {
            return Err(PlayoutError::validation(format!(
                "{:?} requires {} planes, got {}",
                self.format,
                self.format.plane_count(),
                self.planes.len()
            )));
        }
        for (i, p) in self.planes.iter().enumerate() {
            if p.width == 0 || p.height == 0 {
                return Err(PlayoutError::validation(format!("plane {i} is empty")));
            }
            if p.stride < p.width * p.channels {
                return Err(PlayoutError::validation(format!(
                    "plane {i} stride {} shorter than row {}",
                    p.stride,
                    p.width * p.channels
                )));
            }
        }
        Ok(())
    }
}
