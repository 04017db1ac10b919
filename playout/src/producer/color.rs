use std::sync::Arc;

use crate::foundation::error::{PlayoutError, PlayoutResult};
use crate::frame::draw_frame::DrawFrame;
use crate::frame::pixel::PixelDesc;
use crate::producer::{FrameFactory, Producer, ReceiveFlags};

/// Parse `#AARRGGBB`, `#RRGGBB`, or a small set of named colors into BGRA
/// bytes.
pub fn parse_color(value: &str) -> PlayoutResult<[u8; 4]> {
    let named = match value.to_ascii_lowercase().as_str() {
        "black" => Some([0x00, 0x00, 0x00, 0xff]),
        "white" => Some([0xff, 0xff, 0xff, 0xff]),
        "red" => Some([0x00, 0x00, 0xff, 0xff]),
        "green" => Some([0x00, 0xff, 0x00, 0xff]),
        "blue" => Some([0xff, 0x00, 0x00, 0xff]),
        "transparent" => Some([0x00, 0x00, 0x00, 0x00]),
        _ => None,
    };
    if let Some(c) = named {
        return Ok(c);
    }

    let hex = value
        .strip_prefix('#')
        .ok_or_else(|| PlayoutError::validation(format!("unknown color '{value}'")))?;
    let parse2 = |s: &str| {
        u8::from_str_radix(s, 16)
            .map_err(|_| PlayoutError::validation(format!("bad hex color '{value}'")))
    };
    match hex.len() {
        8 => {
            let a = parse2(&hex[0..2])?;
            let r = parse2(&hex[2..4])?;
            let g = parse2(&hex[4..6])?;
            let b = parse2(&hex[6..8])?;
            Ok([b, g, r, a])
        }
        6 => {
            let r = parse2(&hex[0..2])?;
            let g = parse2(&hex[2..4])?;
            let b = parse2(&hex[4..6])?;
            Ok([b, g, r, 0xff])
        }
        _ => Err(PlayoutError::validation(format!(
            "hex color '{value}' must be #RRGGBB or #AARRGGBB"
        ))),
    }
}

/// Serves one solid-color frame forever.
///
/// The frame is a single uploaded pixel; the layer's fill transform
/// stretches it over whatever area it should cover.
pub struct ColorProducer {
    description: String,
    bgra: [u8; 4],
    frame: DrawFrame,
}

impl ColorProducer {
    /// Create a producer for a color string (see [`parse_color`]).
    pub fn new(color: &str) -> PlayoutResult<Self> {
        Ok(Self {
            description: color.to_owned(),
            bgra: parse_color(color)?,
            frame: DrawFrame::empty(),
        })
    }
}

impl Producer for ColorProducer {
    fn receive(&mut self, _flags: ReceiveFlags) -> PlayoutResult<DrawFrame> {
        Ok(self.frame.clone())
    }

    fn initialize(&mut self, factory: Arc<dyn FrameFactory>) -> PlayoutResult<()> {
        self.frame = factory.create_frame(&PixelDesc::bgra(1, 1), &[&self.bgra])?;
        Ok(())
    }

    fn name(&self) -> &str {
        "color"
    }

    fn info(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "color",
            "color": self.description,
        })
    }

    fn print(&self) -> String {
        format!("color[{}]", self.description)
    }
}
