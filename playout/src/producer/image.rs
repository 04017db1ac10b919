use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::foundation::error::{PlayoutError, PlayoutResult};
use crate::frame::draw_frame::DrawFrame;
use crate::frame::pixel::PixelDesc;
use crate::producer::{FrameFactory, Producer, ReceiveFlags};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tga"];

/// Resolve a media-folder stem to an existing image file by trying the
/// supported extensions; a path that already exists is returned as-is.
pub fn probe_image_path(media_folder: &Path, stem: &str) -> Option<PathBuf> {
    let direct = media_folder.join(stem);
    if direct.is_file() {
        return Some(direct);
    }
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| media_folder.join(format!("{stem}.{ext}")))
        .find(|p| p.is_file())
}

/// Still-image producer: decodes once during `initialize`, then serves the
/// uploaded frame forever.
pub struct ImageProducer {
    path: PathBuf,
    frame: DrawFrame,
    width: u32,
    height: u32,
}

impl ImageProducer {
    /// Create a producer for an image file on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frame: DrawFrame::empty(),
            width: 0,
            height: 0,
        }
    }
}

impl Producer for ImageProducer {
    fn receive(&mut self, _flags: ReceiveFlags) -> PlayoutResult<DrawFrame> {
        Ok(self.frame.clone())
    }

    fn initialize(&mut self, factory: Arc<dyn FrameFactory>) -> PlayoutResult<()> {
        let img = image::open(&self.path)
            .map_err(|e| {
                PlayoutError::producer(format!(
                    "failed to decode image '{}': {e}",
                    self.path.display()
                ))
            })?
            .to_rgba8();
        let (w, h) = img.dimensions();
        self.width = w;
        self.height = h;
        self.frame = factory.create_frame(&PixelDesc::rgba(w, h), &[img.as_raw()])?;
        Ok(())
    }

    fn name(&self) -> &str {
        "image"
    }

    fn info(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "image",
            "filename": self.path.display().to_string(),
            "width": self.width,
            "height": self.height,
        })
    }

    fn print(&self) -> String {
        format!("image[{}]", self.path.display())
    }
}
