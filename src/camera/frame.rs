//! Raw camera frames

use std::time::Instant;

use image::imageops::{self, FilterType};
use image::RgbaImage;

/// Camera frame data
#[derive(Clone, Debug)]
pub struct CameraFrame {
    /// RGBA pixel data
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame number, monotonically increasing per stream
    pub frame_number: u64,
    /// Capture timestamp
    pub timestamp: Instant,
}

impl CameraFrame {
    /// Create a frame from RGBA bytes
    pub fn new(data: Vec<u8>, width: u32, height: u32, frame_number: u64) -> Self {
        Self {
            data,
            width,
            height,
            frame_number,
            timestamp: Instant::now(),
        }
    }

    /// Whether the buffer holds exactly `width * height` RGBA pixels
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == (self.width as usize) * (self.height as usize) * 4
    }

    /// Copy the pixels into an `image` buffer, `None` if the buffer is malformed
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Resize for ML inference, `None` if the buffer is malformed
    pub fn downscale(&self, target_width: u32, target_height: u32) -> Option<RgbaImage> {
        let image = self.to_image()?;
        if image.dimensions() == (target_width, target_height) {
            return Some(image);
        }
        Some(imageops::resize(&image, target_width, target_height, FilterType::Triangle))
    }
}
