//! CPU bokeh compositor
//!
//! Sharp foreground over a Gaussian-blurred background, blended through the
//! thresholded segmentation mask with a softened edge.

use image::{imageops, GrayImage, Luma, Rgba, RgbaImage};

use super::EffectSettings;
use crate::camera::CameraFrame;
use crate::error::ModelError;
use crate::ml::SegmentationMask;

/// Composite `frame` through `mask` using `settings`
pub fn composite(
    frame: &CameraFrame,
    mask: &SegmentationMask,
    settings: &EffectSettings,
) -> Result<RgbaImage, ModelError> {
    let sharp = frame.to_image().ok_or_else(|| {
        ModelError::FrameProcessing(format!(
            "frame {} has {} bytes for {}x{}",
            frame.frame_number,
            frame.data.len(),
            frame.width,
            frame.height
        ))
    })?;
    if !mask.is_valid() {
        return Err(ModelError::FrameProcessing(format!(
            "invalid {}x{} mask with {} values",
            mask.width,
            mask.height,
            mask.mask.len()
        )));
    }

    let (width, height) = sharp.dimensions();
    let alpha = foreground_alpha(mask, width, height, settings);

    let background = if settings.background_blur_radius > 0 {
        imageops::blur(&sharp, settings.background_blur_radius as f32)
    } else {
        sharp.clone()
    };

    let mut output = RgbaImage::new(width, height);
    for (x, y, px) in output.enumerate_pixels_mut() {
        let a = alpha.get_pixel(x, y)[0] as f32 / 255.0;
        let fg = sharp.get_pixel(x, y);
        let bg = background.get_pixel(x, y);
        *px = Rgba(std::array::from_fn(|c| {
            (fg[c] as f32 * a + bg[c] as f32 * (1.0 - a)).round() as u8
        }));
    }

    if settings.mirror {
        imageops::flip_horizontal_in_place(&mut output);
    }

    Ok(output)
}

/// Per-pixel foreground weight at output resolution
fn foreground_alpha(mask: &SegmentationMask, width: u32, height: u32, settings: &EffectSettings) -> GrayImage {
    let threshold = settings.foreground_threshold;
    let hard = GrayImage::from_fn(width, height, |x, y| {
        let u = (x as f32 + 0.5) / width as f32;
        let v = (y as f32 + 0.5) / height as f32;
        if mask.sample(u, v) >= threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    if settings.edge_blur_radius > 0 {
        imageops::blur(&hard, settings.edge_blur_radius as f32)
    } else {
        hard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Left half black, right half white
    fn split_frame(width: u32, height: u32) -> CameraFrame {
        let mut data = Vec::new();
        for _y in 0..height {
            for x in 0..width {
                let v = if x < width / 2 { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        CameraFrame::new(data, width, height, 1)
    }

    fn sharp_settings() -> EffectSettings {
        EffectSettings {
            foreground_threshold: 0.5,
            background_blur_radius: 4,
            edge_blur_radius: 0,
            mirror: false,
        }
    }

    #[test]
    fn test_full_foreground_is_untouched() {
        let frame = split_frame(16, 8);
        let mask = SegmentationMask::new(vec![1.0; 4], 2, 2);
        let out = composite(&frame, &mask, &sharp_settings()).unwrap();
        assert_eq!(out.into_raw(), frame.data);
    }

    #[test]
    fn test_background_is_blurred() {
        let frame = split_frame(16, 8);
        let mask = SegmentationMask::new(vec![0.0; 4], 2, 2);
        let out = composite(&frame, &mask, &sharp_settings()).unwrap();
        // The hard edge between the halves gets smeared
        let left_of_edge = out.get_pixel(7, 4)[0];
        assert!(left_of_edge > 0 && left_of_edge < 255, "got {}", left_of_edge);
    }

    #[test]
    fn test_zero_blur_keeps_background() {
        let frame = split_frame(16, 8);
        let mask = SegmentationMask::new(vec![0.0; 4], 2, 2);
        let settings = EffectSettings {
            background_blur_radius: 0,
            ..sharp_settings()
        };
        let out = composite(&frame, &mask, &settings).unwrap();
        assert_eq!(out.into_raw(), frame.data);
    }

    #[test]
    fn test_mirror_flips_horizontally() {
        let frame = split_frame(16, 8);
        let mask = SegmentationMask::new(vec![1.0; 4], 2, 2);
        let settings = EffectSettings {
            mirror: true,
            ..sharp_settings()
        };
        let out = composite(&frame, &mask, &settings).unwrap();
        assert_eq!(out.get_pixel(0, 0)[0], 255);
        assert_eq!(out.get_pixel(15, 0)[0], 0);
    }

    #[test]
    fn test_threshold_selects_foreground() {
        let frame = split_frame(16, 8);
        // Mask probability 0.6 everywhere: foreground at 0.5, background at 0.7
        let mask = SegmentationMask::new(vec![0.6; 4], 2, 2);
        let kept = composite(&frame, &mask, &sharp_settings()).unwrap();
        assert_eq!(kept.into_raw(), frame.data);

        let settings = EffectSettings {
            foreground_threshold: 0.7,
            ..sharp_settings()
        };
        let blurred = composite(&frame, &mask, &settings).unwrap();
        assert_ne!(blurred.into_raw(), frame.data);
    }

    #[test]
    fn test_malformed_input_is_frame_error() {
        let frame = CameraFrame::new(vec![0; 3], 4, 4, 9);
        let mask = SegmentationMask::new(vec![1.0], 1, 1);
        let err = composite(&frame, &mask, &sharp_settings()).unwrap_err();
        assert!(matches!(err, ModelError::FrameProcessing(_)));

        let frame = split_frame(4, 4);
        let empty = SegmentationMask::new(Vec::new(), 0, 0);
        assert!(matches!(
            composite(&frame, &empty, &sharp_settings()),
            Err(ModelError::FrameProcessing(_))
        ));
    }
}
