use image::RgbImage;
use serde::Serialize;

use crate::pipeline::error::PipelineError;

pub const DEFAULT_PADDING_FRACTION: f32 = 0.2;

/// Face bounding box in relative [0, 1] coordinates, as emitted by the
/// face localizer. Width and height must be positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub width: f32,
    pub height: f32,
}

/// Absolute pixel rectangle, clamped to the image bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Sub-image handed to the downstream capabilities, together with the
/// absolute rectangle it was extracted from. Lives only for the duration
/// of one pipeline invocation.
#[derive(Debug, Clone)]
pub struct CroppedRegion {
    pub image: RgbImage,
    pub bounds: PixelRect,
}

/// Convert a relative detection box into a padded, clamped pixel crop.
///
/// The box is expanded symmetrically by `padding_fraction` of its own width
/// horizontally and of its own height vertically, then every edge is clamped
/// to the image extent. A box that ends up with zero area, or that lies
/// entirely outside the image, is an `InvalidRegion` error rather than a
/// silent no-op.
pub fn crop_face_region(
    image: &RgbImage,
    relative: &BoundingBox,
    padding_fraction: f32,
) -> Result<CroppedRegion, PipelineError> {
    if relative.width <= 0.0 || relative.height <= 0.0 {
        return Err(PipelineError::InvalidRegion(format!(
            "box has non-positive extent {}x{}",
            relative.width, relative.height
        )));
    }
    if padding_fraction < 0.0 {
        return Err(PipelineError::InvalidRegion(format!(
            "negative padding fraction {padding_fraction}"
        )));
    }

    let (image_width, image_height) = (image.width() as f32, image.height() as f32);

    let box_x = relative.x_min * image_width;
    let box_y = relative.y_min * image_height;
    let box_width = relative.width * image_width;
    let box_height = relative.height * image_height;

    let x_pad = box_width * padding_fraction;
    let y_pad = box_height * padding_fraction;

    let x_start = (box_x - x_pad).max(0.0).floor() as u32;
    let y_start = (box_y - y_pad).max(0.0).floor() as u32;
    let x_end = (box_x + box_width + x_pad).min(image_width).floor() as u32;
    let y_end = (box_y + box_height + y_pad).min(image_height).floor() as u32;

    if x_end <= x_start || y_end <= y_start {
        return Err(PipelineError::InvalidRegion(format!(
            "crop [{x_start}, {x_end}) x [{y_start}, {y_end}) has no area"
        )));
    }

    let bounds = PixelRect {
        x: x_start,
        y: y_start,
        width: x_end - x_start,
        height: y_end - y_start,
    };

    let cropped = image::imageops::crop_imm(image, bounds.x, bounds.y, bounds.width, bounds.height)
        .to_image();

    Ok(CroppedRegion { image: cropped, bounds })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(width: u32, height: u32) -> RgbImage {
        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([(x % 256) as u8, (y % 256) as u8, 128]);
        }
        img
    }

    #[test]
    fn test_zero_padding_matches_raw_extraction() {
        let img = gradient_image(100, 100);
        let relative = BoundingBox { x_min: 0.25, y_min: 0.25, width: 0.5, height: 0.5 };

        let region = crop_face_region(&img, &relative, 0.0).unwrap();
        assert_eq!(region.bounds, PixelRect { x: 25, y: 25, width: 50, height: 50 });

        let raw = image::imageops::crop_imm(&img, 25, 25, 50, 50).to_image();
        assert_eq!(region.image.as_raw(), raw.as_raw());
    }

    #[test]
    fn test_padding_clamps_at_origin() {
        // Box at the top-left corner: expansion beyond the edge clamps to 0.
        let img = gradient_image(100, 100);
        let relative = BoundingBox { x_min: 0.0, y_min: 0.0, width: 0.5, height: 0.5 };

        let region = crop_face_region(&img, &relative, 0.2).unwrap();
        assert_eq!(region.bounds, PixelRect { x: 0, y: 0, width: 60, height: 60 });
    }

    #[test]
    fn test_padding_clamps_at_far_edge() {
        let img = gradient_image(100, 100);
        let relative = BoundingBox { x_min: 0.5, y_min: 0.5, width: 0.5, height: 0.5 };

        let region = crop_face_region(&img, &relative, 0.2).unwrap();
        assert!(region.bounds.x + region.bounds.width <= 100);
        assert!(region.bounds.y + region.bounds.height <= 100);
        assert_eq!(region.bounds, PixelRect { x: 40, y: 40, width: 60, height: 60 });
    }

    #[test]
    fn test_box_outside_image_is_invalid() {
        let img = gradient_image(100, 100);
        let relative = BoundingBox { x_min: 1.2, y_min: 0.1, width: 0.3, height: 0.3 };

        let err = crop_face_region(&img, &relative, 0.0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRegion(_)));
    }

    #[test]
    fn test_degenerate_box_is_invalid() {
        let img = gradient_image(100, 100);
        let relative = BoundingBox { x_min: 0.4, y_min: 0.4, width: 0.0, height: 0.2 };

        let err = crop_face_region(&img, &relative, 0.2).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRegion(_)));
    }

    #[test]
    fn test_negative_padding_is_invalid() {
        let img = gradient_image(100, 100);
        let relative = BoundingBox { x_min: 0.2, y_min: 0.2, width: 0.4, height: 0.4 };

        let err = crop_face_region(&img, &relative, -0.5).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRegion(_)));
    }

    #[test]
    fn test_subpixel_box_on_tiny_image_is_invalid() {
        let img = gradient_image(4, 4);
        let relative = BoundingBox { x_min: 0.1, y_min: 0.1, width: 0.05, height: 0.05 };

        let err = crop_face_region(&img, &relative, 0.0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRegion(_)));
    }
}
