use image::imageops::FilterType;
use image::RgbImage;
use log::error;

use crate::pipeline::error::PipelineError;

/// Decode raw upload bytes into a 3-channel RGB image. Alpha and grayscale
/// inputs are converted; undecodable bytes are a fatal `ImageRead`.
pub fn decode_image(im_bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    match image::load_from_memory(im_bytes) {
        Ok(decoded) => Ok(decoded.to_rgb8()),
        Err(e) => {
            error!("failed to decode image: {e}");
            Err(PipelineError::ImageRead)
        }
    }
}

/// Resize and repack an RGB image into a planar NCHW float tensor of shape
/// `[1, 3, height, width]`, normalizing each pixel as `(p - mean) / std`.
pub fn image_to_nchw(
    image: &RgbImage,
    width: u32,
    height: u32,
    mean: f32,
    std: f32,
) -> (Vec<usize>, Vec<f32>) {
    let resized = image::imageops::resize(image, width, height, FilterType::Triangle);

    let mut data = Vec::with_capacity(3 * (width * height) as usize);
    for channel in 0..3 {
        for y in 0..height {
            for x in 0..width {
                let p = resized.get_pixel(x, y)[channel];
                data.push((p as f32 - mean) / std);
            }
        }
    }

    (vec![1, 3, height as usize, width as usize], data)
}

/// Resize and repack an RGB image into an interleaved NHWC float tensor of
/// shape `[1, size, size, 3]`, scaling each pixel by `scale`.
pub fn image_to_nhwc(image: &RgbImage, size: u32, scale: f32) -> (Vec<usize>, Vec<f32>) {
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);

    let mut data = Vec::with_capacity((size * size) as usize * 3);
    for y in 0..size {
        for x in 0..size {
            let pixel = resized.get_pixel(x, y);
            data.push(pixel[0] as f32 * scale);
            data.push(pixel[1] as f32 * scale);
            data.push(pixel[2] as f32 * scale);
        }
    }

    (vec![1, size as usize, size as usize, 3], data)
}
