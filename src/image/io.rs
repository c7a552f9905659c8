//! Decoding and encoding through the `image` crate.
//!
//! Available when the `image-io` feature is enabled. Pixels are converted to
//! BGR(A) order on load and back to RGB(A) on save.

use crate::image::Image;
use crate::util::{MoonRegError, MoonRegResult};
use std::path::Path;

fn io_error(err: image::ImageError) -> MoonRegError {
    MoonRegError::ImageIo {
        reason: err.to_string(),
    }
}

fn swap_red_blue(data: &mut [u8], channels: usize) {
    if channels >= 3 {
        data.chunks_exact_mut(channels).for_each(|px| px.swap(0, 2));
    }
}

/// Converts a decoded image, keeping gray as 1 channel and alpha as 4.
pub fn from_dynamic_image(img: &image::DynamicImage) -> MoonRegResult<Image> {
    let (width, height) = (img.width() as usize, img.height() as usize);
    let color = img.color();
    if !color.has_color() && !color.has_alpha() {
        return Image::new(img.to_luma8().into_raw(), width, height, 1);
    }
    if color.has_alpha() {
        return from_rgba(img.to_rgba8().into_raw(), width, height);
    }
    let mut data = img.to_rgb8().into_raw();
    swap_red_blue(&mut data, 3);
    Image::new(data, width, height, 3)
}

/// Wraps an RGBA host buffer as a BGRA image.
pub fn from_rgba(mut rgba: Vec<u8>, width: usize, height: usize) -> MoonRegResult<Image> {
    swap_red_blue(&mut rgba, 4);
    Image::new(rgba, width, height, 4)
}

/// Decodes an encoded buffer (png or jpeg).
pub fn decode_image(bytes: &[u8]) -> MoonRegResult<Image> {
    let img = image::load_from_memory(bytes).map_err(io_error)?;
    from_dynamic_image(&img)
}

/// Loads an image from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> MoonRegResult<Image> {
    let img = image::open(path).map_err(io_error)?;
    from_dynamic_image(&img)
}

/// Converts to an `image::DynamicImage` in RGB(A) order.
pub fn to_dynamic_image(img: &Image) -> MoonRegResult<image::DynamicImage> {
    let (width, height) = (img.width() as u32, img.height() as u32);
    let mut data = img.data().to_vec();
    swap_red_blue(&mut data, img.channels());
    let invalid = || MoonRegError::InvalidInput("pixel buffer does not match image size");
    let dynamic = match img.channels() {
        1 => image::DynamicImage::ImageLuma8(
            image::GrayImage::from_raw(width, height, data).ok_or_else(invalid)?,
        ),
        3 => image::DynamicImage::ImageRgb8(
            image::RgbImage::from_raw(width, height, data).ok_or_else(invalid)?,
        ),
        _ => image::DynamicImage::ImageRgba8(
            image::RgbaImage::from_raw(width, height, data).ok_or_else(invalid)?,
        ),
    };
    Ok(dynamic)
}

/// Saves an image; the format follows the file extension.
pub fn save_image<P: AsRef<Path>>(img: &Image, path: P) -> MoonRegResult<()> {
    to_dynamic_image(img)?.save(path).map_err(io_error)
}
