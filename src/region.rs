//! Cropping around a detected circle.

use crate::image::{Image, Plane};
use crate::shapes::{Circle, Rectangle};
use crate::util::{MoonRegError, MoonRegResult};

/// Computes the padded bounding square of `circle`, clamped to a
/// `width x height` frame. Clamping may leave a non-square region.
pub fn circle_crop_rect(
    width: usize,
    height: usize,
    circle: &Circle,
    padding: i32,
) -> MoonRegResult<Rectangle> {
    if !circle.is_valid() {
        return Err(MoonRegError::InvalidInput("cannot crop around an invalid circle"));
    }
    if padding < 0 {
        return Err(MoonRegError::InvalidInput("padding must not be negative"));
    }
    let reach = circle.radius + padding;
    let rect = Rectangle::new(
        (circle.x - reach).max(0),
        (circle.y - reach).max(0),
        (circle.x + reach).min(width as i32),
        (circle.y + reach).min(height as i32),
    );
    if rect.width() <= 0 || rect.height() <= 0 {
        return Err(MoonRegError::InvalidInput("circle lies outside the image"));
    }
    Ok(rect)
}

/// Crops `image` around `circle` expanded by `padding` pixels on each side.
///
/// Returns the crop and where it sat in `image`; `image.crop(&rect)` yields
/// the same pixels.
pub fn cut_image_from_circle(
    image: &Image,
    circle: &Circle,
    padding: i32,
) -> MoonRegResult<(Image, Rectangle)> {
    let rect = circle_crop_rect(image.width(), image.height(), circle, padding)?;
    Ok((image.crop(&rect)?, rect))
}

/// Plane variant used inside the detector loop.
pub(crate) fn cut_plane_from_circle(
    plane: &Plane<u8>,
    circle: &Circle,
    padding: i32,
) -> MoonRegResult<(Plane<u8>, Rectangle)> {
    let rect = circle_crop_rect(plane.width(), plane.height(), circle, padding)?;
    let sub = plane.sub_plane(
        rect.top_left_x as usize,
        rect.top_left_y as usize,
        rect.width() as usize,
        rect.height() as usize,
    );
    Ok((sub, rect))
}
