//! Alpha compositing of a foreground onto a region of a background.
//!
//! The foreground is shrunk (aspect preserved) when it exceeds the ROI and is
//! always centred inside it. Channels missing from an operand read as the
//! default pixel `(0, 0, 0, 255)`, so a gray value lands in the blue slot.

use crate::image::convert::convert_channels;
use crate::image::Image;
use crate::shapes::Roi;
use crate::trace::{trace_event, trace_span};
use crate::util::math::saturate_u8;
use crate::util::{MoonRegError, MoonRegResult};

const DEFAULT_PIXEL: [u8; 4] = [0, 0, 0, 255];

/// Per-channel upper bounds; foreground pixels entirely at or below them are
/// not drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelFilter([u8; 4]);

impl PixelFilter {
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Unpacks a little-endian 4-byte mask; `-1` means "no filter".
    pub fn from_packed(value: i32) -> Option<Self> {
        if value == -1 {
            None
        } else {
            Some(Self(value.to_le_bytes()))
        }
    }

    pub fn bytes(&self) -> [u8; 4] {
        self.0
    }

    /// Compares only as many bytes as the pixel has channels.
    pub fn rejects(&self, pixel: &[u8]) -> bool {
        pixel.iter().zip(self.0.iter()).all(|(p, f)| p <= f)
    }
}

fn validate_roi(background: &Image, roi: &Roi) -> MoonRegResult<()> {
    let out_of_bounds = roi.width == 0
        || roi.height == 0
        || roi.x.checked_add(roi.width).map_or(true, |e| e > background.width())
        || roi.y.checked_add(roi.height).map_or(true, |e| e > background.height());
    if out_of_bounds {
        return Err(MoonRegError::RoiOutOfBounds {
            x: roi.x,
            y: roi.y,
            width: roi.width,
            height: roi.height,
            img_width: background.width(),
            img_height: background.height(),
        });
    }
    Ok(())
}

fn validate_transparency(transparency: f32) -> MoonRegResult<f32> {
    if transparency.is_nan() {
        return Err(MoonRegError::InvalidInput("transparency must be a number"));
    }
    Ok(transparency.clamp(0.0, 1.0))
}

/// Size the foreground takes inside `roi`: unchanged when it fits, otherwise
/// the largest aspect-preserving size that fits.
pub fn fitted_size(fg_width: usize, fg_height: usize, roi: &Roi) -> (usize, usize) {
    if fg_width <= roi.width && fg_height <= roi.height {
        return (fg_width, fg_height);
    }
    if roi.width * fg_height <= roi.height * fg_width {
        (roi.width, (fg_height * roi.width / fg_width).max(1))
    } else {
        ((fg_width * roi.height / fg_height).max(1), roi.height)
    }
}

fn promote(image: &Image, channels: usize) -> MoonRegResult<Image> {
    let src_channels = image.channels();
    if src_channels == channels {
        return Ok(image.clone());
    }
    let mut out = Vec::with_capacity(image.width() * image.height() * channels);
    for px in image.data().chunks_exact(src_channels) {
        for c in 0..channels {
            out.push(if c < src_channels { px[c] } else { DEFAULT_PIXEL[c] });
        }
    }
    Image::new(out, image.width(), image.height(), channels)
}

/// Blends `foreground` (already fitted) into `out` at the centred ROI offset.
fn blend_into(
    out: &mut Image,
    roi: &Roi,
    foreground: &Image,
    transparency: f32,
    filter: Option<PixelFilter>,
) {
    let fg_channels = foreground.channels();
    let out_channels = out.channels();
    let off_x = roi.x + (roi.width - foreground.width()) / 2;
    let off_y = roi.y + (roi.height - foreground.height()) / 2;
    let mut drawn = 0usize;

    for fy in 0..foreground.height() {
        for fx in 0..foreground.width() {
            let fg = foreground.pixel(fx, fy);
            if filter.is_some_and(|f| f.rejects(fg)) {
                continue;
            }
            let coverage = if fg_channels == 4 {
                f32::from(fg[3]) / 255.0
            } else {
                1.0
            };
            let a = transparency * coverage;
            if a <= 0.0 {
                continue;
            }
            let dst = out.pixel_mut(off_x + fx, off_y + fy);
            for c in 0..out_channels {
                let b = f32::from(dst[c]);
                let f = if c == 3 {
                    255.0
                } else if c < fg_channels {
                    f32::from(fg[c])
                } else {
                    f32::from(DEFAULT_PIXEL[c])
                };
                dst[c] = saturate_u8(f * a + b * (1.0 - a));
            }
            drawn += 1;
        }
    }
    trace_event!("stack_blended", pixels = drawn);
}

/// Blends `foreground` onto `roi` of `background` and returns a new image of
/// the background's size with `max(bg, fg)` channels.
///
/// `transparency` scales the foreground alpha and is clamped to `[0, 1]`.
/// Pixels outside the ROI pass through unchanged (apart from channel
/// promotion).
pub fn stack_images(
    background: &Image,
    roi: Roi,
    foreground: &Image,
    transparency: f32,
    filter: Option<PixelFilter>,
) -> MoonRegResult<Image> {
    let _span = trace_span!("stack_images", width = roi.width, height = roi.height).entered();
    validate_roi(background, &roi)?;
    let transparency = validate_transparency(transparency)?;

    let (fw, fh) = fitted_size(foreground.width(), foreground.height(), &roi);
    let fitted = foreground.resize(fw, fh)?;
    let channels = background.channels().max(foreground.channels());
    let mut out = promote(background, channels)?;
    blend_into(&mut out, &roi, &fitted, transparency, filter);
    Ok(out)
}

/// Blends into `background` directly, first converting the foreground to the
/// background's channel count.
pub fn stack_images_in_place(
    background: &mut Image,
    roi: Roi,
    foreground: &Image,
    transparency: f32,
    filter: Option<PixelFilter>,
) -> MoonRegResult<()> {
    let _span = trace_span!("stack_images_in_place").entered();
    validate_roi(background, &roi)?;
    let transparency = validate_transparency(transparency)?;

    let (fw, fh) = fitted_size(foreground.width(), foreground.height(), &roi);
    let fitted = convert_channels(&foreground.resize(fw, fh)?, background.channels())?;
    blend_into(background, &roi, &fitted, transparency, filter);
    Ok(())
}
