//! Frame preprocessing used ahead of circle detection.

use crate::image::{Image, Plane};
use crate::shapes::Circle;
use crate::util::math::saturate_u8;
use crate::util::MoonRegResult;

/// Frame dimensions together with the longer/shorter side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageShape {
    pub width: usize,
    pub height: usize,
    pub longer_side: usize,
    pub shorter_side: usize,
}

impl ImageShape {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            longer_side: width.max(height),
            shorter_side: width.min(height),
        }
    }

    pub fn of_plane<T: Copy>(plane: &Plane<T>) -> Self {
        Self::new(plane.width(), plane.height())
    }
}

/// Shrinks `image` so its longer side is at most `longer_side`.
///
/// Returns the resized copy and the applied ratio (`1.0` when the image is
/// already small enough).
pub fn resize_with_aspect_ratio(image: &Image, longer_side: usize) -> MoonRegResult<(Image, f32)> {
    let (w, h) = image.size();
    let shape = ImageShape::new(w, h);
    if longer_side == 0 || shape.longer_side <= longer_side {
        return Ok((image.clone(), 1.0));
    }
    let ratio = longer_side as f32 / shape.longer_side as f32;
    let (dst_w, dst_h) = if w >= h {
        (longer_side, ((h as f32 * ratio) as usize).max(1))
    } else {
        (((w as f32 * ratio) as usize).max(1), longer_side)
    };
    Ok((image.resize(dst_w, dst_h)?, ratio))
}

/// Brightness shift in `[-255, 255]` followed by a contrast stretch in
/// `[-127, 127]` around mid-gray.
pub fn apply_brightness_contrast(src: &Plane<u8>, brightness: i32, contrast: i32) -> Plane<u8> {
    let mut out = src.clone();
    if brightness != 0 {
        let (shadow, highlight) = if brightness > 0 {
            (brightness, 255)
        } else {
            (0, 255 + brightness)
        };
        let alpha = (highlight - shadow) as f32 / 255.0;
        let gamma = shadow as f32;
        out = out.map(|v| saturate_u8(alpha * f32::from(v) + gamma));
    }
    if contrast != 0 {
        let contrast = contrast as f64;
        let f = 131.0 * (contrast + 127.0) / (127.0 * (131.0 - contrast));
        let gamma = 127.0 * (1.0 - f);
        out = out.map(|v| saturate_u8((f * f64::from(v) + gamma) as f32));
    }
    out
}

/// Sets pixels above `threshold` to 255 and all others to 0.
pub fn binarize(src: &Plane<u8>, threshold: u8) -> Plane<u8> {
    src.map(|v| if v > threshold { 255 } else { 0 })
}

/// Mean brightness of the plane in `[0, 1]`.
pub fn image_brightness_perc(src: &Plane<u8>) -> f32 {
    if src.is_empty() {
        return 0.0;
    }
    let sum: u64 = src.data().iter().map(|&v| u64::from(v)).sum();
    (sum as f64 / 255.0 / src.data().len() as f64) as f32
}

/// Brightness inside `circle`, normalised by the whole frame area.
///
/// A circle covering every bright pixel scores the same as the frame mean,
/// so the value measures how much of the frame's light the circle holds.
pub fn circle_brightness_perc(src: &Plane<u8>, circle: &Circle) -> f32 {
    if src.is_empty() || circle.radius <= 0 {
        return 0.0;
    }
    let (w, h) = (src.width() as i64, src.height() as i64);
    let (cx, cy, r) = (i64::from(circle.x), i64::from(circle.y), i64::from(circle.radius));
    let r2 = r * r;
    let mut sum = 0u64;
    for y in (cy - r).max(0)..(cy + r + 1).min(h) {
        let dy = y - cy;
        let row = src.row(y as usize);
        for x in (cx - r).max(0)..(cx + r + 1).min(w) {
            let dx = x - cx;
            if dx * dx + dy * dy <= r2 {
                sum += u64::from(row[x as usize]);
            }
        }
    }
    (sum as f64 / 255.0 / (w * h) as f64) as f32
}

/// Gray level the maximum contrast stretch splits at: values from here up
/// end above zero.
const CONTRAST_SPLIT: f32 = 126.0;
/// Position of the binarisation level between the background and the bright
/// level of a frame.
pub const LEVEL_FRACTION: f32 = 0.2;
/// Frames whose bright level exceeds the background by less than this keep
/// the fixed mid-gray split.
pub const MIN_LEVEL_SPREAD: u8 = 32;

/// Gray level below which `fraction` of the pixels lie.
fn percentile(hist: &[u64; 256], total: u64, fraction: f64) -> u8 {
    let target = (total as f64 * fraction).floor() as u64;
    let mut seen = 0u64;
    for (level, &count) in hist.iter().enumerate() {
        seen += count;
        if seen > target {
            return level as u8;
        }
    }
    255
}

/// Background (5th percentile) and bright (99.9th percentile) gray levels.
pub fn frame_levels(gray: &Plane<u8>) -> (u8, u8) {
    let mut hist = [0u64; 256];
    for &v in gray.data() {
        hist[usize::from(v)] += 1;
    }
    let total = gray.data().len() as u64;
    if total == 0 {
        return (0, 0);
    }
    (percentile(&hist, total, 0.05), percentile(&hist, total, 0.999))
}

/// Brightness shift that moves the split of the maximum contrast stretch to
/// gray level `level`.
fn brightness_for_level(level: f32) -> i32 {
    let level = level.clamp(1.0, 254.0);
    let shift = if level < CONTRAST_SPLIT {
        (CONTRAST_SPLIT - level) / (1.0 - level / 255.0)
    } else {
        CONTRAST_SPLIT * 255.0 / level - 255.0
    };
    (shift.round() as i32).clamp(-255, 255)
}

/// Brightness for [`moon_preprocess`]: puts the binarisation level
/// [`LEVEL_FRACTION`] of the way from the background to the bright level,
/// so a limb-darkened rim or dark maria stay inside the disc. Low-contrast
/// frames get 0.
pub fn auto_brightness(gray: &Plane<u8>) -> i32 {
    let (background, bright) = frame_levels(gray);
    if bright.saturating_sub(background) < MIN_LEVEL_SPREAD {
        return 0;
    }
    let level = f32::from(background) + LEVEL_FRACTION * f32::from(bright - background);
    brightness_for_level(level)
}

/// Default detector preprocessing: cap the longer side at 500 px, convert to
/// gray, shift brightness with [`auto_brightness`], push contrast to the
/// maximum and binarise.
///
/// Returns the binary frame and the resize ratio applied to the input.
pub fn moon_preprocess(image: &Image) -> MoonRegResult<(Plane<u8>, f32)> {
    let (resized, ratio) = resize_with_aspect_ratio(image, 500)?;
    let gray = resized.to_gray();
    let stretched = apply_brightness_contrast(&gray, auto_brightness(&gray), 127);
    Ok((binarize(&stretched, 0), ratio))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_caps_longer_side() {
        let img = Image::zeros(1000, 400, 3).unwrap();
        let (out, ratio) = resize_with_aspect_ratio(&img, 500).unwrap();
        assert_eq!(out.size(), (500, 200));
        assert!((ratio - 0.5).abs() < 1e-6);

        let small = Image::zeros(300, 200, 1).unwrap();
        let (same, ratio) = resize_with_aspect_ratio(&small, 500).unwrap();
        assert_eq!(same.size(), (300, 200));
        assert_eq!(ratio, 1.0);
    }

    #[test]
    fn max_contrast_splits_at_mid_gray() {
        let plane = Plane::from_vec(vec![0, 100, 125, 126, 127, 255], 6, 1).unwrap();
        let out = binarize(&apply_brightness_contrast(&plane, 0, 127), 0);
        assert_eq!(out.data(), &[0, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn positive_brightness_lifts_shadows() {
        let plane = Plane::from_vec(vec![0, 255], 2, 1).unwrap();
        let out = apply_brightness_contrast(&plane, 50, 0);
        assert_eq!(out.data(), &[50, 255]);
    }

    /// 100x100 frame: 60% background at 3, 20% dim rim at 90, 20% at 220.
    fn rim_frame() -> Plane<u8> {
        let mut data = vec![3u8; 6000];
        data.extend(std::iter::repeat(90u8).take(2000));
        data.extend(std::iter::repeat(220u8).take(2000));
        Plane::from_vec(data, 100, 100).unwrap()
    }

    #[test]
    fn frame_levels_ignore_the_extremes() {
        assert_eq!(frame_levels(&rim_frame()), (3, 220));
        assert_eq!(frame_levels(&Plane::new(4, 4, 77u8)), (77, 77));
    }

    #[test]
    fn dim_rim_survives_binarisation() {
        let img = Image::from_plane(rim_frame()).unwrap();
        let (binary, ratio) = moon_preprocess(&img).unwrap();
        assert_eq!(ratio, 1.0);
        assert_eq!(binary.get(0, 0), 0);
        assert_eq!(binary.get(0, 60), 255);
        assert_eq!(binary.get(0, 99), 255);
    }

    #[test]
    fn low_contrast_frames_keep_the_mid_gray_split() {
        let mut plane = Plane::new(10, 10, 100u8);
        plane.set(5, 5, 120);
        assert_eq!(auto_brightness(&plane), 0);
        assert_eq!(auto_brightness(&Plane::new(10, 10, 0u8)), 0);
    }

    #[test]
    fn bright_backgrounds_shift_the_split_upwards() {
        let mut data = vec![150u8; 9000];
        data.extend(std::iter::repeat(250u8).take(1000));
        let plane = Plane::from_vec(data, 100, 100).unwrap();
        assert!(auto_brightness(&plane) < 0);
        let binary = moon_preprocess(&Image::from_plane(plane).unwrap()).unwrap().0;
        assert_eq!(binary.get(0, 0), 0);
        assert_eq!(binary.get(0, 95), 255);
    }

    #[test]
    fn circle_brightness_uses_frame_area() {
        let plane = Plane::new(10, 10, 255u8);
        let full = circle_brightness_perc(&plane, &Circle::new(5, 5, 20));
        assert!((full - 1.0).abs() < 1e-6);
        assert!((image_brightness_perc(&plane) - 1.0).abs() < 1e-6);
        let single = circle_brightness_perc(&plane, &Circle::new(0, 0, 1));
        assert!((single - 0.03).abs() < 1e-6);
    }
}
