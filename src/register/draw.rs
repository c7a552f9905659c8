//! Raster helpers for registration visualisations (BGR output).

use super::matcher::DMatch;
use crate::features::Keypoint;
use crate::image::convert::convert_channels;
use crate::image::{Image, Plane};
use crate::util::math::round_i32;
use crate::util::{MoonRegError, MoonRegResult};

/// Match colours (BGR), cycled by match index.
const PALETTE: [[u8; 3]; 8] = [
    [0, 255, 0],
    [255, 0, 0],
    [0, 0, 255],
    [0, 255, 255],
    [255, 0, 255],
    [255, 255, 0],
    [0, 128, 255],
    [255, 128, 0],
];

/// Merges up to three gray planes into a BGR image; missing planes are black.
pub fn merge_bgr(
    blue: Option<&Plane<u8>>,
    green: Option<&Plane<u8>>,
    red: Option<&Plane<u8>>,
) -> MoonRegResult<Image> {
    let planes = [blue, green, red];
    let Some(first) = planes.iter().flatten().next() else {
        return Err(MoonRegError::InvalidInput("no planes to merge"));
    };
    let (w, h) = (first.width(), first.height());
    if planes.iter().flatten().any(|p| p.width() != w || p.height() != h) {
        return Err(MoonRegError::InvalidInput("merged planes differ in size"));
    }
    let mut data = vec![0u8; w * h * 3];
    for (c, plane) in planes.iter().enumerate() {
        if let Some(plane) = plane {
            for (px, &v) in data.chunks_exact_mut(3).zip(plane.data()) {
                px[c] = v;
            }
        }
    }
    Image::new(data, w, h, 3)
}

fn put(image: &mut Image, x: i32, y: i32, color: [u8; 3]) {
    if x < 0 || y < 0 || x as usize >= image.width() || y as usize >= image.height() {
        return;
    }
    image.pixel_mut(x as usize, y as usize)[..3].copy_from_slice(&color);
}

/// Bresenham line, clipped per pixel.
pub fn draw_line(image: &mut Image, from: (i32, i32), to: (i32, i32), color: [u8; 3]) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put(image, x, y, color);
        if (x, y) == to {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Midpoint circle outline.
pub fn draw_circle(image: &mut Image, center: (i32, i32), radius: i32, color: [u8; 3]) {
    let (cx, cy) = center;
    let (mut x, mut y) = (radius.max(0), 0);
    let mut err = 1 - x;
    while x >= y {
        for (px, py) in [
            (x, y),
            (y, x),
            (-y, x),
            (-x, y),
            (-x, -y),
            (-y, -x),
            (y, -x),
            (x, -y),
        ] {
            put(image, cx + px, cy + py, color);
        }
        y += 1;
        if err < 0 {
            err += 2 * y + 1;
        } else {
            x -= 1;
            err += 2 * (y - x) + 1;
        }
    }
}

/// User and model side by side (BGR) with a circle at each matched keypoint
/// and a line joining the pair. Unmatched keypoints are not drawn.
pub fn draw_matches(
    user: &Image,
    user_keypoints: &[Keypoint],
    model: &Image,
    model_keypoints: &[Keypoint],
    matches: &[DMatch],
) -> MoonRegResult<Image> {
    let left = convert_channels(user, 3)?;
    let right = convert_channels(model, 3)?;
    let width = left.width() + right.width();
    let height = left.height().max(right.height());
    let mut canvas = Image::zeros(width, height, 3)?;
    for (src, x0) in [(&left, 0usize), (&right, left.width())] {
        let row_len = src.width() * 3;
        for y in 0..src.height() {
            let dst_start = (y * width + x0) * 3;
            canvas.data_mut()[dst_start..dst_start + row_len]
                .copy_from_slice(&src.data()[y * row_len..(y + 1) * row_len]);
        }
    }

    let offset = left.width() as i32;
    for (i, m) in matches.iter().enumerate() {
        let (Some(u), Some(v)) = (user_keypoints.get(m.query_idx), model_keypoints.get(m.train_idx)) else {
            continue;
        };
        let color = PALETTE[i % PALETTE.len()];
        let a = (round_i32(u.x), round_i32(u.y));
        let b = (round_i32(v.x) + offset, round_i32(v.y));
        draw_circle(&mut canvas, a, 4, color);
        draw_circle(&mut canvas, b, 4, color);
        draw_line(&mut canvas, a, b, color);
    }
    Ok(canvas)
}

/// Appends an alpha channel that is opaque wherever the gray value is
/// non-zero. Images that already carry alpha are returned as is.
pub fn with_nonzero_alpha(image: &Image) -> MoonRegResult<Image> {
    if image.channels() == 4 {
        return Ok(image.clone());
    }
    let gray = image.to_gray();
    let mut out = convert_channels(image, 4)?;
    for (px, &g) in out.data_mut().chunks_exact_mut(4).zip(gray.data()) {
        px[3] = if g > 0 { 255 } else { 0 };
    }
    Ok(out)
}
