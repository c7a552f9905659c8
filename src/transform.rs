//! Perspective warping with bilinear sampling.
//!
//! Output pixels sample the input at the mapped source coordinate; taps that
//! fall outside the input read as zero (transparent for BGRA).

use crate::homography::Homography;
use crate::image::Image;
use crate::trace::trace_span;
use crate::util::MoonRegResult;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// How a homography relates the input frame to the output frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WarpDirection {
    /// The homography maps input coordinates to output coordinates.
    #[default]
    Forward,
    /// The homography maps output coordinates to input coordinates.
    Inverse,
}

/// Warps `image` into a frame of `out_size = (width, height)`.
///
/// Fails with `TransformError` when the homography is singular.
pub fn transform_image(
    image: &Image,
    homography: &Homography,
    direction: WarpDirection,
    out_size: (usize, usize),
) -> MoonRegResult<Image> {
    let sampling_map = match direction {
        WarpDirection::Forward => homography.inverse()?,
        WarpDirection::Inverse => {
            // Still reject singular input so both directions fail alike.
            homography.inverse()?;
            *homography
        }
    };
    warp_perspective(image, &sampling_map, out_size, cfg!(feature = "rayon"))
}

/// Warps with the inverse of `homography` without the caller inverting it.
pub fn transform_image_inverse(
    image: &Image,
    homography: &Homography,
    out_size: (usize, usize),
) -> MoonRegResult<Image> {
    transform_image(image, homography, WarpDirection::Inverse, out_size)
}

/// Low-level warp: `dst(p) = src(sampling_map * p)`.
///
/// `parallel` only takes effect with the `rayon` feature; the output is the
/// same either way.
pub fn warp_perspective(
    image: &Image,
    sampling_map: &Homography,
    out_size: (usize, usize),
    parallel: bool,
) -> MoonRegResult<Image> {
    let (width, height) = out_size;
    let _span = trace_span!("warp_perspective", width = width, height = height).entered();
    let mut out = Image::zeros(width, height, image.channels())?;
    let row_len = width * image.channels();
    let m = sampling_map.to_row_major();

    if parallel {
        warp_rows_parallel(image, &m, out.data_mut(), row_len);
    } else {
        for (y, row) in out.data_mut().chunks_mut(row_len).enumerate() {
            warp_row(image, &m, y, row);
        }
    }
    Ok(out)
}

#[cfg(feature = "rayon")]
fn warp_rows_parallel(image: &Image, m: &[f64; 9], data: &mut [u8], row_len: usize) {
    data.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| warp_row(image, m, y, row));
}

#[cfg(not(feature = "rayon"))]
fn warp_rows_parallel(image: &Image, m: &[f64; 9], data: &mut [u8], row_len: usize) {
    for (y, row) in data.chunks_mut(row_len).enumerate() {
        warp_row(image, m, y, row);
    }
}

fn warp_row(image: &Image, m: &[f64; 9], y: usize, row: &mut [u8]) {
    let channels = image.channels();
    let (w, h) = (image.width() as isize, image.height() as isize);
    let data = image.data();
    let yf = y as f64;
    let tap = |x: isize, y: isize, c: usize| -> f32 {
        if x < 0 || y < 0 || x >= w || y >= h {
            0.0
        } else {
            f32::from(data[(y as usize * w as usize + x as usize) * channels + c])
        }
    };

    for (x, px) in row.chunks_mut(channels).enumerate() {
        let xf = x as f64;
        let z = m[6] * xf + m[7] * yf + m[8];
        if z.abs() < 1e-12 {
            continue;
        }
        let sx = (m[0] * xf + m[1] * yf + m[2]) / z;
        let sy = (m[3] * xf + m[4] * yf + m[5]) / z;
        if !sx.is_finite() || !sy.is_finite() || sx <= -1.0 || sy <= -1.0 || sx >= w as f64 || sy >= h as f64 {
            continue;
        }
        let x0 = sx.floor() as isize;
        let y0 = sy.floor() as isize;
        let fx = (sx - x0 as f64) as f32;
        let fy = (sy - y0 as f64) as f32;
        for (c, dst) in px.iter_mut().enumerate() {
            let top = tap(x0, y0, c) * (1.0 - fx) + tap(x0 + 1, y0, c) * fx;
            let bottom = tap(x0, y0 + 1, c) * (1.0 - fx) + tap(x0 + 1, y0 + 1, c) * fx;
            *dst = crate::util::math::saturate_u8(top * (1.0 - fy) + bottom * fy);
        }
    }
}
