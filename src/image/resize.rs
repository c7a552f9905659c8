//! Bilinear resizing with half-pixel centres.
//!
//! Strong shrinks are first reduced with 2x2 box steps so bilinear sampling
//! does not alias.

use crate::image::pyramid::{downsample_2x2_f32, downsample_2x2_u8};
use crate::image::{Image, Plane};
use crate::util::math::saturate_u8;
use crate::util::{MoonRegError, MoonRegResult};

#[derive(Clone, Copy)]
struct Tap {
    i0: usize,
    i1: usize,
    w1: f32,
}

fn taps(src_len: usize, dst_len: usize) -> Vec<Tap> {
    let scale = src_len as f32 / dst_len as f32;
    (0..dst_len)
        .map(|d| {
            let s = ((d as f32 + 0.5) * scale - 0.5).clamp(0.0, (src_len - 1) as f32);
            let i0 = s.floor() as usize;
            let i1 = (i0 + 1).min(src_len - 1);
            Tap {
                i0,
                i1,
                w1: s - i0 as f32,
            }
        })
        .collect()
}

fn resize_interleaved(
    src: &[u8],
    src_width: usize,
    src_height: usize,
    channels: usize,
    dst_width: usize,
    dst_height: usize,
) -> Vec<u8> {
    let xs = taps(src_width, dst_width);
    let ys = taps(src_height, dst_height);
    let mut out = Vec::with_capacity(dst_width * dst_height * channels);
    for ty in &ys {
        let row0 = &src[ty.i0 * src_width * channels..(ty.i0 + 1) * src_width * channels];
        let row1 = &src[ty.i1 * src_width * channels..(ty.i1 + 1) * src_width * channels];
        for tx in &xs {
            for c in 0..channels {
                let a = f32::from(row0[tx.i0 * channels + c]);
                let b = f32::from(row0[tx.i1 * channels + c]);
                let d = f32::from(row1[tx.i0 * channels + c]);
                let e = f32::from(row1[tx.i1 * channels + c]);
                let top = a + (b - a) * tx.w1;
                let bottom = d + (e - d) * tx.w1;
                out.push(saturate_u8(top + (bottom - top) * ty.w1));
            }
        }
    }
    out
}

/// Resizes an interleaved image to `width x height`.
pub fn resize_image(image: &Image, width: usize, height: usize) -> MoonRegResult<Image> {
    if width == 0 || height == 0 {
        return Err(MoonRegError::InvalidDimensions { width, height });
    }
    if image.size() == (width, height) {
        return Ok(image.clone());
    }
    let channels = image.channels();
    if channels == 1 {
        let plane = Plane::from_raw(image.data().to_vec(), image.width(), image.height());
        return Image::from_plane(resize_plane_u8(&plane, width, height));
    }
    let data = resize_interleaved(
        image.data(),
        image.width(),
        image.height(),
        channels,
        width,
        height,
    );
    Image::new(data, width, height, channels)
}

/// Resizes a byte plane.
pub fn resize_plane_u8(src: &Plane<u8>, width: usize, height: usize) -> Plane<u8> {
    let mut current = src.clone();
    while current.width() >= 2 * width && current.height() >= 2 * height {
        match downsample_2x2_u8(&current) {
            Some(next) => current = next,
            None => break,
        }
    }
    let data = resize_interleaved(
        current.data(),
        current.width(),
        current.height(),
        1,
        width,
        height,
    );
    Plane::from_raw(data, width, height)
}

/// Resizes a float plane.
pub fn resize_plane_f32(src: &Plane<f32>, width: usize, height: usize) -> Plane<f32> {
    let mut current = src.clone();
    while current.width() >= 2 * width && current.height() >= 2 * height {
        match downsample_2x2_f32(&current) {
            Some(next) => current = next,
            None => break,
        }
    }
    let xs = taps(current.width(), width);
    let ys = taps(current.height(), height);
    let mut out = Vec::with_capacity(width * height);
    for ty in &ys {
        let row0 = current.row(ty.i0);
        let row1 = current.row(ty.i1);
        for tx in &xs {
            let top = row0[tx.i0] + (row0[tx.i1] - row0[tx.i0]) * tx.w1;
            let bottom = row1[tx.i0] + (row1[tx.i1] - row1[tx.i0]) * tx.w1;
            out.push(top + (bottom - top) * ty.w1);
        }
    }
    Plane::from_raw(out, width, height)
}
