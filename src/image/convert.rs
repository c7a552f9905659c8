//! Colour conversions between gray, BGR and BGRA.
//!
//! Gray uses BT.601 luma in 14-bit fixed point:
//! `Y = (1868 B + 9617 G + 4899 R + 8192) >> 14`.

use crate::image::{check_channels, Image, Plane};
use crate::util::MoonRegResult;

const B_WEIGHT: u32 = 1868;
const G_WEIGHT: u32 = 9617;
const R_WEIGHT: u32 = 4899;

#[inline]
fn luma(b: u8, g: u8, r: u8) -> u8 {
    let sum = B_WEIGHT * u32::from(b) + G_WEIGHT * u32::from(g) + R_WEIGHT * u32::from(r);
    ((sum + (1 << 13)) >> 14) as u8
}

/// Converts any supported image to a gray plane.
pub fn to_gray(image: &Image) -> Plane<u8> {
    let (width, height) = image.size();
    let channels = image.channels();
    let data: Vec<u8> = match channels {
        1 => image.data().to_vec(),
        _ => image
            .data()
            .chunks_exact(channels)
            .map(|px| luma(px[0], px[1], px[2]))
            .collect(),
    };
    Plane::from_raw(data, width, height)
}

/// Converts between gray, BGR and BGRA.
///
/// Gray is replicated to every colour channel; a synthesised alpha is 255;
/// dropping to gray uses BT.601 luma.
pub fn convert_channels(image: &Image, channels: usize) -> MoonRegResult<Image> {
    check_channels(channels)?;
    let src_channels = image.channels();
    if src_channels == channels {
        return Ok(image.clone());
    }
    let (width, height) = image.size();
    if channels == 1 {
        return Image::new(to_gray(image).into_vec(), width, height, 1);
    }

    let mut out = Vec::with_capacity(width * height * channels);
    for px in image.data().chunks_exact(src_channels) {
        let (b, g, r) = if src_channels == 1 {
            (px[0], px[0], px[0])
        } else {
            (px[0], px[1], px[2])
        };
        out.extend_from_slice(&[b, g, r]);
        if channels == 4 {
            out.push(if src_channels == 4 { px[3] } else { 255 });
        }
    }
    Image::new(out, width, height, channels)
}

/// Places a gray plane into one channel of a black BGR image.
pub fn gray_to_channel(gray: &Plane<u8>, channel: usize) -> MoonRegResult<Image> {
    let mut out = vec![0u8; gray.width() * gray.height() * 3];
    for (dst, &v) in out.chunks_exact_mut(3).zip(gray.data()) {
        dst[channel.min(2)] = v;
    }
    Image::new(out, gray.width(), gray.height(), 3)
}
