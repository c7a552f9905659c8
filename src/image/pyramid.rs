//! Octave pyramids built by 2x2 box downsampling.
//!
//! Byte planes round as `dst = ((a + b + c + d) + 2) / 4`; float planes take
//! the plain mean. Odd trailing rows and columns are dropped.

use crate::image::Plane;

/// Halves a byte plane, or returns `None` once a side drops below 2.
pub fn downsample_2x2_u8(src: &Plane<u8>) -> Option<Plane<u8>> {
    if src.width() < 2 || src.height() < 2 {
        return None;
    }
    let dst_width = src.width() / 2;
    let dst_height = src.height() / 2;
    let mut dst = Vec::with_capacity(dst_width * dst_height);
    for y in 0..dst_height {
        let row0 = src.row(2 * y);
        let row1 = src.row(2 * y + 1);
        for x in 0..dst_width {
            let sum = u16::from(row0[2 * x])
                + u16::from(row0[2 * x + 1])
                + u16::from(row1[2 * x])
                + u16::from(row1[2 * x + 1]);
            dst.push(((sum + 2) / 4) as u8);
        }
    }
    Some(Plane::from_raw(dst, dst_width, dst_height))
}

/// Halves a float plane by averaging 2x2 blocks.
pub fn downsample_2x2_f32(src: &Plane<f32>) -> Option<Plane<f32>> {
    if src.width() < 2 || src.height() < 2 {
        return None;
    }
    let dst_width = src.width() / 2;
    let dst_height = src.height() / 2;
    let mut dst = Vec::with_capacity(dst_width * dst_height);
    for y in 0..dst_height {
        let row0 = src.row(2 * y);
        let row1 = src.row(2 * y + 1);
        for x in 0..dst_width {
            dst.push(0.25 * (row0[2 * x] + row0[2 * x + 1] + row1[2 * x] + row1[2 * x + 1]));
        }
    }
    Some(Plane::from_raw(dst, dst_width, dst_height))
}

/// Takes every second sample; used between blurred scale-space octaves.
pub fn decimate_2x_f32(src: &Plane<f32>) -> Option<Plane<f32>> {
    if src.width() < 2 || src.height() < 2 {
        return None;
    }
    let dst_width = src.width() / 2;
    let dst_height = src.height() / 2;
    let mut dst = Vec::with_capacity(dst_width * dst_height);
    for y in 0..dst_height {
        let row = src.row(2 * y);
        dst.extend((0..dst_width).map(|x| row[2 * x]));
    }
    Some(Plane::from_raw(dst, dst_width, dst_height))
}

/// Owned byte pyramid; level 0 is the base resolution.
pub struct ImagePyramid {
    levels: Vec<Plane<u8>>,
}

impl ImagePyramid {
    /// Builds up to `max_levels` levels (at least the base).
    pub fn build_u8(base: &Plane<u8>, max_levels: usize) -> Self {
        let max_levels = max_levels.max(1);
        let mut levels = vec![base.clone()];
        while levels.len() < max_levels {
            let Some(next) = levels.last().and_then(downsample_2x2_u8) else {
                break;
            };
            levels.push(next);
        }
        Self { levels }
    }

    /// Returns all levels.
    pub fn levels(&self) -> &[Plane<u8>] {
        &self.levels
    }

    /// Returns a specific level.
    pub fn level(&self, index: usize) -> Option<&Plane<u8>> {
        self.levels.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pyramid_halves_and_rounds() {
        let base = Plane::from_vec(vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15], 4, 4)
            .unwrap();
        let pyramid = ImagePyramid::build_u8(&base, 5);
        assert_eq!(pyramid.levels().len(), 3);
        let l1 = pyramid.level(1).unwrap();
        assert_eq!(l1.data(), &[3, 5, 11, 13]);
        assert_eq!(pyramid.level(2).unwrap().data(), &[8]);
    }

    #[test]
    fn decimate_keeps_even_samples() {
        let base = Plane::from_vec((0..16).map(|v| v as f32).collect(), 4, 4).unwrap();
        let half = decimate_2x_f32(&base).unwrap();
        assert_eq!(half.data(), &[0.0, 2.0, 8.0, 10.0]);
    }
}
