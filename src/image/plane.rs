//! Single-channel contiguous buffers used by the detectors.

use crate::util::{MoonRegError, MoonRegResult};

/// Owned single-channel image with `stride == width`.
#[derive(Clone, Debug, PartialEq)]
pub struct Plane<T> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Copy> Plane<T> {
    /// Allocates a plane filled with `value`.
    pub fn new(width: usize, height: usize, value: T) -> Self {
        Self {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    /// Wraps a buffer whose length must equal `width * height`.
    pub fn from_vec(data: Vec<T>, width: usize, height: usize) -> MoonRegResult<Self> {
        let needed = width
            .checked_mul(height)
            .ok_or(MoonRegError::InvalidDimensions { width, height })?;
        if data.len() != needed {
            return Err(MoonRegError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Wraps a buffer already known to hold `width * height` samples.
    pub(crate) fn from_raw(data: Vec<T>, width: usize, height: usize) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            data,
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.data[y * self.width + x] = value;
    }

    /// Reads with coordinates clamped to the border (replicate).
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> T {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[cy * self.width + cx]
    }

    /// Returns `Some` only when `(x, y)` is inside the plane.
    #[inline]
    pub fn try_get(&self, x: isize, y: isize) -> Option<T> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        Some(self.data[y as usize * self.width + x as usize])
    }

    pub fn row(&self, y: usize) -> &[T] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// Applies `f` to every sample.
    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Plane<U> {
        Plane {
            data: self.data.iter().map(|&v| f(v)).collect(),
            width: self.width,
            height: self.height,
        }
    }

    /// Copies the `width x height` block starting at `(x, y)`.
    pub fn sub_plane(&self, x: usize, y: usize, width: usize, height: usize) -> Plane<T> {
        let mut data = Vec::with_capacity(width * height);
        for row in y..y + height {
            data.extend_from_slice(&self.row(row)[x..x + width]);
        }
        Plane {
            data,
            width,
            height,
        }
    }
}

impl Plane<u8> {
    /// Converts to floats scaled by `scale`.
    pub fn to_f32(&self, scale: f32) -> Plane<f32> {
        self.map(|v| f32::from(v) * scale)
    }
}

impl Plane<f32> {
    /// Bilinear sample with border replication.
    pub fn sample_bilinear(&self, x: f32, y: f32) -> f32 {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;
        let top = self.get(x0, y0) * (1.0 - fx) + self.get(x1, y0) * fx;
        let bottom = self.get(x0, y1) * (1.0 - fx) + self.get(x1, y1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Rounds and saturates into a byte plane.
    pub fn to_u8(&self) -> Plane<u8> {
        self.map(crate::util::math::saturate_u8)
    }
}

#[cfg(test)]
mod tests {
    use super::Plane;

    #[test]
    fn bilinear_interpolates_between_samples() {
        let plane = Plane::from_vec(vec![0.0, 10.0, 20.0, 30.0], 2, 2).unwrap();
        assert!((plane.sample_bilinear(0.5, 0.0) - 5.0).abs() < 1e-6);
        assert!((plane.sample_bilinear(0.5, 0.5) - 15.0).abs() < 1e-6);
        assert!((plane.sample_bilinear(-3.0, 9.0) - 20.0).abs() < 1e-6);
    }

    #[test]
    fn sub_plane_copies_block() {
        let plane = Plane::from_vec((0u8..12).collect(), 4, 3).unwrap();
        let sub = plane.sub_plane(1, 1, 2, 2);
        assert_eq!(sub.data(), &[5, 6, 9, 10]);
    }
}
