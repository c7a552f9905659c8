//! Separable smoothing, Sobel gradients and integral images.
//!
//! Blurs use reflect-101 borders (`gfedcb|abcdefgh|gfedcba`), gradients use
//! replicated borders.

use crate::image::Plane;

/// Maps `i` into `[0, n)` with reflect-101 borders.
#[inline]
pub(crate) fn reflect101(mut i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Normalised 1D Gaussian kernel with radius `ceil(3 sigma)`.
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let sigma = sigma.max(0.1);
    let radius = (3.0 * sigma).ceil().max(1.0) as isize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// Convolves rows then columns with the same symmetric kernel.
pub fn separable_filter(src: &Plane<f32>, kernel: &[f32]) -> Plane<f32> {
    let (width, height) = (src.width(), src.height());
    if src.is_empty() {
        return src.clone();
    }
    let radius = (kernel.len() / 2) as isize;

    let mut tmp = vec![0.0f32; width * height];
    for y in 0..height {
        let row = src.row(y);
        for x in 0..width {
            let mut acc = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let sx = reflect101(x as isize + k as isize - radius, width);
                acc += row[sx] * w;
            }
            tmp[y * width + x] = acc;
        }
    }

    let mut out = vec![0.0f32; width * height];
    for y in 0..height {
        for (k, &w) in kernel.iter().enumerate() {
            let sy = reflect101(y as isize + k as isize - radius, height);
            let src_row = &tmp[sy * width..(sy + 1) * width];
            let dst_row = &mut out[y * width..(y + 1) * width];
            for (d, &s) in dst_row.iter_mut().zip(src_row) {
                *d += s * w;
            }
        }
    }
    Plane::from_raw(out, width, height)
}

/// Gaussian blur of a float plane.
pub fn gaussian_blur(src: &Plane<f32>, sigma: f32) -> Plane<f32> {
    separable_filter(src, &gaussian_kernel(sigma))
}

/// Gaussian blur of a byte plane, rounded back to bytes.
pub fn gaussian_blur_u8(src: &Plane<u8>, sigma: f32) -> Plane<u8> {
    gaussian_blur(&src.to_f32(1.0), sigma).to_u8()
}

/// 3x3 Sobel derivatives `(dx, dy)` with replicated borders.
pub fn sobel(src: &Plane<f32>) -> (Plane<f32>, Plane<f32>) {
    let (width, height) = (src.width(), src.height());
    let mut dx = Plane::new(width, height, 0.0f32);
    let mut dy = Plane::new(width, height, 0.0f32);
    for y in 0..height as isize {
        for x in 0..width as isize {
            let p = |ox: isize, oy: isize| src.get_clamped(x + ox, y + oy);
            let gx = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
            let gy = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
            dx.set(x as usize, y as usize, gx);
            dy.set(x as usize, y as usize, gy);
        }
    }
    (dx, dy)
}

/// Summed-area table with one extra leading row and column.
#[derive(Clone, Debug)]
pub struct IntegralImage {
    sums: Vec<f64>,
    width: usize,
    height: usize,
}

impl IntegralImage {
    pub fn new(src: &Plane<f32>) -> Self {
        let (width, height) = (src.width(), src.height());
        let stride = width + 1;
        let mut sums = vec![0.0f64; stride * (height + 1)];
        for y in 0..height {
            let mut row_sum = 0.0f64;
            for x in 0..width {
                row_sum += f64::from(src.get(x, y));
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row_sum;
            }
        }
        Self {
            sums,
            width,
            height,
        }
    }

    /// Mean over the box `[x0, x1) x [y0, y1)` after clamping to the image.
    pub fn box_mean(&self, x0: isize, y0: isize, x1: isize, y1: isize) -> f32 {
        let cx0 = x0.clamp(0, self.width as isize) as usize;
        let cy0 = y0.clamp(0, self.height as isize) as usize;
        let cx1 = x1.clamp(0, self.width as isize) as usize;
        let cy1 = y1.clamp(0, self.height as isize) as usize;
        if cx1 <= cx0 || cy1 <= cy0 {
            return 0.0;
        }
        let stride = self.width + 1;
        let s = self.sums[cy1 * stride + cx1] - self.sums[cy0 * stride + cx1]
            - self.sums[cy1 * stride + cx0]
            + self.sums[cy0 * stride + cx0];
        (s / ((cx1 - cx0) * (cy1 - cy0)) as f64) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect101_mirrors_without_repeating_edge() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(2, 5), 2);
        assert_eq!(reflect101(-7, 1), 0);
    }

    #[test]
    fn gaussian_kernel_sums_to_one() {
        let k = gaussian_kernel(1.6);
        assert_eq!(k.len(), 11);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn blur_preserves_constant_plane() {
        let plane = Plane::new(9, 7, 42.0f32);
        let blurred = gaussian_blur(&plane, 2.0);
        assert!(blurred.data().iter().all(|&v| (v - 42.0).abs() < 1e-3));
    }

    #[test]
    fn sobel_of_horizontal_ramp() {
        let data: Vec<f32> = (0..25).map(|i| (i % 5) as f32).collect();
        let plane = Plane::from_vec(data, 5, 5).unwrap();
        let (dx, dy) = sobel(&plane);
        assert!((dx.get(2, 2) - 8.0).abs() < 1e-6);
        assert!(dy.get(2, 2).abs() < 1e-6);
    }

    #[test]
    fn integral_box_mean() {
        let plane = Plane::from_vec((0..16).map(|v| v as f32).collect(), 4, 4).unwrap();
        let ii = IntegralImage::new(&plane);
        assert!((ii.box_mean(1, 1, 3, 3) - 7.5).abs() < 1e-6);
        assert!((ii.box_mean(-5, -5, 1, 1) - 0.0).abs() < 1e-6);
    }
}
