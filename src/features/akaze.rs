//! AKAZE-style features on a nonlinear scale space.
//!
//! The scale space is built by explicit Perona-Malik diffusion (the `g2`
//! conductance `1 / (1 + |grad L|^2 / k^2)`), with `k` taken from the 70th
//! percentile of the non-zero gradient magnitudes. Keypoints are maxima of
//! the scale-normalised Hessian determinant; descriptors are M-LDB bit
//! strings comparing mean intensity and rotated gradients between grid cells.

use std::f32::consts::PI;

use nalgebra::{Matrix2, Vector2};

use super::{Descriptors, FeatureDetector, Features, Keypoint, RegistrationAlgorithm};
use crate::image::filter::gaussian_blur;
use crate::image::pyramid::downsample_2x2_f32;
use crate::image::Plane;
use crate::util::math::wrap_deg;

/// 486 comparison bits packed into bytes.
pub const DESCRIPTOR_BYTES: usize = 61;
const GRIDS: [usize; 3] = [2, 3, 4];
const CELL_SAMPLES: usize = 4;
const MAX_TAU: f32 = 0.25;
const MIN_OCTAVE_SIDE: usize = 16;
const BORDER: usize = 5;
const FALLBACK_CONTRAST: f32 = 0.03;

/// AKAZE parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Akaze {
    /// Keep at most this many keypoints by response; `0` keeps all.
    pub max_features: usize,
    pub octaves: usize,
    pub sublevels: usize,
    pub base_sigma: f32,
    /// Minimum scale-normalised Hessian determinant.
    pub threshold: f32,
    pub contrast_percentile: f32,
    /// Half-width of the descriptor pattern in units of the level sigma.
    pub pattern_size: f32,
}

impl Default for Akaze {
    fn default() -> Self {
        Self {
            max_features: 0,
            octaves: 4,
            sublevels: 4,
            base_sigma: 1.6,
            threshold: 0.001,
            contrast_percentile: 0.7,
            pattern_size: 10.0,
        }
    }
}

struct Level {
    octave: usize,
    /// Sigma in the octave's pixel units.
    sigma: f32,
    l: Plane<f32>,
    lx: Plane<f32>,
    ly: Plane<f32>,
    det: Plane<f32>,
}

fn central_gradients(l: &Plane<f32>, step: isize) -> (Plane<f32>, Plane<f32>) {
    let (w, h) = (l.width(), l.height());
    let mut gx = Plane::new(w, h, 0.0f32);
    let mut gy = Plane::new(w, h, 0.0f32);
    let inv = 1.0 / (2 * step) as f32;
    for y in 0..h as isize {
        for x in 0..w as isize {
            gx.set(
                x as usize,
                y as usize,
                (l.get_clamped(x + step, y) - l.get_clamped(x - step, y)) * inv,
            );
            gy.set(
                x as usize,
                y as usize,
                (l.get_clamped(x, y + step) - l.get_clamped(x, y - step)) * inv,
            );
        }
    }
    (gx, gy)
}

/// Percentile of the non-zero gradient magnitudes of `l` smoothed by 1 px.
fn contrast_factor(l: &Plane<f32>, percentile: f32) -> f32 {
    let (gx, gy) = central_gradients(&gaussian_blur(l, 1.0), 1);
    let mut mags: Vec<f32> = gx
        .data()
        .iter()
        .zip(gy.data())
        .map(|(x, y)| (x * x + y * y).sqrt())
        .filter(|m| *m > 1e-6)
        .collect();
    if mags.is_empty() {
        return FALLBACK_CONTRAST;
    }
    mags.sort_by(f32::total_cmp);
    let idx = ((mags.len() - 1) as f32 * percentile.clamp(0.0, 1.0)).round() as usize;
    mags[idx].max(1e-4)
}

fn conductivity(l: &Plane<f32>, k: f32) -> Plane<f32> {
    let (gx, gy) = central_gradients(&gaussian_blur(l, 1.0), 1);
    let inv_k2 = 1.0 / (k * k);
    let data = gx
        .data()
        .iter()
        .zip(gy.data())
        .map(|(x, y)| 1.0 / (1.0 + (x * x + y * y) * inv_k2))
        .collect();
    Plane::from_raw(data, l.width(), l.height())
}

/// One explicit diffusion step with Neumann borders.
fn diffuse_step(l: &Plane<f32>, g: &Plane<f32>, tau: f32) -> Plane<f32> {
    let (w, h) = (l.width(), l.height());
    let mut out = Plane::new(w, h, 0.0f32);
    for y in 0..h {
        for x in 0..w {
            let (c, gc) = (l.get(x, y), g.get(x, y));
            let mut flux = 0.0;
            if x > 0 {
                flux += 0.5 * (gc + g.get(x - 1, y)) * (l.get(x - 1, y) - c);
            }
            if x + 1 < w {
                flux += 0.5 * (gc + g.get(x + 1, y)) * (l.get(x + 1, y) - c);
            }
            if y > 0 {
                flux += 0.5 * (gc + g.get(x, y - 1)) * (l.get(x, y - 1) - c);
            }
            if y + 1 < h {
                flux += 0.5 * (gc + g.get(x, y + 1)) * (l.get(x, y + 1) - c);
            }
            out.set(x, y, c + tau * flux);
        }
    }
    out
}

fn diffuse(mut l: Plane<f32>, k: f32, dt: f32) -> Plane<f32> {
    if dt <= 0.0 {
        return l;
    }
    let g = conductivity(&l, k);
    let steps = (dt / MAX_TAU).ceil().max(1.0) as usize;
    let tau = dt / steps as f32;
    for _ in 0..steps {
        l = diffuse_step(&l, &g, tau);
    }
    l
}

/// Scale-normalised Hessian determinant with derivative step `step`.
fn hessian_response(l: &Plane<f32>, step: isize, sigma: f32) -> Plane<f32> {
    let (w, h) = (l.width(), l.height());
    let norm = sigma.powi(4) / (step * step * step * step) as f32;
    let mut det = Plane::new(w, h, 0.0f32);
    for y in 0..h as isize {
        for x in 0..w as isize {
            let p = |ox: isize, oy: isize| l.get_clamped(x + ox * step, y + oy * step);
            let c = p(0, 0);
            let lxx = p(1, 0) + p(-1, 0) - 2.0 * c;
            let lyy = p(0, 1) + p(0, -1) - 2.0 * c;
            let lxy = (p(1, 1) - p(-1, 1) - p(1, -1) + p(-1, -1)) * 0.25;
            det.set(x as usize, y as usize, (lxx * lyy - lxy * lxy) * norm);
        }
    }
    det
}

impl Akaze {
    fn scale_space(&self, gray: &Plane<u8>) -> Vec<Level> {
        let sub = self.sublevels.max(1);
        let mut l = gaussian_blur(&gray.to_f32(1.0 / 255.0), self.base_sigma);
        let k = contrast_factor(&l, self.contrast_percentile);
        let mut levels: Vec<Level> = Vec::new();
        let mut prev_time = 0.5 * self.base_sigma * self.base_sigma;

        for o in 0..self.octaves.max(1) {
            if o > 0 {
                match downsample_2x2_f32(&l) {
                    Some(next) if next.width().min(next.height()) >= MIN_OCTAVE_SIDE => l = next,
                    _ => break,
                }
            }
            // Times are expressed in this octave's pixel units.
            let unit = 4f32.powi(o as i32);
            for s in 0..sub {
                let sigma_abs = self.base_sigma * 2f32.powf(o as f32 + s as f32 / sub as f32);
                let time = 0.5 * sigma_abs * sigma_abs;
                if !levels.is_empty() {
                    l = diffuse(l, k, (time - prev_time) / unit);
                }
                prev_time = time;

                let sigma = sigma_abs / 2f32.powi(o as i32);
                let step = sigma.round().max(1.0) as isize;
                let (lx, ly) = central_gradients(&l, step);
                let det = hessian_response(&l, step, sigma);
                levels.push(Level {
                    octave: o,
                    sigma,
                    l: l.clone(),
                    lx,
                    ly,
                    det,
                });
            }
        }
        levels
    }

    fn find_extrema(&self, levels: &[Level]) -> Vec<(usize, f32, f32, f32)> {
        let mut found = Vec::new();
        for (i, level) in levels.iter().enumerate() {
            let det = &level.det;
            let (w, h) = (det.width(), det.height());
            if w <= 2 * BORDER || h <= 2 * BORDER {
                continue;
            }
            let below = i
                .checked_sub(1)
                .map(|j| &levels[j])
                .filter(|n| n.octave == level.octave);
            let above = levels.get(i + 1).filter(|n| n.octave == level.octave);
            for y in BORDER..h - BORDER {
                for x in BORDER..w - BORDER {
                    let v = det.get(x, y);
                    if v <= self.threshold || !is_local_max(det, x, y, v) {
                        continue;
                    }
                    if below.is_some_and(|n| window_max(&n.det, x, y) >= v)
                        || above.is_some_and(|n| window_max(&n.det, x, y) > v)
                    {
                        continue;
                    }
                    let (ox, oy) = subpixel_offset(det, x, y);
                    found.push((i, x as f32 + ox, y as f32 + oy, v));
                }
            }
        }
        found
    }
}

fn is_local_max(plane: &Plane<f32>, x: usize, y: usize, v: f32) -> bool {
    for oy in -1..=1isize {
        for ox in -1..=1isize {
            if ox == 0 && oy == 0 {
                continue;
            }
            let n = plane.get((x as isize + ox) as usize, (y as isize + oy) as usize);
            let earlier = oy < 0 || (oy == 0 && ox < 0);
            if (earlier && n >= v) || (!earlier && n > v) {
                return false;
            }
        }
    }
    true
}

fn window_max(plane: &Plane<f32>, x: usize, y: usize) -> f32 {
    let mut m = f32::NEG_INFINITY;
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            m = m.max(plane.get(nx, ny));
        }
    }
    m
}

/// Quadratic fit of the response around a maximum; offsets beyond one
/// pixel are discarded.
fn subpixel_offset(det: &Plane<f32>, x: usize, y: usize) -> (f32, f32) {
    let p = |ox: isize, oy: isize| det.get((x as isize + ox) as usize, (y as isize + oy) as usize);
    let c = p(0, 0);
    let g = Vector2::new((p(1, 0) - p(-1, 0)) * 0.5, (p(0, 1) - p(0, -1)) * 0.5);
    let dxx = p(1, 0) + p(-1, 0) - 2.0 * c;
    let dyy = p(0, 1) + p(0, -1) - 2.0 * c;
    let dxy = (p(1, 1) - p(-1, 1) - p(1, -1) + p(-1, -1)) * 0.25;
    let hess = Matrix2::new(dxx, dxy, dxy, dyy);
    match hess.lu().solve(&(-g)) {
        Some(d) if d[0].abs() <= 1.0 && d[1].abs() <= 1.0 => (d[0], d[1]),
        _ => (0.0, 0.0),
    }
}

/// Dominant orientation (radians) from a sliding pi/3 window over
/// Gaussian-weighted first derivatives.
fn dominant_orientation(level: &Level, x: f32, y: f32) -> f32 {
    let s = level.sigma;
    let mut samples = Vec::with_capacity(113);
    for j in -6..=6i32 {
        for i in -6..=6i32 {
            if i * i + j * j >= 36 {
                continue;
            }
            let (px, py) = (x + i as f32 * s, y + j as f32 * s);
            let weight = (-((i * i + j * j) as f32) / (2.0 * 2.5 * 2.5)).exp();
            let gx = level.lx.sample_bilinear(px, py) * weight;
            let gy = level.ly.sample_bilinear(px, py) * weight;
            samples.push((gy.atan2(gx).rem_euclid(2.0 * PI), gx, gy));
        }
    }

    let (mut best, mut best_angle) = (0.0f32, 0.0f32);
    for k in 0..42 {
        let start = k as f32 * 0.15;
        let end = start + PI / 3.0;
        let (mut sx, mut sy) = (0.0f32, 0.0f32);
        for &(a, gx, gy) in &samples {
            let inside = if end < 2.0 * PI {
                a >= start && a < end
            } else {
                a >= start || a < end - 2.0 * PI
            };
            if inside {
                sx += gx;
                sy += gy;
            }
        }
        let mag = sx * sx + sy * sy;
        if mag > best {
            best = mag;
            best_angle = sy.atan2(sx);
        }
    }
    best_angle
}

/// Grid cell means of intensity and rotated derivatives, then pairwise
/// comparisons for each of the three channels.
fn describe(level: &Level, x: f32, y: f32, angle: f32, pattern_size: f32, out: &mut [u8]) {
    let (sin, cos) = angle.sin_cos();
    let half = pattern_size * level.sigma;
    let mut bit = 0usize;
    out.iter_mut().for_each(|b| *b = 0);

    for n in GRIDS {
        let cell = 2.0 * half / n as f32;
        let mut values: Vec<[f32; 3]> = Vec::with_capacity(n * n);
        for cy in 0..n {
            for cx in 0..n {
                let mut acc = [0.0f32; 3];
                for sy in 0..CELL_SAMPLES {
                    for sx in 0..CELL_SAMPLES {
                        let u = -half + (cx as f32 + (sx as f32 + 0.5) / CELL_SAMPLES as f32) * cell;
                        let v = -half + (cy as f32 + (sy as f32 + 0.5) / CELL_SAMPLES as f32) * cell;
                        let px = x + u * cos - v * sin;
                        let py = y + u * sin + v * cos;
                        let dx = level.lx.sample_bilinear(px, py);
                        let dy = level.ly.sample_bilinear(px, py);
                        acc[0] += level.l.sample_bilinear(px, py);
                        acc[1] += dx * cos + dy * sin;
                        acc[2] += -dx * sin + dy * cos;
                    }
                }
                values.push(acc);
            }
        }
        for a in 0..values.len() {
            for b in a + 1..values.len() {
                for ch in 0..3 {
                    if values[a][ch] > values[b][ch] {
                        out[bit / 8] |= 1 << (bit % 8);
                    }
                    bit += 1;
                }
            }
        }
    }
}

impl FeatureDetector for Akaze {
    fn algorithm(&self) -> RegistrationAlgorithm {
        RegistrationAlgorithm::Akaze
    }

    fn detect_and_compute(&self, gray: &Plane<u8>) -> Features {
        let levels = self.scale_space(gray);
        let mut found = self.find_extrema(&levels);
        super::retain_best(&mut found, self.max_features, |e| e.3);

        let mut keypoints = Vec::with_capacity(found.len());
        let mut data = vec![0u8; found.len() * DESCRIPTOR_BYTES];
        for ((idx, x, y, response), row) in found.into_iter().zip(data.chunks_mut(DESCRIPTOR_BYTES)) {
            let level = &levels[idx];
            let angle = dominant_orientation(level, x, y);
            describe(level, x, y, angle, self.pattern_size, row);
            let scale = 2f32.powi(level.octave as i32);
            keypoints.push(Keypoint {
                x: (x + 0.5) * scale - 0.5,
                y: (y + 0.5) * scale - 0.5,
                size: 2.0 * level.sigma * scale,
                angle: wrap_deg(angle.to_degrees()),
                response,
                octave: level.octave as i32,
            });
        }
        Features {
            keypoints,
            descriptors: Descriptors::Binary {
                row_len: DESCRIPTOR_BYTES,
                data,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(size: usize, cx: f32, cy: f32, sigma: f32) -> Plane<u8> {
        let mut plane = Plane::new(size, size, 10u8);
        for y in 0..size {
            for x in 0..size {
                let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                let v = 10.0 + 220.0 * (-d2 / (2.0 * sigma * sigma)).exp();
                plane.set(x, y, v.round() as u8);
            }
        }
        plane
    }

    #[test]
    fn descriptor_width_matches_grid_pairs() {
        let bits: usize = GRIDS.iter().map(|n| n * n * (n * n - 1) / 2 * 3).sum();
        assert_eq!(bits, 486);
        assert_eq!(DESCRIPTOR_BYTES, bits.div_ceil(8));
    }

    #[test]
    fn flat_image_has_no_keypoints() {
        assert!(Akaze::default().detect_and_compute(&Plane::new(80, 80, 128u8)).is_empty());
    }

    #[test]
    fn blob_is_detected_near_its_centre() {
        let features = Akaze::default().detect_and_compute(&blob(120, 60.0, 60.0, 5.0));
        assert!(features
            .keypoints
            .iter()
            .any(|k| (k.x - 60.0).abs() < 2.0 && (k.y - 60.0).abs() < 2.0));
        let Descriptors::Binary { row_len, data } = &features.descriptors else {
            panic!("akaze descriptors are binary");
        };
        assert_eq!(*row_len, DESCRIPTOR_BYTES);
        // Only the low 6 bits of the last byte are used.
        assert!(data.chunks(*row_len).all(|row| row[DESCRIPTOR_BYTES - 1] < 64));
    }

    #[test]
    fn detection_is_deterministic() {
        let img = blob(96, 40.0, 50.0, 4.0);
        let a = Akaze::default().detect_and_compute(&img);
        let b = Akaze::default().detect_and_compute(&img);
        assert_eq!(a, b);
    }
}
