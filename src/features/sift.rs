//! SIFT: difference-of-Gaussians extrema with 128-float gradient histograms.
//!
//! The scale space starts at the input resolution (no upsampling). Each
//! octave holds `intervals + 3` Gaussian images; the next octave starts
//! from the image with twice the base sigma, decimated by two.

use std::f32::consts::PI;

use nalgebra::{Matrix3, Vector3};

use super::{Descriptors, FeatureDetector, Features, Keypoint, RegistrationAlgorithm};
use crate::image::filter::gaussian_blur;
use crate::image::pyramid::decimate_2x_f32;
use crate::image::Plane;
use crate::util::math::wrap_deg;

pub const DESCRIPTOR_LEN: usize = 128;

const IMG_BORDER: usize = 5;
const MAX_INTERP_STEPS: usize = 5;
const INPUT_SIGMA: f32 = 0.5;
const ORI_BINS: usize = 36;
const ORI_PEAK_RATIO: f32 = 0.8;
const ORI_SIG_FACTOR: f32 = 1.5;
const DESCR_WIDTH: usize = 4;
const DESCR_BINS: usize = 8;
const DESCR_SCALE_FACTOR: f32 = 3.0;
const DESCR_MAG_CLAMP: f32 = 0.2;

/// SIFT parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sift {
    /// Keep at most this many keypoints by response; `0` keeps all.
    pub max_features: usize,
    /// Scale intervals per octave.
    pub intervals: usize,
    pub sigma: f32,
    pub contrast_threshold: f32,
    /// Principal curvature ratio limit.
    pub edge_threshold: f32,
}

impl Default for Sift {
    fn default() -> Self {
        Self {
            max_features: 0,
            intervals: 3,
            sigma: 1.6,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
        }
    }
}

struct Octave {
    gaussians: Vec<Plane<f32>>,
    dogs: Vec<Plane<f32>>,
}

/// Sub-pixel extremum in octave coordinates.
struct Extremum {
    x: f32,
    y: f32,
    layer: usize,
    /// Octave-local sigma.
    sigma: f32,
    response: f32,
}

impl Sift {
    fn build_octaves(&self, gray: &Plane<u8>) -> Vec<Octave> {
        let s = self.intervals.max(1);
        let min_side = gray.width().min(gray.height()).max(1) as f32;
        let n_octaves = ((min_side.log2().floor() as i32) - 3).max(1) as usize;
        let k = 2f32.powf(1.0 / s as f32);

        // Incremental blur between consecutive Gaussian images.
        let mut steps = Vec::with_capacity(s + 3);
        steps.push(self.sigma);
        for i in 1..s + 3 {
            let prev = self.sigma * k.powi(i as i32 - 1);
            let total = prev * k;
            steps.push((total * total - prev * prev).sqrt());
        }

        let init = (self.sigma * self.sigma - INPUT_SIGMA * INPUT_SIGMA).max(0.01).sqrt();
        let mut base = gaussian_blur(&gray.to_f32(1.0 / 255.0), init);
        let mut octaves = Vec::with_capacity(n_octaves);
        for o in 0..n_octaves {
            if o > 0 {
                let Some(next) = octaves
                    .last()
                    .and_then(|prev: &Octave| decimate_2x_f32(&prev.gaussians[s]))
                else {
                    break;
                };
                if next.width() <= 2 * IMG_BORDER || next.height() <= 2 * IMG_BORDER {
                    break;
                }
                base = next;
            }
            let mut gaussians = Vec::with_capacity(s + 3);
            let mut current = base.clone();
            for step in &steps[1..] {
                let next = gaussian_blur(&current, *step);
                gaussians.push(std::mem::replace(&mut current, next));
            }
            gaussians.push(current);
            let dogs = gaussians
                .windows(2)
                .map(|pair| {
                    let data = pair[1]
                        .data()
                        .iter()
                        .zip(pair[0].data())
                        .map(|(b, a)| b - a)
                        .collect();
                    Plane::from_raw(data, base.width(), base.height())
                })
                .collect();
            octaves.push(Octave { gaussians, dogs });
        }
        octaves
    }

    fn find_extrema(&self, octave: &Octave) -> Vec<Extremum> {
        let s = self.intervals.max(1);
        let prefilter = 0.5 * self.contrast_threshold / s as f32;
        let dogs = &octave.dogs;
        let (w, h) = (dogs[0].width(), dogs[0].height());
        let mut out = Vec::new();
        if w <= 2 * IMG_BORDER || h <= 2 * IMG_BORDER {
            return out;
        }
        for layer in 1..=s {
            for y in IMG_BORDER..h - IMG_BORDER {
                for x in IMG_BORDER..w - IMG_BORDER {
                    let v = dogs[layer].get(x, y);
                    if v.abs() <= prefilter || !is_extremum(dogs, layer, x, y, v) {
                        continue;
                    }
                    if let Some(e) = self.refine(dogs, layer, x, y) {
                        out.push(e);
                    }
                }
            }
        }
        out
    }

    fn refine(&self, dogs: &[Plane<f32>], layer: usize, x: usize, y: usize) -> Option<Extremum> {
        let s = self.intervals.max(1);
        let (w, h) = (dogs[0].width(), dogs[0].height());
        let (mut x, mut y, mut layer) = (x, y, layer);
        let mut offset = Vector3::zeros();
        let mut grad = Vector3::zeros();
        let mut converged = false;
        for _ in 0..MAX_INTERP_STEPS {
            let (g, hess) = derivatives(dogs, layer, x, y);
            grad = g;
            offset = hess.lu().solve(&(-g))?;
            if offset.iter().all(|d| d.abs() < 0.5) {
                converged = true;
                break;
            }
            if offset.iter().any(|d| d.abs() > (w.max(h)) as f32) {
                return None;
            }
            let nx = x as isize + offset[0].round() as isize;
            let ny = y as isize + offset[1].round() as isize;
            let nl = layer as isize + offset[2].round() as isize;
            if nl < 1
                || nl > s as isize
                || nx < IMG_BORDER as isize
                || ny < IMG_BORDER as isize
                || nx >= (w - IMG_BORDER) as isize
                || ny >= (h - IMG_BORDER) as isize
            {
                return None;
            }
            (x, y, layer) = (nx as usize, ny as usize, nl as usize);
        }
        if !converged {
            return None;
        }

        let contrast = dogs[layer].get(x, y) + 0.5 * grad.dot(&offset);
        if contrast.abs() * (s as f32) < self.contrast_threshold {
            return None;
        }

        let d = &dogs[layer];
        let v2 = 2.0 * d.get(x, y);
        let dxx = d.get(x + 1, y) + d.get(x - 1, y) - v2;
        let dyy = d.get(x, y + 1) + d.get(x, y - 1) - v2;
        let dxy = (d.get(x + 1, y + 1) - d.get(x - 1, y + 1) - d.get(x + 1, y - 1)
            + d.get(x - 1, y - 1))
            * 0.25;
        let tr = dxx + dyy;
        let det = dxx * dyy - dxy * dxy;
        let r = self.edge_threshold;
        if det <= 0.0 || tr * tr * r >= (r + 1.0) * (r + 1.0) * det {
            return None;
        }

        Some(Extremum {
            x: x as f32 + offset[0],
            y: y as f32 + offset[1],
            layer,
            sigma: self.sigma * 2f32.powf((layer as f32 + offset[2]) / s as f32),
            response: contrast.abs(),
        })
    }
}

fn is_extremum(dogs: &[Plane<f32>], layer: usize, x: usize, y: usize, v: f32) -> bool {
    let is_max = v > 0.0;
    for plane in &dogs[layer - 1..=layer + 1] {
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                let n = plane.get(nx, ny);
                if (is_max && n > v) || (!is_max && n < v) {
                    return false;
                }
            }
        }
    }
    true
}

/// Gradient and Hessian of the DoG stack at `(x, y, layer)`.
fn derivatives(dogs: &[Plane<f32>], layer: usize, x: usize, y: usize) -> (Vector3<f32>, Matrix3<f32>) {
    let (prev, cur, next) = (&dogs[layer - 1], &dogs[layer], &dogs[layer + 1]);
    let v = cur.get(x, y);
    let dx = (cur.get(x + 1, y) - cur.get(x - 1, y)) * 0.5;
    let dy = (cur.get(x, y + 1) - cur.get(x, y - 1)) * 0.5;
    let ds = (next.get(x, y) - prev.get(x, y)) * 0.5;
    let dxx = cur.get(x + 1, y) + cur.get(x - 1, y) - 2.0 * v;
    let dyy = cur.get(x, y + 1) + cur.get(x, y - 1) - 2.0 * v;
    let dss = next.get(x, y) + prev.get(x, y) - 2.0 * v;
    let dxy = (cur.get(x + 1, y + 1) - cur.get(x - 1, y + 1) - cur.get(x + 1, y - 1)
        + cur.get(x - 1, y - 1))
        * 0.25;
    let dxs = (next.get(x + 1, y) - next.get(x - 1, y) - prev.get(x + 1, y) + prev.get(x - 1, y)) * 0.25;
    let dys = (next.get(x, y + 1) - next.get(x, y - 1) - prev.get(x, y + 1) + prev.get(x, y - 1)) * 0.25;
    let hess = Matrix3::new(dxx, dxy, dxs, dxy, dyy, dys, dxs, dys, dss);
    (Vector3::new(dx, dy, ds), hess)
}

#[inline]
fn gradient(img: &Plane<f32>, x: isize, y: isize) -> Option<(f32, f32)> {
    let (w, h) = (img.width() as isize, img.height() as isize);
    if x < 1 || y < 1 || x >= w - 1 || y >= h - 1 {
        return None;
    }
    let (x, y) = (x as usize, y as usize);
    Some((
        img.get(x + 1, y) - img.get(x - 1, y),
        img.get(x, y + 1) - img.get(x, y - 1),
    ))
}

/// Dominant gradient orientations (degrees) around `(x, y)`.
fn orientations(img: &Plane<f32>, x: f32, y: f32, sigma: f32) -> Vec<f32> {
    let weight_sigma = ORI_SIG_FACTOR * sigma;
    let radius = (3.0 * weight_sigma).round() as isize;
    let denom = 2.0 * weight_sigma * weight_sigma;
    let (cx, cy) = (x.round() as isize, y.round() as isize);
    let mut hist = [0.0f32; ORI_BINS];
    for oy in -radius..=radius {
        for ox in -radius..=radius {
            let Some((gx, gy)) = gradient(img, cx + ox, cy + oy) else {
                continue;
            };
            let weight = (-((ox * ox + oy * oy) as f32) / denom).exp();
            let angle = wrap_deg(gy.atan2(gx).to_degrees());
            let bin = ((angle * ORI_BINS as f32 / 360.0).round() as usize) % ORI_BINS;
            hist[bin] += weight * (gx * gx + gy * gy).sqrt();
        }
    }

    let n = ORI_BINS;
    let smooth: Vec<f32> = (0..n)
        .map(|i| {
            (hist[(i + n - 2) % n] + hist[(i + 2) % n]) / 16.0
                + (hist[(i + n - 1) % n] + hist[(i + 1) % n]) * 4.0 / 16.0
                + hist[i] * 6.0 / 16.0
        })
        .collect();
    let max = smooth.iter().copied().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let mut angles = Vec::new();
    for i in 0..n {
        let (l, c, r) = (smooth[(i + n - 1) % n], smooth[i], smooth[(i + 1) % n]);
        if c > l && c > r && c >= ORI_PEAK_RATIO * max {
            let offset = 0.5 * (l - r) / (l - 2.0 * c + r);
            angles.push(wrap_deg((i as f32 + offset) * 360.0 / n as f32));
        }
    }
    angles
}

fn describe(img: &Plane<f32>, x: f32, y: f32, sigma: f32, angle_deg: f32, out: &mut [f32]) {
    let d = DESCR_WIDTH;
    let hist_width = DESCR_SCALE_FACTOR * sigma;
    let radius = ((hist_width * std::f32::consts::SQRT_2 * (d as f32 + 1.0) * 0.5).round() as isize)
        .min((img.width().max(img.height())) as isize);
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let weight_denom = 0.5 * (d * d) as f32;
    let bins_per_rad = DESCR_BINS as f32 / (2.0 * PI);
    let angle_rad = angle_deg.to_radians();
    let (cx, cy) = (x.round() as isize, y.round() as isize);

    out.iter_mut().for_each(|v| *v = 0.0);
    for oy in -radius..=radius {
        for ox in -radius..=radius {
            let u = (ox as f32 * cos + oy as f32 * sin) / hist_width;
            let v = (-(ox as f32) * sin + oy as f32 * cos) / hist_width;
            let rbin = v + d as f32 / 2.0 - 0.5;
            let cbin = u + d as f32 / 2.0 - 0.5;
            if rbin <= -1.0 || rbin >= d as f32 || cbin <= -1.0 || cbin >= d as f32 {
                continue;
            }
            let Some((gx, gy)) = gradient(img, cx + ox, cy + oy) else {
                continue;
            };
            let mag = (gx * gx + gy * gy).sqrt() * (-(u * u + v * v) / weight_denom).exp();
            let mut ori = gy.atan2(gx) - angle_rad;
            ori = ori.rem_euclid(2.0 * PI);
            let obin = ori * bins_per_rad;

            let (r0, c0, o0) = (rbin.floor(), cbin.floor(), obin.floor());
            let (fr, fc, fo) = (rbin - r0, cbin - c0, obin - o0);
            for (dr, wr) in [(0, 1.0 - fr), (1, fr)] {
                let r = r0 as isize + dr;
                if r < 0 || r >= d as isize {
                    continue;
                }
                for (dc, wc) in [(0, 1.0 - fc), (1, fc)] {
                    let c = c0 as isize + dc;
                    if c < 0 || c >= d as isize {
                        continue;
                    }
                    for (dob, wo) in [(0, 1.0 - fo), (1, fo)] {
                        let o = (o0 as usize + dob) % DESCR_BINS;
                        let idx = (r as usize * d + c as usize) * DESCR_BINS + o;
                        out[idx] += mag * wr * wc * wo;
                    }
                }
            }
        }
    }

    normalize(out);
    out.iter_mut().for_each(|v| *v = v.min(DESCR_MAG_CLAMP));
    normalize(out);
}

fn normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        values.iter_mut().for_each(|v| *v /= norm);
    }
}

impl FeatureDetector for Sift {
    fn algorithm(&self) -> RegistrationAlgorithm {
        RegistrationAlgorithm::Sift
    }

    fn detect_and_compute(&self, gray: &Plane<u8>) -> Features {
        let mut found: Vec<(Keypoint, Vec<f32>)> = Vec::new();
        for (o, octave) in self.build_octaves(gray).iter().enumerate() {
            let scale = (1u32 << o) as f32;
            for e in self.find_extrema(octave) {
                let img = &octave.gaussians[e.layer];
                for angle in orientations(img, e.x, e.y, e.sigma) {
                    let mut row = vec![0.0f32; DESCRIPTOR_LEN];
                    describe(img, e.x, e.y, e.sigma, angle, &mut row);
                    let kp = Keypoint {
                        x: e.x * scale,
                        y: e.y * scale,
                        size: 2.0 * e.sigma * scale,
                        angle,
                        response: e.response,
                        octave: o as i32,
                    };
                    found.push((kp, row));
                }
            }
        }
        super::retain_best(&mut found, self.max_features, |(k, _)| k.response);

        let mut keypoints = Vec::with_capacity(found.len());
        let mut data = Vec::with_capacity(found.len() * DESCRIPTOR_LEN);
        for (kp, row) in found {
            keypoints.push(kp);
            data.extend_from_slice(&row);
        }
        Features {
            keypoints,
            descriptors: Descriptors::Float {
                row_len: DESCRIPTOR_LEN,
                data,
            },
        }
    }
}
