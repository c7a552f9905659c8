//! BRISK: scale-space FAST with a concentric-ring sampling pattern.
//!
//! Layers alternate between octaves `c_i` (halving) and intra-octaves
//! `d_i` (starting at 2/3 of the input), giving scales 1, 1.5, 2, 3, ...
//! A corner survives when its FAST score beats its 3x3 neighbourhood and
//! the corresponding region of the adjacent layers.

use std::sync::OnceLock;

use super::fast::score_plane;
use super::{Descriptors, FeatureDetector, Features, Keypoint, RegistrationAlgorithm};
use crate::image::filter::IntegralImage;
use crate::image::pyramid::ImagePyramid;
use crate::image::resize::resize_plane_u8;
use crate::image::Plane;
use crate::util::math::wrap_deg;

/// 512 short-pair comparisons.
pub const DESCRIPTOR_BYTES: usize = 64;
const RING_RADII: [f32; 5] = [0.0, 2.9, 4.9, 7.4, 10.8];
const RING_POINTS: [usize; 5] = [1, 10, 14, 15, 20];
const SHORT_PAIR_MAX: f32 = 9.75;
const LONG_PAIR_MIN: f32 = 13.67;
const BASIC_SIZE: f32 = 12.0;

/// Pattern point in unit-scale coordinates with its smoothing half-width.
#[derive(Clone, Copy, Debug)]
struct PatternPoint {
    x: f32,
    y: f32,
    sigma: f32,
}

struct Pattern {
    points: Vec<PatternPoint>,
    short_pairs: Vec<(usize, usize)>,
    long_pairs: Vec<(usize, usize)>,
}

fn pattern() -> &'static Pattern {
    static PATTERN: OnceLock<Pattern> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut points = Vec::with_capacity(RING_POINTS.iter().sum());
        for (&r, &n) in RING_RADII.iter().zip(&RING_POINTS) {
            // Half the spacing between neighbouring ring points.
            let sigma = if n == 1 {
                0.5
            } else {
                (r * (std::f32::consts::PI / n as f32).sin()).max(0.5)
            };
            for k in 0..n {
                let a = 2.0 * std::f32::consts::PI * k as f32 / n as f32;
                points.push(PatternPoint {
                    x: r * a.cos(),
                    y: r * a.sin(),
                    sigma,
                });
            }
        }
        let mut short_pairs = Vec::new();
        let mut long_pairs = Vec::new();
        for i in 0..points.len() {
            for j in i + 1..points.len() {
                let d = (points[i].x - points[j].x).hypot(points[i].y - points[j].y);
                if d < SHORT_PAIR_MAX {
                    short_pairs.push((i, j));
                } else if d > LONG_PAIR_MIN {
                    long_pairs.push((i, j));
                }
            }
        }
        short_pairs.truncate(DESCRIPTOR_BYTES * 8);
        Pattern {
            points,
            short_pairs,
            long_pairs,
        }
    })
}

/// BRISK parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Brisk {
    pub threshold: u8,
    /// Number of octave layers `c_i`; as many intra-octave layers are added.
    pub octaves: usize,
    pub pattern_scale: f32,
    /// Keep at most this many keypoints by score; `0` keeps all.
    pub max_features: usize,
}

impl Default for Brisk {
    fn default() -> Self {
        Self {
            threshold: 30,
            octaves: 4,
            pattern_scale: 1.0,
            max_features: 0,
        }
    }
}

struct Layer {
    scale: f32,
    scores: Plane<f32>,
}

impl Brisk {
    fn layers(&self, gray: &Plane<u8>) -> Vec<Layer> {
        let octaves = self.octaves.max(1);
        let c = ImagePyramid::build_u8(gray, octaves);
        let (dw, dh) = (gray.width() * 2 / 3, gray.height() * 2 / 3);
        let d = if dw >= 7 && dh >= 7 {
            Some(ImagePyramid::build_u8(&resize_plane_u8(gray, dw, dh), octaves))
        } else {
            None
        };

        let mut layers = Vec::with_capacity(2 * octaves);
        for i in 0..octaves {
            let base = (1u32 << i) as f32;
            if let Some(plane) = c.level(i) {
                layers.push(Layer {
                    scale: base,
                    scores: score_plane(plane, self.threshold, 3),
                });
            }
            if let Some(plane) = d.as_ref().and_then(|d| d.level(i)) {
                layers.push(Layer {
                    scale: 1.5 * base,
                    scores: score_plane(plane, self.threshold, 3),
                });
            }
        }
        layers.sort_by(|a, b| a.scale.total_cmp(&b.scale));
        layers
    }
}

fn is_local_max(scores: &Plane<f32>, x: usize, y: usize, s: f32) -> bool {
    for oy in -1..=1isize {
        for ox in -1..=1isize {
            if ox == 0 && oy == 0 {
                continue;
            }
            let Some(n) = scores.try_get(x as isize + ox, y as isize + oy) else {
                continue;
            };
            let earlier = oy < 0 || (oy == 0 && ox < 0);
            if (earlier && n >= s) || (!earlier && n > s) {
                return false;
            }
        }
    }
    true
}

/// Highest score of `layer` over the region covered by pixel `(x, y)` and
/// its 3x3 neighbourhood at `scale`.
fn region_max(layer: &Layer, x: usize, y: usize, scale: f32) -> f32 {
    let ratio = scale / layer.scale;
    let to_layer = |v: usize, off: f32| ((v as f32 + off + 0.5) * ratio - 0.5).round() as isize;
    let (x0, x1) = (to_layer(x, -1.0), to_layer(x, 1.0));
    let (y0, y1) = (to_layer(y, -1.0), to_layer(y, 1.0));
    let mut m = 0.0f32;
    for ly in y0..=y1 {
        for lx in x0..=x1 {
            if let Some(v) = layer.scores.try_get(lx, ly) {
                m = m.max(v);
            }
        }
    }
    m
}

fn smoothed(integral: &IntegralImage, px: f32, py: f32, half: f32) -> f32 {
    let x0 = (px - half).round() as isize;
    let y0 = (py - half).round() as isize;
    let x1 = (px + half).round() as isize + 1;
    let y1 = (py + half).round() as isize + 1;
    integral.box_mean(x0, y0, x1, y1)
}

fn sample_pattern(
    integral: &IntegralImage,
    x: f32,
    y: f32,
    scale: f32,
    angle: f32,
    out: &mut Vec<f32>,
) {
    let (sin, cos) = angle.sin_cos();
    out.clear();
    out.extend(pattern().points.iter().map(|p| {
        let (px, py) = (p.x * scale, p.y * scale);
        let rx = px * cos - py * sin;
        let ry = px * sin + py * cos;
        smoothed(integral, x + rx, y + ry, p.sigma * scale)
    }));
}

/// Orientation (radians) from the intensity gradients along the long pairs.
fn orientation(values: &[f32], scale: f32) -> f32 {
    let pattern = pattern();
    let (mut gx, mut gy) = (0.0f32, 0.0f32);
    for &(i, j) in &pattern.long_pairs {
        let (a, b) = (pattern.points[i], pattern.points[j]);
        let (dx, dy) = ((b.x - a.x) * scale, (b.y - a.y) * scale);
        let g = (values[j] - values[i]) / (dx * dx + dy * dy);
        gx += dx * g;
        gy += dy * g;
    }
    gy.atan2(gx)
}

impl FeatureDetector for Brisk {
    fn algorithm(&self) -> RegistrationAlgorithm {
        RegistrationAlgorithm::Brisk
    }

    fn detect_and_compute(&self, gray: &Plane<u8>) -> Features {
        let layers = self.layers(gray);
        let mut found: Vec<(f32, f32, f32, f32, usize)> = Vec::new();
        for (li, layer) in layers.iter().enumerate() {
            let scores = &layer.scores;
            for y in 0..scores.height() {
                for x in 0..scores.width() {
                    let s = scores.get(x, y);
                    if s <= 0.0 || !is_local_max(scores, x, y, s) {
                        continue;
                    }
                    let below = li.checked_sub(1).map(|j| region_max(&layers[j], x, y, layer.scale));
                    let above = layers.get(li + 1).map(|n| region_max(n, x, y, layer.scale));
                    if below.is_some_and(|b| b >= s) || above.is_some_and(|a| a > s) {
                        continue;
                    }
                    let fx = (x as f32 + 0.5) * layer.scale - 0.5;
                    let fy = (y as f32 + 0.5) * layer.scale - 0.5;
                    found.push((fx, fy, layer.scale, s, li));
                }
            }
        }

        // The rotated pattern must stay inside the image.
        let (w, h) = (gray.width() as f32, gray.height() as f32);
        let outer = RING_RADII[4] + pattern().points.last().map_or(0.0, |p| p.sigma);
        found.retain(|&(x, y, scale, _, _)| {
            let r = outer * scale * self.pattern_scale;
            x - r >= 0.0 && y - r >= 0.0 && x + r < w && y + r < h
        });
        super::retain_best(&mut found, self.max_features, |k| k.3);

        let integral = IntegralImage::new(&gray.to_f32(1.0));
        let pairs = &pattern().short_pairs;
        let mut keypoints = Vec::with_capacity(found.len());
        let mut data = vec![0u8; found.len() * DESCRIPTOR_BYTES];
        let mut values = Vec::with_capacity(pattern().points.len());
        for ((x, y, scale, score, li), row) in found.into_iter().zip(data.chunks_mut(DESCRIPTOR_BYTES)) {
            let pscale = scale * self.pattern_scale;
            sample_pattern(&integral, x, y, pscale, 0.0, &mut values);
            let angle = orientation(&values, pscale);
            sample_pattern(&integral, x, y, pscale, angle, &mut values);
            for (bit, &(i, j)) in pairs.iter().enumerate() {
                if values[i] > values[j] {
                    row[bit / 8] |= 1 << (bit % 8);
                }
            }
            keypoints.push(Keypoint {
                x,
                y,
                size: BASIC_SIZE * pscale,
                angle: wrap_deg(angle.to_degrees()),
                response: score,
                octave: li as i32,
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
