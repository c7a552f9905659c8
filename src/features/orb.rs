//! ORB: oriented FAST keypoints with rotated BRIEF descriptors.

use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::fast::{self, harris_response, refine_corner};
use super::{Descriptors, FeatureDetector, Features, Keypoint, RegistrationAlgorithm};
use crate::image::filter::gaussian_blur_u8;
use crate::image::resize::resize_plane_u8;
use crate::image::Plane;
use crate::util::math::wrap_deg;

/// Bytes per descriptor (256 tests).
pub const DESCRIPTOR_BYTES: usize = 32;
const PATTERN_SEED: u64 = 0x0b1e_f256;
const PATTERN_EXTENT: i32 = 13;

/// Point pairs `(x1, y1, x2, y2)` compared by the BRIEF tests.
fn brief_pattern() -> &'static [[i8; 4]; 256] {
    static PATTERN: OnceLock<[[i8; 4]; 256]> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        let mut pattern = [[0i8; 4]; 256];
        for pair in pattern.iter_mut() {
            for v in pair.iter_mut() {
                *v = rng.random_range(-PATTERN_EXTENT..=PATTERN_EXTENT) as i8;
            }
        }
        pattern
    })
}

/// ORB parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Orb {
    pub max_features: usize,
    pub scale_factor: f32,
    pub levels: usize,
    /// Keypoints closer than this to a level's border are dropped.
    pub edge_threshold: usize,
    pub fast_threshold: u8,
    pub patch_size: usize,
}

impl Default for Orb {
    fn default() -> Self {
        Self {
            max_features: 500,
            scale_factor: 1.2,
            levels: 8,
            edge_threshold: 19,
            fast_threshold: 20,
            patch_size: 31,
        }
    }
}

impl Orb {
    /// Per-level feature quotas, geometrically decreasing with scale.
    fn quotas(&self, levels: usize) -> Vec<usize> {
        let inv = 1.0 / self.scale_factor;
        let total: f32 = (0..levels).map(|i| inv.powi(i as i32)).sum();
        let mut quotas: Vec<usize> = (0..levels)
            .map(|i| (self.max_features as f32 * inv.powi(i as i32) / total).round() as usize)
            .collect();
        let assigned: usize = quotas.iter().sum();
        if let Some(first) = quotas.first_mut() {
            *first = (*first + self.max_features).saturating_sub(assigned);
        }
        quotas
    }

    /// Pyramid levels with their nominal scale.
    fn pyramid(&self, gray: &Plane<u8>) -> Vec<(Plane<u8>, f32)> {
        let min_side = 2 * self.edge_threshold + 1;
        let mut levels = vec![(gray.clone(), 1.0f32)];
        for i in 1..self.levels {
            let scale = self.scale_factor.powi(i as i32);
            let w = (gray.width() as f32 / scale).round() as usize;
            let h = (gray.height() as f32 / scale).round() as usize;
            if w < min_side || h < min_side {
                break;
            }
            levels.push((resize_plane_u8(gray, w, h), scale));
        }
        levels
    }
}

/// Maps a level position to the base image. Levels are resampled with
/// half-pixel centres and rounded sizes, so each axis has its own scale.
fn to_base(level: &Plane<u8>, base: &Plane<u8>, x: f32, y: f32) -> (f32, f32) {
    let sx = base.width() as f32 / level.width() as f32;
    let sy = base.height() as f32 / level.height() as f32;
    ((x + 0.5) * sx - 0.5, (y + 0.5) * sy - 0.5)
}

/// Intensity-centroid orientation in degrees over a disc of `radius`.
pub(crate) fn centroid_angle(plane: &Plane<u8>, x: usize, y: usize, radius: isize) -> f32 {
    let (mut m01, mut m10) = (0.0f32, 0.0f32);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let v = f32::from(plane.get_clamped(x as isize + dx, y as isize + dy));
            m10 += v * dx as f32;
            m01 += v * dy as f32;
        }
    }
    wrap_deg(m01.atan2(m10).to_degrees())
}

fn describe(blurred: &Plane<u8>, x: usize, y: usize, angle_deg: f32, out: &mut [u8]) {
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let sample = |px: i8, py: i8| {
        let (px, py) = (f32::from(px), f32::from(py));
        let rx = (px * cos - py * sin).round() as isize;
        let ry = (px * sin + py * cos).round() as isize;
        blurred.get_clamped(x as isize + rx, y as isize + ry)
    };
    for (byte, tests) in out.iter_mut().zip(brief_pattern().chunks(8)) {
        *byte = 0;
        for (bit, t) in tests.iter().enumerate() {
            if sample(t[0], t[1]) < sample(t[2], t[3]) {
                *byte |= 1 << bit;
            }
        }
    }
}

impl FeatureDetector for Orb {
    fn algorithm(&self) -> RegistrationAlgorithm {
        RegistrationAlgorithm::Orb
    }

    fn detect_and_compute(&self, gray: &Plane<u8>) -> Features {
        let pyramid = self.pyramid(gray);
        let quotas = self.quotas(pyramid.len());
        let half_patch = (self.patch_size / 2) as isize;
        let mut keypoints = Vec::new();
        let mut data = Vec::new();

        for (octave, ((level, scale), quota)) in pyramid.iter().zip(quotas).enumerate() {
            let mut corners: Vec<(fast::Corner, f32)> = fast::detect(level, self.fast_threshold, self.edge_threshold)
                .into_iter()
                .map(|c| (c, harris_response(level, c.x, c.y, 7)))
                .collect();
            super::retain_best(&mut corners, quota, |(_, h)| *h);
            if corners.is_empty() {
                continue;
            }
            let blurred = gaussian_blur_u8(level, 2.0);
            let mut row = [0u8; DESCRIPTOR_BYTES];
            for (c, harris) in corners {
                let angle = centroid_angle(level, c.x, c.y, half_patch);
                describe(&blurred, c.x, c.y, angle, &mut row);
                data.extend_from_slice(&row);
                let (lx, ly) = refine_corner(level, c.x, c.y, 7);
                let (x, y) = to_base(level, gray, lx, ly);
                keypoints.push(Keypoint {
                    x,
                    y,
                    size: self.patch_size as f32 * scale,
                    angle,
                    response: harris,
                    octave: octave as i32,
                });
            }
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
