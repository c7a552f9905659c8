//! Homography estimation from point correspondences.
//!
//! Provides:
//! - normalised Direct Linear Transform from at least 4 correspondences;
//! - seeded RANSAC with an adaptive iteration count and a refit on the
//!   final inlier set.
//!
//! Correspondences may carry weights, one per point pair, proportional to
//! the inverse of their localisation error. Keypoints from coarse scales
//! are then trusted less by the final fits.

use nalgebra::{DMatrix, Matrix3, SymmetricEigen};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::homography::Homography;
use crate::trace::{trace_event, trace_span};
use crate::util::{MoonRegError, MoonRegResult};

/// Minimum number of correspondences for a homography.
pub const MIN_CORRESPONDENCES: usize = 4;

/// How the homography is fitted to the good matches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HomographyMethod {
    /// Plain DLT over every match.
    LeastSquares,
    #[default]
    Ransac,
}

/// RANSAC settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RansacParams {
    /// Inlier threshold on the reprojection error, in pixels.
    pub reproj_threshold: f64,
    pub max_iters: usize,
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            reproj_threshold: 5.0,
            max_iters: 2000,
            confidence: 0.995,
            seed: 0,
        }
    }
}

/// A fitted homography with its inlier mask over the input correspondences.
#[derive(Clone, Debug, PartialEq)]
pub struct Estimate {
    pub homography: Homography,
    pub inliers: Vec<bool>,
}

impl Estimate {
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&i| i).count()
    }
}

fn project(h: &Matrix3<f64>, p: [f64; 2]) -> Option<[f64; 2]> {
    let w = h[(2, 0)] * p[0] + h[(2, 1)] * p[1] + h[(2, 2)];
    if w.abs() < 1e-15 {
        return None;
    }
    Some([
        (h[(0, 0)] * p[0] + h[(0, 1)] * p[1] + h[(0, 2)]) / w,
        (h[(1, 0)] * p[0] + h[(1, 1)] * p[1] + h[(1, 2)]) / w,
    ])
}

/// Reprojection error `|H src - dst|`; infinite when `src` maps to infinity.
pub fn reprojection_error(h: &Homography, src: [f64; 2], dst: [f64; 2]) -> f64 {
    match project(h.matrix(), src) {
        Some(p) => (p[0] - dst[0]).hypot(p[1] - dst[1]),
        None => f64::INFINITY,
    }
}

/// Translates the centroid to the origin and scales the mean distance to
/// `sqrt(2)`.
fn normalize_points(pts: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_dist = pts.iter().map(|p| (p[0] - cx).hypot(p[1] - cy)).sum::<f64>() / n;
    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts.iter().map(|p| [s * (p[0] - cx), s * (p[1] - cy)]).collect();
    (t, normalized)
}

/// DLT fit of `dst ~ H src` over all correspondences.
pub fn homography_dlt(src: &[[f64; 2]], dst: &[[f64; 2]]) -> MoonRegResult<Homography> {
    homography_dlt_weighted(src, dst, None)
}

fn check_weights(n: usize, weights: Option<&[f64]>) -> MoonRegResult<()> {
    match weights {
        Some(w) if w.len() != n => Err(MoonRegError::InvalidInput(
            "weights differ in length from the points",
        )),
        Some(w) if w.iter().any(|v| !(v.is_finite() && *v > 0.0)) => Err(
            MoonRegError::InvalidInput("weights must be positive and finite"),
        ),
        _ => Ok(()),
    }
}

/// DLT fit where the equations of each correspondence are scaled by its
/// weight.
pub fn homography_dlt_weighted(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    weights: Option<&[f64]>,
) -> MoonRegResult<Homography> {
    let n = src.len();
    if n != dst.len() {
        return Err(MoonRegError::InvalidInput("point sets differ in length"));
    }
    check_weights(n, weights)?;
    if n < MIN_CORRESPONDENCES {
        return Err(MoonRegError::registration(format!(
            "need at least {MIN_CORRESPONDENCES} correspondences, got {n}"
        )));
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (s, d)) in src_n.iter().zip(&dst_n).enumerate() {
        let w = weights.map_or(1.0, |w| w[i]);
        let (sx, sy) = (s[0], s[1]);
        let (dx, dy) = (d[0], d[1]);
        a[(2 * i, 3)] = -sx * w;
        a[(2 * i, 4)] = -sy * w;
        a[(2 * i, 5)] = -w;
        a[(2 * i, 6)] = dy * sx * w;
        a[(2 * i, 7)] = dy * sy * w;
        a[(2 * i, 8)] = dy * w;

        a[(2 * i + 1, 0)] = sx * w;
        a[(2 * i + 1, 1)] = sy * w;
        a[(2 * i + 1, 2)] = w;
        a[(2 * i + 1, 6)] = -dx * sx * w;
        a[(2 * i + 1, 7)] = -dx * sy * w;
        a[(2 * i + 1, 8)] = -dx * w;
    }

    // Null vector of A from the smallest eigenpair of A^T A.
    let eig = SymmetricEigen::new(a.transpose() * &a);
    let min_idx = (0..9)
        .min_by(|&i, &j| eig.eigenvalues[i].abs().total_cmp(&eig.eigenvalues[j].abs()))
        .unwrap_or(0);
    let h = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| MoonRegError::registration("degenerate point configuration"))?;
    let homography = Homography::from_matrix(t_dst_inv * h_norm * t_src).normalized();
    if homography.is_degenerate() || homography.to_row_major().iter().any(|v| !v.is_finite()) {
        return Err(MoonRegError::registration("degenerate homography"));
    }
    Ok(homography)
}

fn collinear(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> bool {
    let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
    let scale = (b[0] - a[0]).hypot(b[1] - a[1]) * (c[0] - a[0]).hypot(c[1] - a[1]);
    cross.abs() <= 1e-6 * scale.max(1e-12)
}

/// True when any three of the sample points are (nearly) collinear.
fn degenerate_sample(pts: &[[f64; 2]; 4]) -> bool {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    TRIPLES
        .iter()
        .any(|t| collinear(pts[t[0]], pts[t[1]], pts[t[2]]))
}

fn inlier_mask(h: &Homography, src: &[[f64; 2]], dst: &[[f64; 2]], threshold: f64) -> Vec<bool> {
    src.iter()
        .zip(dst)
        .map(|(s, d)| reprojection_error(h, *s, *d) < threshold)
        .collect()
}

/// Iterations needed to draw an all-inlier sample with `confidence`.
fn adaptive_iterations(inlier_ratio: f64, confidence: f64, cap: usize) -> usize {
    let p_good = inlier_ratio.powi(MIN_CORRESPONDENCES as i32);
    if p_good >= 1.0 - f64::EPSILON {
        return 1;
    }
    if p_good <= f64::EPSILON {
        return cap;
    }
    let needed = (1.0 - confidence).ln() / (1.0 - p_good).ln();
    if needed.is_finite() {
        (needed.ceil() as usize).clamp(1, cap)
    } else {
        cap
    }
}

/// Weighted DLT over the correspondences selected by `mask`.
fn refit_on(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    weights: Option<&[f64]>,
    mask: &[bool],
) -> MoonRegResult<Homography> {
    let keep: Vec<usize> = (0..src.len()).filter(|&i| mask[i]).collect();
    let in_src: Vec<[f64; 2]> = keep.iter().map(|&i| src[i]).collect();
    let in_dst: Vec<[f64; 2]> = keep.iter().map(|&i| dst[i]).collect();
    let in_weights: Option<Vec<f64>> = weights.map(|w| keep.iter().map(|&i| w[i]).collect());
    homography_dlt_weighted(&in_src, &in_dst, in_weights.as_deref())
}

/// Seeded RANSAC over 4-point DLT samples.
///
/// Samples are scored by plain inlier counts; `weights` only enter the
/// refits on the consensus set.
pub fn homography_ransac(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    weights: Option<&[f64]>,
    params: &RansacParams,
) -> MoonRegResult<Estimate> {
    let n = src.len();
    if n != dst.len() {
        return Err(MoonRegError::InvalidInput("point sets differ in length"));
    }
    check_weights(n, weights)?;
    if n < MIN_CORRESPONDENCES {
        return Err(MoonRegError::registration(format!(
            "need at least {MIN_CORRESPONDENCES} correspondences, got {n}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<(Homography, Vec<bool>, usize)> = None;
    let mut iterations = params.max_iters.max(1);
    let mut iter = 0;
    while iter < iterations {
        iter += 1;
        let idx = rand::seq::index::sample(&mut rng, n, MIN_CORRESPONDENCES);
        let mut s4 = [[0.0; 2]; 4];
        let mut d4 = [[0.0; 2]; 4];
        for (k, i) in idx.iter().enumerate() {
            s4[k] = src[i];
            d4[k] = dst[i];
        }
        if degenerate_sample(&s4) || degenerate_sample(&d4) {
            continue;
        }
        let Ok(h) = homography_dlt(&s4, &d4) else {
            continue;
        };
        let mask = inlier_mask(&h, src, dst, params.reproj_threshold);
        let count = mask.iter().filter(|&&m| m).count();
        if best.as_ref().map_or(true, |b| count > b.2) {
            iterations = iterations.min(adaptive_iterations(
                count as f64 / n as f64,
                params.confidence,
                params.max_iters.max(1),
            ));
            best = Some((h, mask, count));
        }
    }

    let Some((best_h, best_mask, count)) = best else {
        return Err(MoonRegError::registration("no non-degenerate sample found"));
    };
    if count < MIN_CORRESPONDENCES {
        return Err(MoonRegError::registration(format!(
            "only {count} inliers, need {MIN_CORRESPONDENCES}"
        )));
    }
    trace_event!("ransac_best", inliers = count, iterations = iter);

    let mut homography = refit_on(src, dst, weights, &best_mask).unwrap_or(best_h);
    let mut inliers = inlier_mask(&homography, src, dst, params.reproj_threshold);
    // One more pass when the refit changed the consensus set.
    if inliers != best_mask && inliers.iter().filter(|&&m| m).count() >= MIN_CORRESPONDENCES {
        if let Ok(h) = refit_on(src, dst, weights, &inliers) {
            homography = h;
            inliers = inlier_mask(&homography, src, dst, params.reproj_threshold);
        }
    }
    Ok(Estimate { homography, inliers })
}

/// Fits `dst ~ H src` with the chosen method.
pub fn estimate_homography(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    weights: Option<&[f64]>,
    method: HomographyMethod,
    params: &RansacParams,
) -> MoonRegResult<Estimate> {
    let _span = trace_span!("estimate_homography", points = src.len()).entered();
    match method {
        HomographyMethod::LeastSquares => Ok(Estimate {
            homography: homography_dlt_weighted(src, dst, weights)?,
            inliers: vec![true; src.len()],
        }),
        HomographyMethod::Ransac => homography_ransac(src, dst, weights, params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn ground_truth() -> Homography {
        Homography::from_row_slice(&[1.02, 0.03, 12.0, -0.02, 0.98, -7.0, 1e-5, -2e-5, 1.0]).unwrap()
    }

    fn grid() -> Vec<[f64; 2]> {
        let mut pts = Vec::new();
        for y in 0..6 {
            for x in 0..7 {
                pts.push([20.0 + x as f64 * 25.0, 15.0 + y as f64 * 30.0]);
            }
        }
        pts
    }

    #[test]
    fn dlt_recovers_exact_homography() {
        let h = ground_truth();
        let src = grid();
        let dst: Vec<[f64; 2]> = src
            .iter()
            .map(|p| {
                let (x, y) = h.project(p[0], p[1]).unwrap();
                [x, y]
            })
            .collect();
        let est = homography_dlt(&src, &dst).unwrap();
        assert!(est.approx_eq(&h, 1e-4), "{est:?}");
    }

    #[test]
    fn too_few_points_is_a_registration_error() {
        let pts = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        assert!(matches!(
            homography_dlt(&pts, &pts),
            Err(MoonRegError::RegistrationError { .. })
        ));
    }

    #[test]
    fn ransac_rejects_outliers_deterministically() {
        let h = ground_truth();
        let src = grid();
        let mut dst: Vec<[f64; 2]> = src
            .iter()
            .map(|p| {
                let (x, y) = h.project(p[0], p[1]).unwrap();
                [x, y]
            })
            .collect();
        let mut rng = StdRng::seed_from_u64(7);
        for p in dst.iter_mut().step_by(5) {
            p[0] += rng.random_range(40.0..80.0);
            p[1] -= rng.random_range(40.0..80.0);
        }
        let params = RansacParams::default();
        let a = homography_ransac(&src, &dst, None, &params).unwrap();
        let b = homography_ransac(&src, &dst, None, &params).unwrap();
        assert_eq!(a, b);
        assert!(a.homography.approx_eq(&h, 1e-4));
        assert_eq!(a.inlier_count(), src.len() - src.len().div_ceil(5));
    }

    fn max_grid_error(est: &Homography, truth: &Homography) -> f64 {
        grid()
            .iter()
            .map(|p| {
                let (ax, ay) = est.project(p[0], p[1]).unwrap();
                let (bx, by) = truth.project(p[0], p[1]).unwrap();
                (ax - bx).hypot(ay - by)
            })
            .fold(0.0, f64::max)
    }

    #[test]
    fn low_weights_limit_the_pull_of_noisy_points() {
        let h = ground_truth();
        let src = grid();
        let mut rng = StdRng::seed_from_u64(3);
        let mut weights = Vec::with_capacity(src.len());
        let dst: Vec<[f64; 2]> = src
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let (x, y) = h.project(p[0], p[1]).unwrap();
                if i % 2 == 0 {
                    weights.push(1.0);
                    [x, y]
                } else {
                    weights.push(0.01);
                    [x + rng.random_range(-2.0..2.0), y + rng.random_range(-2.0..2.0)]
                }
            })
            .collect();
        let weighted = homography_dlt_weighted(&src, &dst, Some(weights.as_slice())).unwrap();
        let plain = homography_dlt(&src, &dst).unwrap();
        let weighted_err = max_grid_error(&weighted, &h);
        assert!(weighted_err < 0.05, "weighted error {weighted_err}");
        assert!(weighted_err < max_grid_error(&plain, &h));
    }

    #[test]
    fn bad_weights_are_rejected() {
        let src = grid();
        assert!(matches!(
            homography_dlt_weighted(&src, &src, Some(&[1.0; 3][..])),
            Err(MoonRegError::InvalidInput(_))
        ));
        let zeros = vec![0.0; src.len()];
        assert!(matches!(
            homography_ransac(&src, &src, Some(zeros.as_slice()), &RansacParams::default()),
            Err(MoonRegError::InvalidInput(_))
        ));
    }

    #[test]
    fn collinear_points_are_degenerate() {
        let pts = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [5.0, 0.0]];
        assert!(degenerate_sample(&pts));
        let square = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        assert!(!degenerate_sample(&square));
    }

    #[test]
    fn adaptive_iterations_shrink_with_inlier_ratio() {
        assert_eq!(adaptive_iterations(1.0, 0.995, 2000), 1);
        assert!(adaptive_iterations(0.8, 0.995, 2000) < adaptive_iterations(0.5, 0.995, 2000));
        assert_eq!(adaptive_iterations(0.0, 0.995, 2000), 2000);
    }
}
