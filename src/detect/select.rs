//! Candidate selection heuristics used between detector iterations.

use super::contours::{approx_poly_dp, arc_length, find_contours};
use super::CircleCandidate;
use crate::image::Plane;
use crate::preprocess::circle_brightness_perc;
use crate::region::cut_plane_from_circle;

/// Circles holding this much of the frame's light are rejected: they cover
/// the whole frame rather than a moon inside it.
pub const MAX_BRIGHTNESS_PERC: f32 = 0.98;

/// The `n` largest circles, largest first; equal radii keep input order.
pub fn select_n_by_largest_radius(candidates: &[CircleCandidate], n: usize) -> Vec<CircleCandidate> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| b.radius.total_cmp(&a.radius));
    sorted.truncate(n);
    sorted
}

pub fn select_by_largest_radius(candidates: &[CircleCandidate]) -> Option<CircleCandidate> {
    select_n_by_largest_radius(candidates, 1).into_iter().next()
}

/// The `n` brightest circles below [`MAX_BRIGHTNESS_PERC`], brightest first.
pub fn select_n_by_brightness_perc(
    image: &Plane<u8>,
    candidates: &[CircleCandidate],
    n: usize,
) -> Vec<CircleCandidate> {
    let mut scored: Vec<(f32, CircleCandidate)> = candidates
        .iter()
        .map(|c| (circle_brightness_perc(image, &c.circle()), *c))
        .filter(|(b, _)| *b < MAX_BRIGHTNESS_PERC)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(n).map(|(_, c)| c).collect()
}

/// Brightest circle below [`MAX_BRIGHTNESS_PERC`]; the first one wins ties.
pub fn select_by_brightness_perc(
    image: &Plane<u8>,
    candidates: &[CircleCandidate],
) -> Option<CircleCandidate> {
    let mut best: Option<(f32, CircleCandidate)> = None;
    for cand in candidates {
        let b = circle_brightness_perc(image, &cand.circle());
        if b >= MAX_BRIGHTNESS_PERC {
            continue;
        }
        if best.map_or(true, |(bb, _)| b > bb) {
            best = Some((b, *cand));
        }
    }
    best.map(|(_, c)| c)
}

/// Number of polygon vertices needed to outline the crop around `cand`.
fn shape_score(image: &Plane<u8>, cand: &CircleCandidate) -> usize {
    let Ok((crop, _)) = cut_plane_from_circle(image, &cand.circle(), 0) else {
        return 0;
    };
    find_contours(&crop)
        .iter()
        .map(|contour| {
            let eps = 0.01 * arc_length(&contour.points, true);
            approx_poly_dp(&contour.points, eps, true).len()
        })
        .max()
        .unwrap_or(0)
}

/// Circle whose crop has the most rounded outline, i.e. the most polygon
/// vertices after simplification; the first one wins ties.
pub fn select_by_shape(image: &Plane<u8>, candidates: &[CircleCandidate]) -> Option<CircleCandidate> {
    let mut best: Option<(usize, CircleCandidate)> = None;
    for cand in candidates {
        let score = shape_score(image, cand);
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, *cand));
        }
    }
    best.map(|(_, c)| c)
}

/// Picks between two finders' choices: the clearly more confident one, or the
/// larger when confidences are within `tolerance`. `a` wins exact ties.
pub fn select_by_confidence(
    a: Option<CircleCandidate>,
    b: Option<CircleCandidate>,
    tolerance: f32,
) -> Option<CircleCandidate> {
    match (a, b) {
        (Some(a), Some(b)) => {
            if (a.confidence - b.confidence).abs() <= tolerance {
                Some(if b.radius > a.radius { b } else { a })
            } else if b.confidence > a.confidence {
                Some(b)
            } else {
                Some(a)
            }
        }
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::HoughCirclesAlgorithm;

    fn cand(x: f32, y: f32, radius: f32, confidence: f32) -> CircleCandidate {
        CircleCandidate {
            x,
            y,
            radius,
            confidence,
            source: HoughCirclesAlgorithm::HoughGradient,
        }
    }

    #[test]
    fn largest_radius_ordering_is_stable() {
        let c = [cand(1.0, 1.0, 5.0, 1.0), cand(2.0, 2.0, 9.0, 1.0), cand(3.0, 3.0, 5.0, 1.0)];
        let top = select_n_by_largest_radius(&c, 2);
        assert_eq!(top, vec![c[1], c[0]]);
        assert_eq!(select_by_largest_radius(&[]), None);
    }

    #[test]
    fn frame_filling_circle_is_skipped() {
        let plane = Plane::new(20, 20, 255u8);
        let whole = cand(10.0, 10.0, 30.0, 1.0);
        let part = cand(10.0, 10.0, 4.0, 1.0);
        assert_eq!(select_by_brightness_perc(&plane, &[whole, part]), Some(part));
        assert_eq!(select_n_by_brightness_perc(&plane, &[whole, part], 5), vec![part]);
    }

    #[test]
    fn round_blob_beats_square_blob() {
        let mut plane = Plane::new(120, 60, 0u8);
        for y in 10..50 {
            for x in 10..50 {
                plane.set(x, y, 255);
            }
        }
        for y in 0..60 {
            for x in 60..120 {
                if (x as f32 - 90.0).powi(2) + (y as f32 - 30.0).powi(2) <= 18.0 * 18.0 {
                    plane.set(x, y, 255);
                }
            }
        }
        let square = cand(30.0, 30.0, 25.0, 1.0);
        let round = cand(90.0, 30.0, 25.0, 1.0);
        assert_eq!(select_by_shape(&plane, &[square, round]), Some(round));
    }

    #[test]
    fn confidence_tie_prefers_larger_radius() {
        let a = cand(0.0, 0.0, 10.0, 0.90);
        let b = cand(0.0, 0.0, 12.0, 0.93);
        assert_eq!(select_by_confidence(Some(a), Some(b), 0.05), Some(b));
        let c = cand(0.0, 0.0, 20.0, 0.5);
        assert_eq!(select_by_confidence(Some(a), Some(c), 0.05), Some(a));
        assert_eq!(select_by_confidence(None, Some(c), 0.05), Some(c));
    }
}
