//! FAST-9 corner test, score and Harris response.

use crate::image::Plane;

/// Bresenham circle of radius 3, clockwise from north.
pub(crate) const CIRCLE: [(isize, isize); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Contiguous arc length required for a corner.
const ARC: usize = 9;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Corner {
    pub x: usize,
    pub y: usize,
    pub score: f32,
}

/// FAST score at `(x, y)`: sum of `max(|p - c| - t, 0)` over the circle, or
/// `None` when the pixel is not a corner. Callers keep 3 px from the border.
pub(crate) fn fast_score(plane: &Plane<u8>, x: usize, y: usize, threshold: u8) -> Option<f32> {
    let c = i32::from(plane.get(x, y));
    let t = i32::from(threshold);
    let mut ring = [0i32; 16];
    for (v, &(dx, dy)) in ring.iter_mut().zip(CIRCLE.iter()) {
        *v = i32::from(plane.get((x as isize + dx) as usize, (y as isize + dy) as usize));
    }

    // Pixels 0, 4, 8, 12: an arc of 9 covers at least two of them.
    let quick_bright = [0, 4, 8, 12].iter().filter(|&&i| ring[i] > c + t).count();
    let quick_dark = [0, 4, 8, 12].iter().filter(|&&i| ring[i] < c - t).count();
    if quick_bright < 2 && quick_dark < 2 {
        return None;
    }

    let (mut bright_run, mut dark_run) = (0usize, 0usize);
    let mut is_corner = false;
    for i in 0..16 + ARC - 1 {
        let p = ring[i % 16];
        if p > c + t {
            bright_run += 1;
            dark_run = 0;
        } else if p < c - t {
            dark_run += 1;
            bright_run = 0;
        } else {
            bright_run = 0;
            dark_run = 0;
        }
        if bright_run >= ARC || dark_run >= ARC {
            is_corner = true;
            break;
        }
    }
    if !is_corner {
        return None;
    }
    let score = ring.iter().map(|&p| ((p - c).abs() - t).max(0)).sum::<i32>();
    Some(score as f32)
}

/// Score plane (0 where no corner) over the pixels at least `border` from the
/// image edge; `border` is raised to 3.
pub(crate) fn score_plane(plane: &Plane<u8>, threshold: u8, border: usize) -> Plane<f32> {
    let (w, h) = (plane.width(), plane.height());
    let border = border.max(3);
    let mut scores = Plane::new(w, h, 0.0f32);
    if w <= 2 * border || h <= 2 * border {
        return scores;
    }
    for y in border..h - border {
        for x in border..w - border {
            if let Some(s) = fast_score(plane, x, y, threshold) {
                scores.set(x, y, s);
            }
        }
    }
    scores
}

/// FAST-9 corners with 3x3 non-maximum suppression on the score.
pub(crate) fn detect(plane: &Plane<u8>, threshold: u8, border: usize) -> Vec<Corner> {
    let scores = score_plane(plane, threshold, border);
    let (w, h) = (plane.width(), plane.height());
    let mut corners = Vec::new();
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let s = scores.get(x, y);
            if s <= 0.0 {
                continue;
            }
            // Ties go to the first pixel in scan order.
            let is_max = (-1..=1isize).all(|oy| {
                (-1..=1isize).all(|ox| {
                    if ox == 0 && oy == 0 {
                        return true;
                    }
                    let n = scores.get((x as isize + ox) as usize, (y as isize + oy) as usize);
                    if oy < 0 || (oy == 0 && ox < 0) {
                        s > n
                    } else {
                        s >= n
                    }
                })
            });
            if is_max {
                corners.push(Corner { x, y, score: s });
            }
        }
    }
    corners
}

/// Harris corner measure `det(M) - k tr(M)^2` over a `block x block` window
/// of central-difference gradients. The window is clamped to the image.
pub(crate) fn harris_response(plane: &Plane<u8>, x: usize, y: usize, block: usize) -> f32 {
    const K: f32 = 0.04;
    let r = (block / 2) as isize;
    let (mut sxx, mut syy, mut sxy) = (0.0f32, 0.0f32, 0.0f32);
    for oy in -r..=r {
        for ox in -r..=r {
            let (px, py) = (x as isize + ox, y as isize + oy);
            let gx = (f32::from(plane.get_clamped(px + 1, py)) - f32::from(plane.get_clamped(px - 1, py))) * 0.5;
            let gy = (f32::from(plane.get_clamped(px, py + 1)) - f32::from(plane.get_clamped(px, py - 1))) * 0.5;
            sxx += gx * gx;
            syy += gy * gy;
            sxy += gx * gy;
        }
    }
    let norm = 1.0 / (255.0 * (block * block) as f32);
    let (sxx, syy, sxy) = (sxx * norm, syy * norm, sxy * norm);
    sxx * syy - sxy * sxy - K * (sxx + syy) * (sxx + syy)
}

/// Offset of the vertex of the parabola through `(-1, left)`, `(0, center)`
/// and `(1, right)`, clamped to half a pixel. Zero when `center` is not a
/// maximum.
pub(crate) fn parabolic_offset(left: f32, center: f32, right: f32) -> f32 {
    let curvature = left - 2.0 * center + right;
    if curvature >= 0.0 || !curvature.is_finite() {
        return 0.0;
    }
    (0.5 * (left - right) / curvature).clamp(-0.5, 0.5)
}

/// Sub-pixel corner position from a separable parabola fit of the Harris
/// response around `(x, y)`.
pub(crate) fn refine_corner(plane: &Plane<u8>, x: usize, y: usize, block: usize) -> (f32, f32) {
    let at = |dx: isize, dy: isize| {
        let (px, py) = (x as isize + dx, y as isize + dy);
        if px < 0 || py < 0 || px as usize >= plane.width() || py as usize >= plane.height() {
            return f32::NEG_INFINITY;
        }
        harris_response(plane, px as usize, py as usize, block)
    };
    let center = at(0, 0);
    let ox = parabolic_offset(at(-1, 0), center, at(1, 0));
    let oy = parabolic_offset(at(0, -1), center, at(0, 1));
    (x as f32 + ox, y as f32 + oy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bright_square() -> Plane<u8> {
        let mut plane = Plane::new(30, 30, 20u8);
        for y in 10..30 {
            for x in 10..30 {
                plane.set(x, y, 200);
            }
        }
        plane
    }

    #[test]
    fn flat_region_is_not_a_corner() {
        let plane = Plane::new(10, 10, 100u8);
        assert_eq!(fast_score(&plane, 5, 5, 20), None);
    }

    #[test]
    fn square_corner_is_detected_once() {
        let corners = detect(&bright_square(), 20, 3);
        assert_eq!(corners.len(), 1);
        let c = corners[0];
        assert!(c.x.abs_diff(10) <= 1 && c.y.abs_diff(10) <= 1, "{c:?}");
        assert!(c.score > 0.0);
    }

    #[test]
    fn straight_edge_is_not_a_corner() {
        let mut plane = Plane::new(20, 20, 20u8);
        for y in 0..20 {
            for x in 10..20 {
                plane.set(x, y, 200);
            }
        }
        assert!(detect(&plane, 20, 3).is_empty());
    }

    #[test]
    fn parabola_vertex_follows_the_stronger_side() {
        assert_eq!(parabolic_offset(1.0, 2.0, 1.0), 0.0);
        let o = parabolic_offset(1.5, 2.0, 1.0);
        assert!(o < 0.0 && o > -0.5, "{o}");
        assert_eq!(parabolic_offset(1.0, 0.5, 1.0), 0.0);
        assert_eq!(parabolic_offset(f32::NEG_INFINITY, 2.0, 1.0), 0.0);
    }

    #[test]
    fn refined_corner_stays_within_half_a_pixel() {
        let plane = bright_square();
        let (x, y) = refine_corner(&plane, 10, 10, 7);
        assert!((x - 10.0).abs() <= 0.5 && (y - 10.0).abs() <= 0.5, "({x}, {y})");
    }

    #[test]
    fn harris_prefers_corners_over_edges() {
        let plane = bright_square();
        let corner = harris_response(&plane, 10, 10, 7);
        let edge = harris_response(&plane, 20, 10, 7);
        assert!(corner > edge);
    }
}
