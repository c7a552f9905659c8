//! Gradient Hough transform for circles.
//!
//! Every edge pixel votes for centres along its gradient line (both ways)
//! between the minimum and maximum radius. Accumulator peaks are refined with
//! a radius histogram and a least-squares fit on nearby edges.

use super::edges::{edge_support, EdgeMap};
use super::fit::{refine_circle, CircleFit};
use super::steps::DetectionParams;
use super::{CircleCandidate, HoughCirclesAlgorithm};
use crate::trace::{trace_event, trace_span};
use crate::util::{MoonRegError, MoonRegResult};

/// Minimum fraction of the perimeter backed by edges.
pub(crate) const MIN_SUPPORT: f32 = 0.3;
/// Accumulator peaks examined per call, strongest first.
const MAX_PEAKS: usize = 400;

struct Accumulator {
    votes: Vec<u32>,
    width: usize,
    height: usize,
    dp: f32,
}

impl Accumulator {
    fn new(image_width: usize, image_height: usize, dp: f32) -> Self {
        let width = ((image_width as f32 / dp).ceil() as usize).max(1);
        let height = ((image_height as f32 / dp).ceil() as usize).max(1);
        Self {
            votes: vec![0; width * height],
            width,
            height,
            dp,
        }
    }

    fn cell(&self, x: f32, y: f32) -> Option<usize> {
        let (ax, ay) = ((x / self.dp) as usize, (y / self.dp) as usize);
        (ax < self.width && ay < self.height).then_some(ay * self.width + ax)
    }

    /// 3x3 box sum of the raw votes.
    fn smoothed(&self) -> Vec<u32> {
        let (w, h) = (self.width, self.height);
        let mut out = vec![0u32; w * h];
        for y in 0..h {
            for x in 0..w {
                let mut sum = 0;
                for ny in y.saturating_sub(1)..(y + 2).min(h) {
                    for nx in x.saturating_sub(1)..(x + 2).min(w) {
                        sum += self.votes[ny * w + nx];
                    }
                }
                out[y * w + x] = sum;
            }
        }
        out
    }

    /// Local maxima of `smoothed` with at least `threshold` votes, strongest
    /// first. Plateaus keep their first cell in scan order.
    fn peaks(&self, smoothed: &[u32], threshold: u32) -> Vec<usize> {
        let (w, h) = (self.width as isize, self.height as isize);
        let mut peaks = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) as usize;
                let v = smoothed[idx];
                if v == 0 || v < threshold {
                    continue;
                }
                let mut is_peak = true;
                'scan: for oy in -1..=1isize {
                    for ox in -1..=1isize {
                        let (nx, ny) = (x + ox, y + oy);
                        if (ox == 0 && oy == 0) || nx < 0 || ny < 0 || nx >= w || ny >= h {
                            continue;
                        }
                        let n = (ny * w + nx) as usize;
                        let before = n < idx;
                        if (before && smoothed[n] >= v) || (!before && smoothed[n] > v) {
                            is_peak = false;
                            break 'scan;
                        }
                    }
                }
                if is_peak {
                    peaks.push(idx);
                }
            }
        }
        peaks.sort_by(|&a, &b| smoothed[b].cmp(&smoothed[a]).then(a.cmp(&b)));
        peaks.truncate(MAX_PEAKS);
        peaks
    }

    /// Vote-weighted centre of the 3x3 cells around `idx`, in pixels.
    fn centroid(&self, idx: usize) -> (f32, f32) {
        let (cx, cy) = (idx % self.width, idx / self.width);
        let (mut sx, mut sy, mut sw) = (0.0f32, 0.0f32, 0.0f32);
        for y in cy.saturating_sub(1)..(cy + 2).min(self.height) {
            for x in cx.saturating_sub(1)..(cx + 2).min(self.width) {
                let v = self.votes[y * self.width + x] as f32;
                sx += v * (x as f32 + 0.5);
                sy += v * (y as f32 + 0.5);
                sw += v;
            }
        }
        if sw == 0.0 {
            return ((cx as f32 + 0.5) * self.dp, (cy as f32 + 0.5) * self.dp);
        }
        (sx / sw * self.dp, sy / sw * self.dp)
    }
}

/// Radius range actually searched for a `width x height` frame.
pub(crate) fn radius_range(params: &DetectionParams, width: usize, height: usize) -> (f32, f32) {
    let min_r = params.min_radius.max(1.0);
    let max_r = if params.max_radius > 0.0 {
        params.max_radius
    } else {
        width.max(height) as f32
    };
    (min_r, max_r.max(min_r + 1.0))
}

/// Most populated 1 px distance bin (3-bin smoothed) around `(cx, cy)`.
fn best_radius(edges: &EdgeMap, cx: f32, cy: f32, min_r: f32, max_r: f32) -> Option<f32> {
    let bins = (max_r - min_r).ceil() as usize + 1;
    let mut hist = vec![0u32; bins];
    for &(x, y) in &edges.points {
        let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
        if d >= min_r && d <= max_r {
            hist[((d - min_r) as usize).min(bins - 1)] += 1;
        }
    }
    let mut best: Option<(usize, u32)> = None;
    for i in 0..bins {
        let score = hist[i] + if i > 0 { hist[i - 1] } else { 0 } + hist.get(i + 1).copied().unwrap_or(0);
        if score > 0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| min_r + i as f32 + 0.5)
}

/// Circle candidates from the gradient Hough transform.
///
/// Fails with `DetectionError` when `params.circle_threshold` circles or
/// more survive.
pub(crate) fn hough_gradient(
    edges: &EdgeMap,
    params: &DetectionParams,
) -> MoonRegResult<Vec<CircleCandidate>> {
    let (width, height) = (edges.edges.width(), edges.edges.height());
    let _span = trace_span!("hough_gradient", width = width, height = height).entered();
    let dp = params.dp.max(1.0);
    let (min_r, max_r) = radius_range(params, width, height);

    let mut acc = Accumulator::new(width, height, dp);
    for &(x, y) in &edges.points {
        let gx = edges.dx.get(x, y);
        let gy = edges.dy.get(x, y);
        let norm = (gx * gx + gy * gy).sqrt();
        if norm < 1e-6 {
            continue;
        }
        let (ux, uy) = (gx / norm, gy / norm);
        for sign in [1.0f32, -1.0] {
            let mut last = usize::MAX;
            let mut r = min_r;
            while r <= max_r {
                let cx = x as f32 + sign * r * ux;
                let cy = y as f32 + sign * r * uy;
                if cx < 0.0 || cy < 0.0 {
                    break;
                }
                let Some(cell) = acc.cell(cx, cy) else { break };
                if cell != last {
                    acc.votes[cell] += 1;
                    last = cell;
                }
                r += dp;
            }
        }
    }

    let smoothed = acc.smoothed();
    let peaks = acc.peaks(&smoothed, params.param2.max(1.0) as u32);
    let band = dp.max(2.0);
    let min_dist2 = params.min_dist * params.min_dist;
    let far_enough = |found: &[CircleCandidate], x: f32, y: f32| {
        found
            .iter()
            .all(|c| (c.x - x).powi(2) + (c.y - y).powi(2) >= min_dist2)
    };

    let mut found: Vec<CircleCandidate> = Vec::new();
    for idx in peaks {
        let (cx, cy) = acc.centroid(idx);
        if !far_enough(&found, cx, cy) {
            continue;
        }
        let Some(radius) = best_radius(edges, cx, cy, min_r, max_r) else {
            continue;
        };
        let fit = refine_circle(&edges.points, CircleFit { x: cx, y: cy, radius }, band, 3);
        let in_frame = fit.x >= 0.0 && fit.y >= 0.0 && fit.x < width as f32 && fit.y < height as f32;
        if !in_frame || fit.radius < min_r * 0.8 || fit.radius > max_r * 1.2 {
            continue;
        }
        if !far_enough(&found, fit.x, fit.y) {
            continue;
        }
        let support = edge_support(edges, fit.x, fit.y, fit.radius);
        if support < MIN_SUPPORT {
            continue;
        }
        found.push(CircleCandidate {
            x: fit.x,
            y: fit.y,
            radius: fit.radius,
            confidence: support,
            source: HoughCirclesAlgorithm::HoughGradient,
        });
        if found.len() >= params.circle_threshold {
            return Err(MoonRegError::detection(format!(
                "found at least {} circles",
                params.circle_threshold
            )));
        }
    }
    trace_event!("hough_gradient_done", circles = found.len());
    Ok(found)
}
