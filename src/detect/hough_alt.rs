//! Contour-based circle finder.
//!
//! Each traced edge contour gets a least-squares circle; circles whose
//! perimeter is well covered by edges (`min_perfectness`) are kept and
//! candidates closer than `min_dist` are merged, keeping the better one.

use super::contours::find_contours;
use super::edges::{edge_support, EdgeMap};
use super::fit::{fit_circle, refine_circle};
use super::hough::radius_range;
use super::steps::DetectionParams;
use super::{CircleCandidate, HoughCirclesAlgorithm};
use crate::trace::{trace_event, trace_span};
use crate::util::{MoonRegError, MoonRegResult};

/// Contours shorter than this are not fitted.
const MIN_CONTOUR_POINTS: usize = 16;

pub(crate) fn hough_gradient_alt(
    edges: &EdgeMap,
    params: &DetectionParams,
) -> MoonRegResult<Vec<CircleCandidate>> {
    let (width, height) = (edges.edges.width(), edges.edges.height());
    let _span = trace_span!("hough_gradient_alt", width = width, height = height).entered();
    let (min_r, max_r) = radius_range(params, width, height);
    let band = params.dp.max(2.0);

    let mut raw = Vec::new();
    for contour in find_contours(&edges.edges) {
        if contour.points.len() < MIN_CONTOUR_POINTS {
            continue;
        }
        let pts: Vec<(f32, f32)> = contour
            .points
            .iter()
            .map(|p| (p.x as f32, p.y as f32))
            .collect();
        let Some(fit) = fit_circle(&pts) else { continue };
        let fit = refine_circle(&edges.points, fit, band, 2);
        let in_frame = fit.x >= 0.0 && fit.y >= 0.0 && fit.x < width as f32 && fit.y < height as f32;
        if !in_frame || fit.radius < min_r || fit.radius > max_r {
            continue;
        }
        let support = edge_support(edges, fit.x, fit.y, fit.radius);
        if support < params.min_perfectness {
            continue;
        }
        raw.push(CircleCandidate {
            x: fit.x,
            y: fit.y,
            radius: fit.radius,
            confidence: support,
            source: HoughCirclesAlgorithm::HoughGradientAlt,
        });
    }

    raw.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(b.radius.total_cmp(&a.radius))
    });
    let min_dist2 = params.min_dist * params.min_dist;
    let mut found: Vec<CircleCandidate> = Vec::new();
    for cand in raw {
        let close = found
            .iter()
            .any(|c| (c.x - cand.x).powi(2) + (c.y - cand.y).powi(2) < min_dist2);
        if !close {
            found.push(cand);
        }
    }
    if found.len() >= params.circle_threshold {
        return Err(MoonRegError::detection(format!(
            "found {} circles, threshold is {}",
            found.len(),
            params.circle_threshold
        )));
    }
    trace_event!("hough_gradient_alt_done", circles = found.len());
    Ok(found)
}
