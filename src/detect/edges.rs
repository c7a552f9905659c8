//! Canny edges and perimeter edge support.

use crate::image::filter::{gaussian_blur, sobel};
use crate::image::Plane;

/// Canny output together with the gradients it was computed from.
pub struct EdgeMap {
    /// 255 on edge pixels, 0 elsewhere.
    pub edges: Plane<u8>,
    pub dx: Plane<f32>,
    pub dy: Plane<f32>,
    /// Edge pixel coordinates in scan order.
    pub points: Vec<(usize, usize)>,
}

impl EdgeMap {
    #[inline]
    pub fn is_edge(&self, x: isize, y: isize) -> bool {
        self.edges.try_get(x, y).is_some_and(|v| v != 0)
    }
}

/// tan(22.5°) and tan(67.5°) split gradient directions into four sectors.
const TAN_22_5: f32 = 0.414_213_57;
const TAN_67_5: f32 = 2.414_213_6;

/// Canny edge detection on an 8-bit plane.
///
/// Magnitudes are L1 Sobel responses; `blur_sigma <= 0` skips smoothing.
pub fn canny(gray: &Plane<u8>, low: f32, high: f32, blur_sigma: f32) -> EdgeMap {
    let (width, height) = (gray.width(), gray.height());
    let mut src = gray.to_f32(1.0);
    if blur_sigma > 0.0 {
        src = gaussian_blur(&src, blur_sigma);
    }
    let (dx, dy) = sobel(&src);
    let mag: Vec<f32> = dx
        .data()
        .iter()
        .zip(dy.data())
        .map(|(gx, gy)| gx.abs() + gy.abs())
        .collect();
    let mag_at = |x: usize, y: usize| mag[y * width + x];

    // 0: suppressed, 1: weak candidate, 2: strong edge.
    let mut state = vec![0u8; width * height];
    let mut stack = Vec::new();
    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let m = mag_at(x, y);
            if m <= low {
                continue;
            }
            let gx = dx.get(x, y);
            let gy = dy.get(x, y);
            let (ax, ay) = (gx.abs(), gy.abs());
            let (prev, next) = if ay <= ax * TAN_22_5 {
                (mag_at(x - 1, y), mag_at(x + 1, y))
            } else if ay >= ax * TAN_67_5 {
                (mag_at(x, y - 1), mag_at(x, y + 1))
            } else if (gx > 0.0) == (gy > 0.0) {
                (mag_at(x - 1, y - 1), mag_at(x + 1, y + 1))
            } else {
                (mag_at(x + 1, y - 1), mag_at(x - 1, y + 1))
            };
            if m > prev && m >= next {
                let idx = y * width + x;
                if m > high {
                    state[idx] = 2;
                    stack.push(idx);
                } else {
                    state[idx] = 1;
                }
            }
        }
    }

    // Hysteresis: grow strong edges through 8-connected weak candidates.
    while let Some(idx) = stack.pop() {
        let (x, y) = ((idx % width) as isize, (idx / width) as isize);
        for oy in -1..=1isize {
            for ox in -1..=1isize {
                let (nx, ny) = (x + ox, y + oy);
                if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                    continue;
                }
                let n = ny as usize * width + nx as usize;
                if state[n] == 1 {
                    state[n] = 2;
                    stack.push(n);
                }
            }
        }
    }

    let mut points = Vec::new();
    let edges: Vec<u8> = state
        .iter()
        .enumerate()
        .map(|(idx, &s)| {
            if s == 2 {
                points.push((idx % width, idx / width));
                255
            } else {
                0
            }
        })
        .collect();
    EdgeMap {
        edges: Plane::from_raw(edges, width, height),
        dx,
        dy,
        points,
    }
}

/// Samples taken around a circle when measuring edge support.
const SUPPORT_SAMPLES: usize = 360;

/// Fraction of in-frame perimeter samples with an edge pixel within one
/// pixel. Circles with less than a quarter of their perimeter in frame score 0.
pub fn edge_support(edges: &EdgeMap, cx: f32, cy: f32, radius: f32) -> f32 {
    if radius <= 0.0 {
        return 0.0;
    }
    let (w, h) = (edges.edges.width() as f32, edges.edges.height() as f32);
    let mut inside = 0usize;
    let mut hits = 0usize;
    for i in 0..SUPPORT_SAMPLES {
        let theta = i as f32 * std::f32::consts::TAU / SUPPORT_SAMPLES as f32;
        let px = cx + radius * theta.cos();
        let py = cy + radius * theta.sin();
        if px < 0.0 || py < 0.0 || px > w - 1.0 || py > h - 1.0 {
            continue;
        }
        inside += 1;
        let (rx, ry) = (px.round() as isize, py.round() as isize);
        let hit = (-1..=1isize).any(|oy| (-1..=1isize).any(|ox| edges.is_edge(rx + ox, ry + oy)));
        if hit {
            hits += 1;
        }
    }
    if inside * 4 < SUPPORT_SAMPLES {
        return 0.0;
    }
    hits as f32 / inside as f32
}
