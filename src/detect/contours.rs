//! Border following (Suzuki–Abe) and polygon simplification.
//!
//! Used by the contour-based circle finder and by the shape selector.

use crate::image::Plane;

/// Integer pixel coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// One traced border.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contour {
    pub points: Vec<Point>,
    /// True when the border encloses a hole of its component.
    pub hole: bool,
}

/// 8-neighbourhood, counter-clockwise starting east (image y points down).
const NEIGHBORHOOD: [(i32, i32); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Labels of a zero-padded copy of the binary input: 0 background, 1 foreground.
struct Labels {
    cells: Vec<i32>,
    /// Flat offsets of the 8 neighbours, repeated so `s + 8` needs no wrap.
    deltas: [isize; 16],
}

impl Labels {
    fn new(binary: &Plane<u8>) -> Self {
        let stride = binary.width() + 2;
        let mut cells = vec![0i32; stride * (binary.height() + 2)];
        for y in 0..binary.height() {
            let dst = &mut cells[(y + 1) * stride + 1..(y + 1) * stride + 1 + binary.width()];
            for (d, &v) in dst.iter_mut().zip(binary.row(y)) {
                *d = i32::from(v != 0);
            }
        }
        let mut deltas = [0isize; 16];
        for (i, &(dx, dy)) in NEIGHBORHOOD.iter().enumerate() {
            let delta = dx as isize + dy as isize * stride as isize;
            deltas[i] = delta;
            deltas[i + 8] = delta;
        }
        Self { cells, deltas }
    }

    #[inline]
    fn at(&self, pos: usize, dir: usize) -> usize {
        (pos as isize + self.deltas[dir]) as usize
    }

    /// Traces one border starting at `start`, marking visited pixels with `±nbd`.
    fn follow(&mut self, start: usize, nbd: i32, mut point: Point, hole: bool) -> Contour {
        let mut points = Vec::new();
        let mut dir: usize = if hole { 0 } else { 4 };
        let first_dir = dir;

        // Clockwise search for the first foreground neighbour.
        let first_neighbor = loop {
            dir = dir.wrapping_sub(1) & 7;
            let n = self.at(start, dir);
            if self.cells[n] != 0 || dir == first_dir {
                break n;
            }
        };

        if self.cells[first_neighbor] == 0 {
            // Isolated pixel.
            self.cells[start] = -nbd;
            points.push(point);
            return Contour { points, hole };
        }

        let mut current = start;
        loop {
            let entry_dir = dir;
            let mut next;
            loop {
                dir = (dir + 1) & 15;
                next = self.at(current, dir);
                if self.cells[next] != 0 {
                    break;
                }
            }
            dir &= 7;

            // The east neighbour was examined and is background: right border.
            if (dir.wrapping_sub(1) as u32) < entry_dir as u32 {
                self.cells[current] = -nbd;
            } else if self.cells[current] == 1 {
                self.cells[current] = nbd;
            }

            points.push(point);
            point.x += NEIGHBORHOOD[dir].0;
            point.y += NEIGHBORHOOD[dir].1;

            if next == start && current == first_neighbor {
                break;
            }
            current = next;
            dir = (dir + 4) & 7;
        }
        Contour { points, hole }
    }
}

/// Finds every outer and hole border of the non-zero pixels in `binary`.
pub fn find_contours(binary: &Plane<u8>) -> Vec<Contour> {
    let (width, height) = (binary.width(), binary.height());
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let mut labels = Labels::new(binary);
    let stride = width + 2;
    let mut contours = Vec::new();
    let mut nbd = 1;

    for y in 0..height {
        for x in 0..width {
            let pos = (y + 1) * stride + x + 1;
            let pix = labels.cells[pos];
            if pix == 0 {
                continue;
            }
            let outer = pix == 1 && labels.cells[pos - 1] == 0;
            let hole = !outer && pix >= 1 && labels.cells[pos + 1] == 0;
            if outer || hole {
                nbd += 1;
                let start = Point::new(x as i32, y as i32);
                contours.push(labels.follow(pos, nbd, start, hole));
            }
        }
    }
    contours
}

/// Length of the polyline through `points`; `closed` adds the last-to-first edge.
pub fn arc_length(points: &[Point], closed: bool) -> f64 {
    let segment = |a: &Point, b: &Point| {
        let dx = f64::from(a.x - b.x);
        let dy = f64::from(a.y - b.y);
        (dx * dx + dy * dy).sqrt()
    };
    let open: f64 = points.windows(2).map(|w| segment(&w[0], &w[1])).sum();
    match (closed, points.first(), points.last()) {
        (true, Some(first), Some(last)) if points.len() > 1 => open + segment(last, first),
        _ => open,
    }
}

/// Douglas–Peucker simplification with tolerance `epsilon` (pixels).
///
/// Closed curves are split at the point farthest from the first point.
pub fn approx_poly_dp(points: &[Point], epsilon: f64, closed: bool) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let mut chain = points.to_vec();
    let mut keep = vec![false; chain.len() + usize::from(closed)];
    let mut stack = Vec::new();

    if closed {
        chain.push(points[0]);
        let far = farthest_from(&chain[..points.len()], points[0]);
        if far == 0 {
            return vec![points[0]];
        }
        keep[far] = true;
        stack.push((0, far));
        stack.push((far, chain.len() - 1));
    } else {
        stack.push((0, chain.len() - 1));
    }
    keep[0] = true;
    let last = chain.len() - 1;
    keep[last] = true;

    while let Some((a, b)) = stack.pop() {
        if b <= a + 1 {
            continue;
        }
        let (idx, dist) = farthest_from_line(&chain, a, b);
        if dist > epsilon {
            keep[idx] = true;
            stack.push((a, idx));
            stack.push((idx, b));
        }
    }

    let end = if closed { chain.len() - 1 } else { chain.len() };
    chain[..end]
        .iter()
        .zip(keep.iter())
        .filter_map(|(p, &k)| k.then_some(*p))
        .collect()
}

fn farthest_from(points: &[Point], origin: Point) -> usize {
    let mut best = (0usize, 0i64);
    for (i, p) in points.iter().enumerate() {
        let dx = i64::from(p.x - origin.x);
        let dy = i64::from(p.y - origin.y);
        let d = dx * dx + dy * dy;
        if d > best.1 {
            best = (i, d);
        }
    }
    best.0
}

/// Index and distance of the point in `(a, b)` farthest from line `a-b`.
fn farthest_from_line(chain: &[Point], a: usize, b: usize) -> (usize, f64) {
    let (pa, pb) = (chain[a], chain[b]);
    let dx = f64::from(pb.x - pa.x);
    let dy = f64::from(pb.y - pa.y);
    let norm = (dx * dx + dy * dy).sqrt();
    let mut best = (a + 1, -1.0f64);
    for (i, p) in chain.iter().enumerate().take(b).skip(a + 1) {
        let px = f64::from(p.x - pa.x);
        let py = f64::from(p.y - pa.y);
        let d = if norm > 0.0 {
            (px * dy - py * dx).abs() / norm
        } else {
            (px * px + py * py).sqrt()
        };
        if d > best.1 {
            best = (i, d);
        }
    }
    best
}
