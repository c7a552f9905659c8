//! Algebraic (Kåsa) circle fitting.

use nalgebra::{Matrix3, Vector3};

/// Sub-pixel circle in working-image coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CircleFit {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

/// Least-squares circle through `points`.
///
/// Minimises `sum (x^2 + y^2 + D x + E y + F)^2` on mean-centred data.
/// Returns `None` for fewer than three points or collinear input.
pub fn fit_circle(points: &[(f32, f32)]) -> Option<CircleFit> {
    if points.len() < 3 {
        return None;
    }
    let n = points.len() as f64;
    let (mx, my) = points.iter().fold((0.0f64, 0.0f64), |(sx, sy), &(x, y)| {
        (sx + f64::from(x), sy + f64::from(y))
    });
    let (mx, my) = (mx / n, my / n);

    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();
    for &(x, y) in points {
        let u = f64::from(x) - mx;
        let v = f64::from(y) - my;
        let row = Vector3::new(u, v, 1.0);
        ata += row * row.transpose();
        atb -= row * (u * u + v * v);
    }
    let scale = ata.norm();
    if ata.determinant().abs() <= 1e-12 * scale * scale * scale {
        return None;
    }
    let sol = ata.try_inverse()? * atb;
    let (cu, cv) = (-sol[0] / 2.0, -sol[1] / 2.0);
    let r2 = cu * cu + cv * cv - sol[2];
    if !r2.is_finite() || r2 <= 0.0 {
        return None;
    }
    Some(CircleFit {
        x: (cu + mx) as f32,
        y: (cv + my) as f32,
        radius: r2.sqrt() as f32,
    })
}

/// Refits `initial` on the points within `band` pixels of its perimeter.
///
/// Runs `rounds` times; keeps the last valid fit.
pub fn refine_circle(
    points: &[(usize, usize)],
    initial: CircleFit,
    band: f32,
    rounds: usize,
) -> CircleFit {
    let mut current = initial;
    let mut near = Vec::new();
    for _ in 0..rounds {
        near.clear();
        near.extend(points.iter().filter_map(|&(x, y)| {
            let (px, py) = (x as f32, y as f32);
            let d = ((px - current.x).powi(2) + (py - current.y).powi(2)).sqrt();
            ((d - current.radius).abs() <= band).then_some((px, py))
        }));
        if near.len() < 8 {
            break;
        }
        match fit_circle(&near) {
            Some(fit) => current = fit,
            None => break,
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_circle_is_recovered() {
        let pts: Vec<(f32, f32)> = (0..40)
            .map(|i| {
                let t = i as f32 * std::f32::consts::TAU / 40.0;
                (50.0 + 12.5 * t.cos(), -7.0 + 12.5 * t.sin())
            })
            .collect();
        let fit = fit_circle(&pts).unwrap();
        assert!((fit.x - 50.0).abs() < 1e-3);
        assert!((fit.y + 7.0).abs() < 1e-3);
        assert!((fit.radius - 12.5).abs() < 1e-3);
    }

    #[test]
    fn collinear_points_do_not_fit() {
        let pts = [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)];
        assert!(fit_circle(&pts).is_none());
        assert!(fit_circle(&pts[..2]).is_none());
    }

    #[test]
    fn refine_ignores_far_outliers() {
        let mut pts: Vec<(usize, usize)> = (0..90)
            .map(|i| {
                let t = i as f32 * std::f32::consts::TAU / 90.0;
                ((60.0 + 30.0 * t.cos()).round() as usize, (60.0 + 30.0 * t.sin()).round() as usize)
            })
            .collect();
        pts.extend([(2, 2), (110, 5), (3, 115)]);
        let start = CircleFit { x: 62.0, y: 58.0, radius: 29.0 };
        let fit = refine_circle(&pts, start, 4.0, 3);
        assert!((fit.x - 60.0).abs() < 0.5);
        assert!((fit.y - 60.0).abs() < 0.5);
        assert!((fit.radius - 30.0).abs() < 0.5);
    }
}
