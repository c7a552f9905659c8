//! Small numeric helpers shared by the detectors and matchers.

/// Wraps an angle in degrees to the range [0, 360).
pub(crate) fn wrap_deg(angle_deg: f32) -> f32 {
    let wrapped = angle_deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Hamming distance between two packed bit strings of equal length.
pub(crate) fn hamming(a: &[u8], b: &[u8]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x ^ y).count_ones())
        .sum()
}

/// Euclidean distance between two float descriptors.
pub(crate) fn l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Rounds to the nearest integer, half away from zero.
pub(crate) fn round_i32(value: f32) -> i32 {
    value.round() as i32
}

/// Clamps and rounds a float to a byte.
pub(crate) fn saturate_u8(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}
