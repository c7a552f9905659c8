//! Disc detection on synthetic frames described by a JSON manifest.

use moonreg::detect::CircleCandidate;
use moonreg::preprocess::ImageShape;
use moonreg::{
    cut_image_from_circle, detect_moon, Circle, DetectionParams, DetectionSteps, DetectorConfig,
    HoughCirclesAlgorithm, Image, MoonDetector, MoonRegError,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Centre tolerance in pixels.
const CENTER_TOLERANCE_PX: i32 = 3;
/// Brightness factor inside a mare.
const MARE_DIMMING: f32 = 0.65;
const STAR_VALUE: u8 = 255;

#[derive(Debug, Deserialize)]
struct DiscCase {
    case_id: String,
    width: usize,
    height: usize,
    channels: usize,
    x: i32,
    y: i32,
    radius: i32,
    intensity: u8,
    background: u8,
    /// Linear limb darkening coefficient; 0 renders a flat disc.
    #[serde(default)]
    limb_darkening: f32,
    /// Number of darker round maria inside the disc.
    #[serde(default)]
    maria: usize,
    /// Number of 2x2 stars scattered outside the disc.
    #[serde(default)]
    stars: usize,
    #[serde(default)]
    seed: u64,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    cases: Vec<DiscCase>,
}

fn load_manifest() -> Manifest {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/synthetic_discs.json");
    let text = fs::read_to_string(&path).expect("read manifest");
    serde_json::from_str(&text).expect("parse manifest")
}

fn render(case: &DiscCase) -> Image {
    let mut rng = StdRng::seed_from_u64(case.seed);
    let (cx, cy, r) = (case.x as f32, case.y as f32, case.radius as f32);
    let maria: Vec<(f32, f32, f32)> = (0..case.maria)
        .map(|_| {
            let angle = rng.random_range(0.0f32..std::f32::consts::TAU);
            let dist = rng.random_range(0.0f32..0.55) * r;
            let radius = rng.random_range(0.1f32..0.3) * r;
            (cx + dist * angle.cos(), cy + dist * angle.sin(), radius)
        })
        .collect();

    let mut image = Image::zeros(case.width, case.height, case.channels).unwrap();
    for y in 0..case.height {
        for x in 0..case.width {
            let (fx, fy) = (x as f32, y as f32);
            let d2 = (fx - cx).powi(2) + (fy - cy).powi(2);
            let value = if d2 <= r * r {
                let mu = (1.0 - d2 / (r * r)).max(0.0).sqrt();
                let mut v = f32::from(case.intensity) * (1.0 - case.limb_darkening * (1.0 - mu));
                if maria
                    .iter()
                    .any(|&(mx, my, mr)| (fx - mx).powi(2) + (fy - my).powi(2) <= mr * mr)
                {
                    v *= MARE_DIMMING;
                }
                v.round() as u8
            } else {
                case.background
            };
            let px = image.pixel_mut(x, y);
            for (c, v) in px.iter_mut().enumerate() {
                *v = if c == 3 { 255 } else { value };
            }
        }
    }

    for _ in 0..case.stars {
        let sx = rng.random_range(0..case.width - 1);
        let sy = rng.random_range(0..case.height - 1);
        if ((sx as f32 - cx).powi(2) + (sy as f32 - cy).powi(2)).sqrt() < r + 10.0 {
            continue;
        }
        for (x, y) in [(sx, sy), (sx + 1, sy), (sx, sy + 1), (sx + 1, sy + 1)] {
            let px = image.pixel_mut(x, y);
            for (c, v) in px.iter_mut().enumerate() {
                *v = if c == 3 { 255 } else { STAR_VALUE };
            }
        }
    }
    image
}

fn supported_algorithms() -> Vec<HoughCirclesAlgorithm> {
    HoughCirclesAlgorithm::ALL
        .into_iter()
        .filter(|a| a.is_supported())
        .collect()
}

fn assert_close(case: &DiscCase, found: Circle, alg: HoughCirclesAlgorithm) {
    let radius_tol = (case.radius / 25).max(CENTER_TOLERANCE_PX);
    assert!(
        found.is_valid(),
        "{} / {alg}: no moon found",
        case.case_id
    );
    assert!(
        (found.x - case.x).abs() <= CENTER_TOLERANCE_PX
            && (found.y - case.y).abs() <= CENTER_TOLERANCE_PX,
        "{} / {alg}: centre {found} too far from ({}, {})",
        case.case_id,
        case.x,
        case.y
    );
    assert!(
        (found.radius - case.radius).abs() <= radius_tol,
        "{} / {alg}: radius {} vs {}",
        case.case_id,
        found.radius,
        case.radius
    );
}

#[test]
fn manifest_discs_are_found_by_every_algorithm() {
    let manifest = load_manifest();
    assert!(!manifest.cases.is_empty());
    for case in &manifest.cases {
        let image = render(case);
        for alg in supported_algorithms() {
            let found = detect_moon(&image, alg).unwrap();
            assert_close(case, found, alg);
        }
    }
}

#[test]
fn detailed_detection_records_each_iteration() {
    let manifest = load_manifest();
    let case = &manifest.cases[0];
    let image = render(case);
    let detector = MoonDetector::new(HoughCirclesAlgorithm::HoughGradient)
        .unwrap()
        .with_config(DetectorConfig::default());
    let detection = detector.detect_detailed(&image).unwrap();
    assert_eq!(detection.iterations.len(), DetectorConfig::default().max_iteration);
    assert!((0.0..=1.0).contains(&detection.confidence));
    assert_close(case, detection.circle, HoughCirclesAlgorithm::HoughGradient);
}

/// Single pass with a fixed radius window.
struct OnePass;

impl DetectionSteps for OnePass {
    fn algorithm(&self) -> HoughCirclesAlgorithm {
        HoughCirclesAlgorithm::HoughGradient
    }

    fn param_init(&self, _shape: &ImageShape) -> DetectionParams {
        DetectionParams {
            max_iteration: 1,
            ..DetectionParams::default()
        }
    }

    fn iteration_param_update(
        &self,
        _iteration: usize,
        _brightness_perc: f32,
        shape: &ImageShape,
        _previous: Option<&CircleCandidate>,
        params: &mut DetectionParams,
    ) {
        params.min_radius = shape.longer_side as f32 * 0.1;
        params.max_radius = shape.longer_side as f32 * 0.5;
    }
}

#[test]
fn custom_steps_drive_the_loop() {
    let manifest = load_manifest();
    let case = &manifest.cases[0];
    let detector = MoonDetector::with_steps(Box::new(OnePass));
    assert_eq!(detector.algorithm(), HoughCirclesAlgorithm::HoughGradient);
    let detection = detector.detect_detailed(&render(case)).unwrap();
    assert_eq!(detection.iterations.len(), 1);
    assert_close(case, detection.circle, HoughCirclesAlgorithm::HoughGradient);
}

#[test]
fn crop_around_detection_contains_the_disc() {
    let manifest = load_manifest();
    let case = &manifest.cases[0];
    let image = render(case);
    let circle = detect_moon(&image, HoughCirclesAlgorithm::default()).unwrap();
    let (crop, rect) = cut_image_from_circle(&image, &circle, 30).unwrap();
    assert_eq!(crop.width() as i32, rect.width());
    assert!(rect.width() >= 2 * case.radius);
    let cx = (case.x - rect.top_left_x) as usize;
    let cy = (case.y - rect.top_left_y) as usize;
    assert_eq!(crop.pixel(cx, cy)[0], case.intensity);
    assert_eq!(crop.pixel(0, 0)[0], case.background);
}

#[test]
fn blank_frames_report_no_moon() {
    let image = Image::zeros(320, 240, 3).unwrap();
    for alg in supported_algorithms() {
        assert_eq!(detect_moon(&image, alg).unwrap(), Circle::INVALID);
    }
}

#[test]
fn placeholder_algorithms_fail() {
    let image = Image::zeros(32, 32, 1).unwrap();
    for alg in [HoughCirclesAlgorithm::Empty, HoughCirclesAlgorithm::Invalid] {
        assert!(matches!(
            detect_moon(&image, alg),
            Err(MoonRegError::InvalidInput(_))
        ));
    }
}

#[cfg(not(feature = "hough-alt"))]
#[test]
fn contour_variants_need_the_hough_alt_feature() {
    let image = Image::zeros(32, 32, 1).unwrap();
    for alg in [
        HoughCirclesAlgorithm::HoughGradientAlt,
        HoughCirclesAlgorithm::HoughGradientMix,
    ] {
        assert!(matches!(
            detect_moon(&image, alg),
            Err(MoonRegError::UnsupportedAlgorithm { .. })
        ));
    }
}
