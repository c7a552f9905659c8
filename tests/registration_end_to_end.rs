use moonreg::{
    compute_registration, Homography, HomographyMethod, Image, MoonRegError, MoonRegistrar,
    RegistrationAlgorithm, RegistrationConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SIZE: usize = 240;

struct Blob {
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
    round: bool,
    value: u8,
}

fn scene(seed: u64) -> Vec<Blob> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..40)
        .map(|_| {
            let x0 = rng.random_range(0..SIZE as i64 - 20);
            let y0 = rng.random_range(0..SIZE as i64 - 20);
            let w = rng.random_range(8..40);
            let h = rng.random_range(8..40);
            Blob {
                x0,
                y0,
                x1: x0 + w,
                y1: y0 + h,
                round: rng.random_bool(0.3),
                value: rng.random_range(60..=255),
            }
        })
        .collect()
}

/// Renders the scene shifted by `(dx, dy)` as a BGR image.
fn render(blobs: &[Blob], dx: i64, dy: i64) -> Image {
    let mut image = Image::zeros(SIZE, SIZE, 3).unwrap();
    for y in 0..SIZE {
        for x in 0..SIZE {
            let (sx, sy) = (x as i64 - dx, y as i64 - dy);
            let mut value = 20u8;
            for b in blobs {
                let inside = if b.round {
                    let (cx, cy) = ((b.x0 + b.x1) / 2, (b.y0 + b.y1) / 2);
                    let r = (b.x1 - b.x0).min(b.y1 - b.y0) / 2;
                    (sx - cx).pow(2) + (sy - cy).pow(2) <= r * r
                } else {
                    sx >= b.x0 && sx < b.x1 && sy >= b.y0 && sy < b.y1
                };
                if inside {
                    value = b.value;
                }
            }
            image.pixel_mut(x, y).fill(value);
        }
    }
    image
}

/// Largest corner displacement between two homographies over the frame.
fn corner_gap(a: &Homography, b: &Homography) -> f64 {
    let s = SIZE as f64;
    [(0.0, 0.0), (s, 0.0), (0.0, s), (s, s), (s / 2.0, s / 2.0)]
        .into_iter()
        .map(|(x, y)| {
            let p = a.project(x, y).unwrap();
            let q = b.project(x, y).unwrap();
            (p.0 - q.0).hypot(p.1 - q.1)
        })
        .fold(0.0, f64::max)
}

const ALGORITHMS: [RegistrationAlgorithm; 4] = [
    RegistrationAlgorithm::Sift,
    RegistrationAlgorithm::Orb,
    RegistrationAlgorithm::Akaze,
    RegistrationAlgorithm::Brisk,
];

#[test]
fn identical_frames_register_to_identity() {
    let image = render(&scene(7), 0, 0);
    for alg in ALGORITHMS {
        let h = compute_registration(&image, &image, alg).unwrap();
        let gap = corner_gap(&h, &Homography::identity());
        assert!(gap < 1.0, "{alg}: corner gap {gap}");
    }
}

#[test]
fn orb_recovers_a_translation() {
    let blobs = scene(11);
    let model = render(&blobs, 0, 0);
    let user = render(&blobs, 10, 6);
    let registrar = MoonRegistrar::new(RegistrationAlgorithm::Orb).unwrap();
    let registration = registrar.register(&user, &model).unwrap();
    let gap = corner_gap(registration.homography(), &Homography::translation(10.0, 6.0));
    assert!(gap < 2.0, "corner gap {gap}");

    assert_eq!(registration.inliers().len(), registration.good_matches().len());
    assert!(registration.inliers().iter().filter(|&&b| b).count() >= 4);

    let aligned = registration.transform_user_image().unwrap();
    assert_eq!(aligned.size(), model.size());
    let (x, y) = (SIZE / 2, SIZE / 2);
    let diff = i32::from(aligned.pixel(x, y)[0]) - i32::from(model.pixel(x, y)[0]);
    assert!(diff.abs() <= 40, "aligned pixel differs by {diff}");

    let overlay = registration.draw_stacked_red_green_image(Some(&aligned)).unwrap();
    assert_eq!(overlay.channels(), 3);
    assert_eq!(overlay.size(), user.size());

    let matches = registration.draw_matched_keypoints().unwrap();
    assert_eq!(matches.size(), (2 * SIZE, SIZE));
}

#[test]
fn orb_translation_holds_across_scenes() {
    for seed in 1..=5 {
        let blobs = scene(seed);
        let model = render(&blobs, 0, 0);
        let user = render(&blobs, 10, 6);
        let h = compute_registration(&user, &model, RegistrationAlgorithm::Orb).unwrap();
        let gap = corner_gap(&h, &Homography::translation(10.0, 6.0));
        assert!(gap < 2.0, "seed {seed}: corner gap {gap}");
    }
}

#[test]
fn layer_is_composited_over_the_user_frame() {
    let image = render(&scene(3), 0, 0);
    let registrar = MoonRegistrar::new(RegistrationAlgorithm::Orb).unwrap();
    let registration = registrar.register(&image, &image).unwrap();

    let mut layer = Image::zeros(SIZE, SIZE, 4).unwrap();
    for y in 100..140 {
        for x in 100..140 {
            layer.pixel_mut(x, y).copy_from_slice(&[0, 0, 255, 255]);
        }
    }
    let out = registration.draw_layer_image(&layer, 1.0, None).unwrap();
    assert_eq!(out.channels(), 4);
    assert_eq!(out.size(), image.size());
    assert_eq!(&out.pixel(120, 120)[..3], &[0, 0, 255]);
    assert_eq!(&out.pixel(5, 5)[..3], image.pixel(5, 5));
}

#[test]
fn model_is_resized_to_the_user_frame() {
    let image = render(&scene(5), 0, 0);
    let model = image.resize(SIZE / 2, SIZE / 2).unwrap();
    let registrar = MoonRegistrar::new(RegistrationAlgorithm::Sift).unwrap();
    let registration = registrar.register(&image, &model).unwrap();
    assert_eq!(registration.model_image().size(), image.size());
}

#[test]
fn least_squares_fit_is_available() {
    let image = render(&scene(9), 0, 0);
    let config = RegistrationConfig {
        method: HomographyMethod::LeastSquares,
        ..RegistrationConfig::default()
    };
    let registrar = MoonRegistrar::new(RegistrationAlgorithm::Sift)
        .unwrap()
        .with_config(config);
    let registration = registrar.register(&image, &image).unwrap();
    assert!(registration.inliers().iter().all(|&b| b));
    assert!(corner_gap(registration.homography(), &Homography::identity()) < 1.0);
}

#[test]
fn featureless_or_placeholder_inputs_fail() {
    let blank = Image::zeros(64, 64, 1).unwrap();
    assert!(matches!(
        compute_registration(&blank, &blank, RegistrationAlgorithm::Orb),
        Err(MoonRegError::RegistrationError { .. })
    ));
    assert!(matches!(
        compute_registration(&blank, &blank, RegistrationAlgorithm::Empty),
        Err(MoonRegError::InvalidInput(_))
    ));
}
