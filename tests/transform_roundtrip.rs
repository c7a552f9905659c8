use moonreg::transform::warp_perspective;
use moonreg::{transform_image, transform_image_inverse, Homography, Image, WarpDirection};

fn texture(width: usize, height: usize, channels: usize) -> Image {
    let mut data = Vec::with_capacity(width * height * channels);
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                data.push((((x * 7) ^ (y * 13)) + c * 40) as u8);
            }
        }
    }
    Image::new(data, width, height, channels).unwrap()
}

fn projective() -> Homography {
    Homography::from_row_slice(&[1.05, 0.04, 3.0, -0.03, 0.98, 2.0, 1e-4, -5e-5, 1.0]).unwrap()
}

#[test]
fn integer_translation_round_trips_interior_pixels() {
    let image = texture(64, 48, 3);
    let h = Homography::translation(5.0, -3.0);
    let moved = transform_image(&image, &h, WarpDirection::Forward, image.size()).unwrap();
    let back = transform_image(&moved, &h, WarpDirection::Inverse, image.size()).unwrap();
    for y in 4..40 {
        for x in 0..55 {
            assert_eq!(back.pixel(x, y), image.pixel(x, y), "pixel ({x}, {y})");
        }
    }
    assert_eq!(moved.pixel(0, 0), &[0, 0, 0]);
}

#[test]
fn forward_equals_warp_with_inverse_map() {
    let image = texture(50, 40, 1);
    let h = projective();
    let forward = transform_image(&image, &h, WarpDirection::Forward, (60, 45)).unwrap();
    let direct = warp_perspective(&image, &h.inverse().unwrap(), (60, 45), false).unwrap();
    assert_eq!(forward, direct);

    let inverse = transform_image_inverse(&image, &h, (60, 45)).unwrap();
    let direct = warp_perspective(&image, &h, (60, 45), false).unwrap();
    assert_eq!(inverse, direct);
}

#[test]
fn homography_inverse_composes_to_identity() {
    let h = projective();
    let id = h.compose(&h.inverse().unwrap());
    assert!(id.approx_eq(&Homography::identity(), 1e-9));

    let (x, y) = h.project(17.0, 29.0).unwrap();
    let (bx, by) = h.inverse().unwrap().project(x, y).unwrap();
    assert!((bx - 17.0).abs() < 1e-9 && (by - 29.0).abs() < 1e-9);
}

#[test]
fn output_size_follows_the_request() {
    let image = texture(32, 32, 4);
    let out = transform_image(&image, &Homography::identity(), WarpDirection::Forward, (20, 70)).unwrap();
    assert_eq!(out.size(), (20, 70));
    assert_eq!(out.channels(), 4);
    assert_eq!(out.pixel(10, 10), image.pixel(10, 10));
    assert_eq!(out.pixel(10, 50), &[0, 0, 0, 0]);
}

/// Smooth shading, so two bilinear resamplings stay close to the source.
fn smooth(width: usize, height: usize, channels: usize) -> Image {
    let mut data = Vec::with_capacity(width * height * channels);
    for y in 0..height {
        for x in 0..width {
            let wave = (x as f32 / 9.0).sin() * (y as f32 / 11.0).cos();
            for c in 0..channels {
                data.push((128.0 + 60.0 * wave + 20.0 * c as f32).round() as u8);
            }
        }
    }
    Image::new(data, width, height, channels).unwrap()
}

#[test]
fn projective_round_trip_has_bounded_interior_error() {
    let (w, h) = (80usize, 64usize);
    let image = smooth(w, h, 3);
    let hom = Homography::from_row_slice(&[1.05, 0.04, 3.3, -0.03, 0.98, 2.7, 1e-4, -5e-5, 1.0]).unwrap();
    let moved = transform_image(&image, &hom, WarpDirection::Forward, (w, h)).unwrap();
    let back = transform_image(&moved, &hom, WarpDirection::Inverse, (w, h)).unwrap();

    let inside = |x: f64, y: f64| x >= 2.0 && y >= 2.0 && x <= (w - 3) as f64 && y <= (h - 3) as f64;
    let mut checked = 0;
    let mut max_diff = 0;
    for y in 0..h {
        for x in 0..w {
            let (mx, my) = hom.project(x as f64, y as f64).unwrap();
            if !inside(x as f64, y as f64) || !inside(mx, my) {
                continue;
            }
            checked += 1;
            for (a, b) in back.pixel(x, y).iter().zip(image.pixel(x, y)) {
                max_diff = max_diff.max((i32::from(*a) - i32::from(*b)).abs());
            }
        }
    }
    assert!(checked > 1500, "only {checked} interior pixels");
    assert!(max_diff <= 3, "max interior difference {max_diff}");
}
