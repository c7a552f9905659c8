use moonreg::{stack_images, stack_images_in_place, Image, MoonRegError, PixelFilter, Roi};

fn solid(width: usize, height: usize, px: &[u8]) -> Image {
    let data = px.iter().copied().cycle().take(width * height * px.len()).collect();
    Image::new(data, width, height, px.len()).unwrap()
}

fn gradient(width: usize, height: usize) -> Image {
    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[(x * 5) as u8, (y * 5) as u8, 100]);
        }
    }
    Image::new(data, width, height, 3).unwrap()
}

#[test]
fn zero_transparency_leaves_the_background() {
    let bg = gradient(40, 30);
    let fg = solid(10, 10, &[255, 255, 255]);
    let out = stack_images(&bg, Roi::new(5, 5, 20, 20), &fg, 0.0, None).unwrap();
    assert_eq!(out, bg);
}

#[test]
fn opaque_foreground_covers_only_its_centred_area() {
    let bg = gradient(40, 30);
    let fg = solid(10, 6, &[1, 2, 3]);
    let roi = Roi::new(8, 4, 20, 16);
    let out = stack_images(&bg, roi, &fg, 1.0, None).unwrap();
    // Centred: offset (5, 5) inside the ROI.
    let (ox, oy) = (8 + 5, 4 + 5);
    for y in 0..30 {
        for x in 0..40 {
            let inside = (ox..ox + 10).contains(&x) && (oy..oy + 6).contains(&y);
            if inside {
                assert_eq!(out.pixel(x, y), &[1, 2, 3]);
            } else {
                assert_eq!(out.pixel(x, y), bg.pixel(x, y));
            }
        }
    }
}

#[test]
fn oversized_foreground_is_shrunk_into_the_roi() {
    let bg = solid(50, 50, &[0, 0, 0]);
    let fg = solid(80, 40, &[200, 200, 200]);
    let roi = Roi::new(10, 10, 20, 20);
    let out = stack_images(&bg, roi, &fg, 1.0, None).unwrap();
    // Fitted to 20x10, centred vertically at y in [15, 25).
    assert_eq!(out.pixel(10, 15), &[200, 200, 200]);
    assert_eq!(out.pixel(29, 24), &[200, 200, 200]);
    assert_eq!(out.pixel(20, 14), &[0, 0, 0]);
    assert_eq!(out.pixel(20, 25), &[0, 0, 0]);
    assert_eq!(out.pixel(9, 20), &[0, 0, 0]);
}

#[test]
fn in_place_matches_copying_variant_for_equal_channels() {
    let bg = gradient(30, 30);
    let fg = solid(12, 12, &[90, 10, 200]);
    let roi = Roi::new(3, 6, 16, 16);
    let copied = stack_images(&bg, roi, &fg, 0.5, None).unwrap();
    let mut in_place = bg.clone();
    stack_images_in_place(&mut in_place, roi, &fg, 0.5, None).unwrap();
    assert_eq!(copied, in_place);
}

#[test]
fn filter_skips_dark_foreground_pixels() {
    let bg = solid(10, 10, &[50, 50, 50]);
    let mut fg = solid(10, 10, &[5, 5, 5]);
    fg.pixel_mut(4, 4).copy_from_slice(&[255, 255, 255]);
    let filter = PixelFilter::new([10, 10, 10, 255]);
    let out = stack_images(&bg, Roi::new(0, 0, 10, 10), &fg, 1.0, Some(filter)).unwrap();
    assert_eq!(out.pixel(0, 0), &[50, 50, 50]);
    assert_eq!(out.pixel(4, 4), &[255, 255, 255]);
}

#[test]
fn alpha_foreground_promotes_the_background() {
    let bg = solid(8, 8, &[10]);
    let fg = solid(8, 8, &[0, 0, 200, 0]);
    let out = stack_images(&bg, Roi::new(0, 0, 8, 8), &fg, 1.0, None).unwrap();
    assert_eq!(out.channels(), 4);
    assert_eq!(out.pixel(3, 3), &[10, 0, 0, 255]);
}

#[test]
fn invalid_arguments_are_rejected() {
    let bg = solid(8, 8, &[0, 0, 0]);
    let fg = solid(2, 2, &[1, 1, 1]);
    assert!(matches!(
        stack_images(&bg, Roi::new(4, 4, 8, 8), &fg, 1.0, None),
        Err(MoonRegError::RoiOutOfBounds { .. })
    ));
    assert!(matches!(
        stack_images(&bg, Roi::new(0, 0, 8, 8), &fg, f32::NAN, None),
        Err(MoonRegError::InvalidInput(_))
    ));
}

#[test]
fn unset_packed_filter_blends_like_no_filter() {
    let bg = gradient(30, 20);
    let mut fg = solid(10, 10, &[0, 0, 0]);
    fg.pixel_mut(3, 3).copy_from_slice(&[200, 100, 50]);
    let roi = Roi::new(5, 5, 10, 10);
    let plain = stack_images(&bg, roi, &fg, 0.7, None).unwrap();
    let unset = stack_images(&bg, roi, &fg, 0.7, PixelFilter::from_packed(-1)).unwrap();
    assert_eq!(unset, plain);

    // A packed black filter does skip the black pixels.
    let black = stack_images(&bg, roi, &fg, 0.7, PixelFilter::from_packed(0)).unwrap();
    assert_ne!(black, plain);
    assert_eq!(black.pixel(5, 5), bg.pixel(5, 5));
}
