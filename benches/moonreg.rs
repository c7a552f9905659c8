use moonreg::features::detect_and_compute;
use moonreg::register::matcher::knn_match;
use moonreg::{
    compute_registration, detect_moon, transform_image, Homography, HoughCirclesAlgorithm, Image,
    RegistrationAlgorithm, WarpDirection,
};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn make_disc(width: usize, height: usize, radius: f32) -> Image {
    let (cx, cy) = (width as f32 * 0.45, height as f32 * 0.55);
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let d = (x as f32 - cx).hypot(y as f32 - cy);
            let texture = ((x * 13) ^ (y * 7)) & 0x1F;
            data.push(if d <= radius { 180 + texture as u8 } else { 5 });
        }
    }
    Image::new(data, width, height, 1).unwrap()
}

fn make_texture(width: usize, height: usize) -> Image {
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let value = if ((x / 24) + (y / 18)) % 3 == 0 {
                ((x * 13) ^ (y * 7) ^ (x * y)) & 0xFF
            } else {
                ((x / 24) * 40 + (y / 18) * 25) & 0xFF
            };
            data.push(value as u8);
        }
    }
    Image::new(data, width, height, 1).unwrap()
}

fn bench_detection(c: &mut Criterion) {
    let image = make_disc(1024, 768, 240.0);
    let mut group = c.benchmark_group("detect_moon");
    group.sample_size(10);
    for alg in HoughCirclesAlgorithm::ALL.into_iter().filter(|a| a.is_supported()) {
        group.bench_function(alg.name(), |b| {
            b.iter(|| black_box(detect_moon(&image, alg).unwrap()));
        });
    }
    group.finish();
}

fn bench_features(c: &mut Criterion) {
    let image = make_texture(320, 240);
    let gray = image.to_gray();
    let mut group = c.benchmark_group("detect_and_compute");
    group.sample_size(10);
    for alg in [
        RegistrationAlgorithm::Sift,
        RegistrationAlgorithm::Orb,
        RegistrationAlgorithm::Akaze,
        RegistrationAlgorithm::Brisk,
    ] {
        group.bench_function(alg.name(), |b| {
            b.iter(|| black_box(detect_and_compute(&gray, alg).unwrap()));
        });
    }
    group.finish();

    let features = detect_and_compute(&gray, RegistrationAlgorithm::Orb).unwrap();
    c.bench_function("knn_match_orb_self", |b| {
        b.iter(|| black_box(knn_match(&features.descriptors, &features.descriptors, 2).unwrap()));
    });
}

fn bench_registration(c: &mut Criterion) {
    let model = make_texture(320, 240);
    let user = transform_image(
        &model,
        &Homography::translation(7.0, -4.0),
        WarpDirection::Forward,
        model.size(),
    )
    .unwrap();
    let mut group = c.benchmark_group("register");
    group.sample_size(10);
    group.bench_function("orb", |b| {
        b.iter(|| black_box(compute_registration(&user, &model, RegistrationAlgorithm::Orb).unwrap()));
    });
    group.finish();

    let h = Homography::from_row_slice(&[1.02, 0.03, 4.0, -0.02, 0.99, 6.0, 1e-5, 2e-5, 1.0]).unwrap();
    let frame = make_disc(1024, 768, 240.0);
    c.bench_function("warp_perspective_1024x768", |b| {
        b.iter(|| black_box(transform_image(&frame, &h, WarpDirection::Forward, frame.size()).unwrap()));
    });
}

criterion_group!(benches, bench_detection, bench_features, bench_registration);
criterion_main!(benches);
