use moonreg::{
    Circle, HoughCirclesAlgorithm, Image, ImagePyramid, ImageView, MoonRegError, Plane, Rectangle,
    RegistrationAlgorithm, Roi, Square,
};

#[test]
fn image_rejects_invalid_layouts() {
    let err = Image::new(vec![0u8; 4], 0, 1, 1).unwrap_err();
    assert_eq!(
        err,
        MoonRegError::InvalidDimensions {
            width: 0,
            height: 1,
        }
    );

    let err = Image::new(vec![0u8; 8], 2, 2, 2).unwrap_err();
    assert_eq!(err, MoonRegError::InvalidChannels { channels: 2 });

    let err = Image::new(vec![0u8; 11], 2, 2, 3).unwrap_err();
    assert_eq!(err, MoonRegError::BufferTooSmall { needed: 12, got: 11 });

    assert!(matches!(
        Image::new(vec![0u8; 13], 2, 2, 3),
        Err(MoonRegError::InvalidInput(_))
    ));
}

#[test]
fn image_view_rejects_invalid_stride() {
    let data = [0u8; 8];

    let err = ImageView::new(&data, 4, 1, 1, 3).unwrap_err();
    assert_eq!(
        err,
        MoonRegError::InvalidStride {
            width: 4,
            stride: 3,
        }
    );
}

#[test]
fn image_view_roi_matches_expected_values() {
    let data: Vec<u8> = (0u8..16).collect();
    let view = ImageView::from_slice(&data, 4, 4, 1).unwrap();
    assert_eq!(view.stride(), 4);
    assert_eq!(view.as_slice(), data.as_slice());

    let roi = view.roi(1, 1, 2, 2).unwrap();
    assert_eq!(roi.width(), 2);
    assert_eq!(roi.height(), 2);
    assert_eq!(roi.stride(), 4);
    assert_eq!(roi.row(0).unwrap(), &[5u8, 6u8]);
    assert_eq!(roi.row(1).unwrap(), &[9u8, 10u8]);
    assert_eq!(roi.get(0, 0), Some(&[5u8][..]));
    assert!(roi.get(2, 0).is_none());
    assert_eq!(roi.to_image().unwrap().data(), &[5, 6, 9, 10]);

    let err = view.roi(3, 3, 2, 2).unwrap_err();
    assert_eq!(
        err,
        MoonRegError::RoiOutOfBounds {
            x: 3,
            y: 3,
            width: 2,
            height: 2,
            img_width: 4,
            img_height: 4,
        }
    );
}

#[test]
fn crop_matches_view_roi() {
    let data: Vec<u8> = (0u8..48).collect();
    let image = Image::new(data, 4, 4, 3).unwrap();
    let crop = image.crop(&Rectangle::new(1, 2, 3, 4)).unwrap();
    let roi = image.view().roi(1, 2, 2, 2).unwrap().to_image().unwrap();
    assert_eq!(crop, roi);
    assert_eq!(crop.pixel(0, 0), &[27, 28, 29]);
}

#[test]
fn shape_conversions_are_consistent() {
    let rect = Rectangle::new(10, 20, 50, 40);
    assert_eq!(rect.width(), 40);
    assert_eq!(rect.height(), 20);
    assert_eq!(Roi::new(10, 20, 40, 20).to_rectangle(), rect);
    assert_eq!(rect.to_roi(), Some(Roi::new(10, 20, 40, 20)));
    assert_eq!(Square::new(3, 4, 5).to_rectangle(), Rectangle::new(3, 4, 8, 9));

    assert!(!Circle::INVALID.is_valid());
    assert!(!Circle::new(5, 5, 0).is_valid());
    assert_eq!(Circle::from_f32(9.6, 10.4, 3.5), Circle::new(10, 10, 4));
    assert_eq!(Circle::default(), Circle::INVALID);
}

#[test]
fn algorithm_codes_and_names_round_trip() {
    for alg in HoughCirclesAlgorithm::ALL {
        assert_eq!(HoughCirclesAlgorithm::from_code(alg.code()), alg);
        assert_eq!(alg.name().parse::<HoughCirclesAlgorithm>().unwrap(), alg);
    }
    for alg in RegistrationAlgorithm::ALL {
        assert_eq!(RegistrationAlgorithm::from_code(alg.code()), alg);
        assert_eq!(alg.to_string().parse::<RegistrationAlgorithm>().unwrap(), alg);
    }
    assert_eq!(HoughCirclesAlgorithm::from_code(0x777), HoughCirclesAlgorithm::Invalid);
    assert_eq!(RegistrationAlgorithm::from_code(0x104), RegistrationAlgorithm::Invalid);
    assert!("surf".parse::<RegistrationAlgorithm>().is_err());
}

#[test]
fn pyramid_levels_halve_dimensions() {
    let base = Plane::new(64, 48, 7u8);
    let pyramid = ImagePyramid::build_u8(&base, 3);
    let sizes: Vec<_> = pyramid
        .levels()
        .iter()
        .map(|p| (p.width(), p.height()))
        .collect();
    assert_eq!(sizes, vec![(64, 48), (32, 24), (16, 12)]);
    assert_eq!(pyramid.level(2).unwrap().get(3, 3), 7);
    assert!(pyramid.level(3).is_none());
}

#[test]
fn capabilities_reflect_features() {
    let caps = moonreg::capabilities();
    assert_eq!(caps.hough_gradient_alt, cfg!(feature = "hough-alt"));
    assert_eq!(caps.parallel, cfg!(feature = "rayon"));
    assert_eq!(caps.image_io, cfg!(feature = "image-io"));
    assert_eq!(caps.tracing, cfg!(feature = "tracing"));
    assert!(!moonreg::version().is_empty());
}
