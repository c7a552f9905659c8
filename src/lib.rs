//! moonreg locates the Moon in astrophotography frames and registers frames
//! against a reference model.
//!
//! The crate provides an iterative Hough-based disc detector, four
//! keypoint/descriptor families with robust homography estimation,
//! perspective warping and alpha compositing of overlay layers. Images are
//! owned 8-bit buffers in gray, BGR or BGRA order. Optional features:
//! `hough-alt` (contour-based circle finder, on by default), `rayon`
//! (parallel matching and warping), `image-io` (png/jpeg codecs) and
//! `tracing` (spans around every pipeline stage).

pub mod compose;
pub mod detect;
pub mod features;
pub mod homography;
pub mod image;
pub mod preprocess;
pub mod region;
pub mod register;
pub mod shapes;
mod trace;
pub mod transform;
pub mod util;

pub use compose::{stack_images, stack_images_in_place, PixelFilter};
pub use detect::{
    detect_moon, Detection, DetectionParams, DetectionSteps, DetectorConfig, HoughCirclesAlgorithm,
    MoonDetector,
};
pub use features::{Descriptors, FeatureDetector, Features, Keypoint, RegistrationAlgorithm};
pub use homography::Homography;
pub use image::pyramid::ImagePyramid;
pub use image::{Image, ImageView, Plane};
pub use region::cut_image_from_circle;
pub use register::{
    compute_registration, DMatch, HomographyMethod, MatchFilter, MatchFilterKind, MoonRegistrar,
    Registration, RegistrationConfig,
};
pub use shapes::{Circle, Rectangle, Roi, Square};
pub use transform::{transform_image, transform_image_inverse, WarpDirection};
pub use util::{MoonRegError, MoonRegResult};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns [`VERSION`].
pub fn version() -> &'static str {
    VERSION
}

/// Optional capabilities compiled into this build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// `HoughGradientAlt` and `HoughGradientMix` detection.
    pub hough_gradient_alt: bool,
    /// Rayon-parallel descriptor matching and warping.
    pub parallel: bool,
    /// `load_image`/`save_image` through the `image` crate.
    pub image_io: bool,
    /// Spans and events emitted through `tracing`.
    pub tracing: bool,
}

/// Capabilities resolved from the enabled cargo features.
pub const fn capabilities() -> Capabilities {
    Capabilities {
        hough_gradient_alt: cfg!(feature = "hough-alt"),
        parallel: cfg!(feature = "rayon"),
        image_io: cfg!(feature = "image-io"),
        tracing: cfg!(feature = "tracing"),
    }
}
