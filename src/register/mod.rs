//! Feature-based registration of a user frame against a model frame.
//!
//! [`MoonRegistrar`] detects keypoints on both images, matches user
//! descriptors against model descriptors with brute-force kNN, keeps the
//! good matches and fits a homography that maps **model coordinates to
//! user coordinates**. The resulting [`Registration`] warps images between
//! the two frames and renders diagnostic overlays.
//!
//! ```no_run
//! use moonreg::{Image, MoonRegistrar, RegistrationAlgorithm};
//!
//! # fn run(user: &Image, model: &Image, layer: &Image) -> moonreg::MoonRegResult<()> {
//! let registrar = MoonRegistrar::new(RegistrationAlgorithm::Orb)?;
//! let registration = registrar.register(user, model)?;
//! let composite = registration.draw_layer_image(layer, 1.0, None)?;
//! # let _ = composite;
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;

pub mod draw;
pub mod estimate;
pub mod filter;
pub mod matcher;

pub use estimate::{Estimate, HomographyMethod, RansacParams};
pub use filter::{AllOf, IgnoreClose, IgnoreEdge, LowesRatio, MatchContext, MatchFilter};
pub use matcher::DMatch;

use crate::compose::{stack_images, PixelFilter};
use crate::features::{create_detector, FeatureDetector, Keypoint, RegistrationAlgorithm};
use crate::homography::Homography;
use crate::image::Image;
use crate::shapes::Roi;
use crate::trace::{trace_event, trace_span};
use crate::transform::{transform_image, WarpDirection};
use crate::util::{MoonRegError, MoonRegResult};

/// Built-in good-match filter combinations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchFilterKind {
    /// Lowe's ratio test only.
    #[default]
    RatioOnly,
    /// Ratio test plus [`IgnoreEdge`].
    IgnoreEdgeAndRatio,
    /// Ratio test, [`IgnoreEdge`] and [`IgnoreClose`].
    All,
}

/// Registration settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegistrationConfig {
    /// Neighbours per query; the ratio test needs 2.
    pub knn_k: usize,
    pub good_match_ratio: f32,
    pub method: HomographyMethod,
    pub ransac_reproj_threshold: f64,
    pub max_iters: usize,
    pub confidence: f64,
    pub seed: u64,
    pub match_filter: MatchFilterKind,
    pub edge_keep_ratio: f32,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            knn_k: 2,
            good_match_ratio: 0.7,
            method: HomographyMethod::Ransac,
            ransac_reproj_threshold: 5.0,
            max_iters: 2000,
            confidence: 0.995,
            seed: 0,
            match_filter: MatchFilterKind::RatioOnly,
            edge_keep_ratio: 0.9,
        }
    }
}

impl RegistrationConfig {
    fn validate(&self) -> MoonRegResult<()> {
        if self.knn_k == 0 {
            return Err(MoonRegError::InvalidInput("knn_k must be at least 1"));
        }
        if !(self.good_match_ratio > 0.0 && self.good_match_ratio <= 1.0) {
            return Err(MoonRegError::InvalidInput("good_match_ratio must be in (0, 1]"));
        }
        if !(self.ransac_reproj_threshold > 0.0) || !self.ransac_reproj_threshold.is_finite() {
            return Err(MoonRegError::InvalidInput("ransac_reproj_threshold must be positive"));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(MoonRegError::InvalidInput("confidence must be in (0, 1)"));
        }
        if !(self.edge_keep_ratio > 0.0) {
            return Err(MoonRegError::InvalidInput("edge_keep_ratio must be positive"));
        }
        Ok(())
    }

    pub fn ransac_params(&self) -> RansacParams {
        RansacParams {
            reproj_threshold: self.ransac_reproj_threshold,
            max_iters: self.max_iters,
            confidence: self.confidence,
            seed: self.seed,
        }
    }

    /// The filter selected by `match_filter`.
    pub fn build_filter(&self) -> Box<dyn MatchFilter> {
        let ratio = LowesRatio {
            ratio: self.good_match_ratio,
        };
        let edge = IgnoreEdge {
            keep_ratio: self.edge_keep_ratio,
        };
        match self.match_filter {
            MatchFilterKind::RatioOnly => Box::new(ratio),
            MatchFilterKind::IgnoreEdgeAndRatio => Box::new(AllOf::new().with(edge).with(ratio)),
            MatchFilterKind::All => Box::new(
                AllOf::new()
                    .with(edge)
                    .with(ratio)
                    .with(IgnoreClose::default()),
            ),
        }
    }
}

/// Registers user frames against model frames.
pub struct MoonRegistrar {
    detector: Box<dyn FeatureDetector>,
    config: RegistrationConfig,
    filter: Option<Box<dyn MatchFilter>>,
}

impl MoonRegistrar {
    /// Registrar with the default detector for `algorithm`; placeholders
    /// are rejected with `InvalidInput`.
    pub fn new(algorithm: RegistrationAlgorithm) -> MoonRegResult<Self> {
        Ok(Self::with_detector(create_detector(algorithm)?))
    }

    /// Registrar around a custom (or custom-configured) detector.
    pub fn with_detector(detector: Box<dyn FeatureDetector>) -> Self {
        Self {
            detector,
            config: RegistrationConfig::default(),
            filter: None,
        }
    }

    pub fn with_config(mut self, config: RegistrationConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the filter chosen by `config.match_filter`.
    pub fn with_filter(mut self, filter: impl MatchFilter + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn algorithm(&self) -> RegistrationAlgorithm {
        self.detector.algorithm()
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Aligns `user` with `model`. The model is resized to the user's size
    /// first when they differ.
    pub fn register<'a>(&self, user: &'a Image, model: &'a Image) -> MoonRegResult<Registration<'a>> {
        self.config.validate()?;
        let (uw, uh) = user.size();
        let _span = trace_span!(
            "register",
            algorithm = self.algorithm().name(),
            width = uw,
            height = uh
        )
        .entered();

        let model: Cow<'a, Image> = if model.size() == user.size() {
            Cow::Borrowed(model)
        } else {
            Cow::Owned(model.resize(uw, uh)?)
        };

        let user_features = self.detector.detect_and_compute(&user.to_gray());
        let model_features = self.detector.detect_and_compute(&model.to_gray());
        trace_event!(
            "register_features",
            user = user_features.len(),
            model = model_features.len()
        );
        if user_features.is_empty() || model_features.is_empty() {
            return Err(MoonRegError::registration(format!(
                "no keypoints (user {}, model {})",
                user_features.len(),
                model_features.len()
            )));
        }

        let knn = matcher::knn_match(
            &user_features.descriptors,
            &model_features.descriptors,
            self.config.knn_k,
        )?;
        let ctx = MatchContext {
            user_keypoints: &user_features.keypoints,
            model_keypoints: &model_features.keypoints,
            user_size: (uw, uh),
            model_size: model.size(),
        };
        let built;
        let filter: &dyn MatchFilter = match &self.filter {
            Some(f) => f.as_ref(),
            None => {
                built = self.config.build_filter();
                built.as_ref()
            }
        };
        let good = filter::good_matches(filter, &ctx, &knn);
        trace_event!("register_good_matches", good = good.len());
        if good.len() < estimate::MIN_CORRESPONDENCES {
            return Err(MoonRegError::registration(format!(
                "only {} good matches, need {}",
                good.len(),
                estimate::MIN_CORRESPONDENCES
            )));
        }

        let mut weights = Vec::with_capacity(good.len());
        let (model_pts, user_pts): (Vec<[f64; 2]>, Vec<[f64; 2]>) = good
            .iter()
            .map(|m| {
                let u = &user_features.keypoints[m.query_idx];
                let v = &model_features.keypoints[m.train_idx];
                weights.push(match_weight(u, v));
                ([f64::from(v.x), f64::from(v.y)], [f64::from(u.x), f64::from(u.y)])
            })
            .unzip();
        let fit = estimate::estimate_homography(
            &model_pts,
            &user_pts,
            Some(weights.as_slice()),
            self.config.method,
            &self.config.ransac_params(),
        )?;
        trace_event!("register_done", inliers = fit.inlier_count());

        Ok(Registration {
            user,
            model,
            homography: fit.homography,
            user_keypoints: user_features.keypoints,
            model_keypoints: model_features.keypoints,
            good_matches: good,
            inliers: fit.inliers,
        })
    }
}

/// Fit weight of a match: keypoint positions are only as precise as the
/// scale they were detected at, so the weight falls with the mean size.
fn match_weight(user: &Keypoint, model: &Keypoint) -> f64 {
    let size = 0.5 * (f64::from(user.size) + f64::from(model.size));
    if size.is_finite() && size > 1.0 {
        1.0 / size
    } else {
        1.0
    }
}

/// Outcome of [`MoonRegistrar::register`].
#[derive(Clone, Debug)]
pub struct Registration<'a> {
    user: &'a Image,
    model: Cow<'a, Image>,
    homography: Homography,
    user_keypoints: Vec<Keypoint>,
    model_keypoints: Vec<Keypoint>,
    good_matches: Vec<DMatch>,
    inliers: Vec<bool>,
}

impl<'a> Registration<'a> {
    /// Model-to-user homography. Model coordinates are those of
    /// [`Self::model_image`], i.e. of the model resized to the user size.
    pub fn homography(&self) -> &Homography {
        &self.homography
    }

    pub fn user_image(&self) -> &Image {
        self.user
    }

    /// The model image at the user image's size.
    pub fn model_image(&self) -> &Image {
        &self.model
    }

    pub fn user_keypoints(&self) -> &[Keypoint] {
        &self.user_keypoints
    }

    pub fn model_keypoints(&self) -> &[Keypoint] {
        &self.model_keypoints
    }

    pub fn good_matches(&self) -> &[DMatch] {
        &self.good_matches
    }

    /// Inlier flags, index-aligned with [`Self::good_matches`].
    pub fn inliers(&self) -> &[bool] {
        &self.inliers
    }

    fn size(&self) -> (usize, usize) {
        self.user.size()
    }

    /// The user image warped into the model frame.
    pub fn transform_user_image(&self) -> MoonRegResult<Image> {
        transform_image(self.user, &self.homography, WarpDirection::Inverse, self.size())
    }

    /// A layer drawn in the model frame, resized to the user size and
    /// warped into the user frame.
    pub fn transform_layer_image(&self, layer: &Image) -> MoonRegResult<Image> {
        let (w, h) = self.size();
        let layer: Cow<'_, Image> = if layer.size() == (w, h) {
            Cow::Borrowed(layer)
        } else {
            Cow::Owned(layer.resize(w, h)?)
        };
        transform_image(&layer, &self.homography, WarpDirection::Forward, (w, h))
    }

    /// User and model side by side with lines between good matches.
    pub fn draw_matched_keypoints(&self) -> MoonRegResult<Image> {
        draw::draw_matches(
            self.user,
            &self.user_keypoints,
            &self.model,
            &self.model_keypoints,
            &self.good_matches,
        )
    }

    fn transformed_gray(&self, transformed: Option<&Image>) -> MoonRegResult<crate::image::Plane<u8>> {
        match transformed {
            Some(img) if img.size() != self.size() => Err(MoonRegError::InvalidInput(
                "transformed image size differs from the user image",
            )),
            Some(img) => Ok(img.to_gray()),
            None => Ok(self.transform_user_image()?.to_gray()),
        }
    }

    /// Gray of the transformed user image in the red channel. Pass a
    /// previously transformed image to skip the warp.
    pub fn draw_red_transformed_user_image(&self, transformed: Option<&Image>) -> MoonRegResult<Image> {
        let red = self.transformed_gray(transformed)?;
        draw::merge_bgr(None, None, Some(&red))
    }

    /// Gray of the model image in the green channel.
    pub fn draw_green_model_image(&self) -> MoonRegResult<Image> {
        draw::merge_bgr(None, Some(&self.model.to_gray()), None)
    }

    /// Model in green and transformed user in red; aligned content turns
    /// yellow.
    pub fn draw_stacked_red_green_image(&self, transformed: Option<&Image>) -> MoonRegResult<Image> {
        let red = self.transformed_gray(transformed)?;
        draw::merge_bgr(None, Some(&self.model.to_gray()), Some(&red))
    }

    /// Warps `layer` into the user frame and blends it over the whole user
    /// image. Layers without alpha are opaque wherever they are non-black.
    pub fn draw_layer_image(
        &self,
        layer: &Image,
        transparency: f32,
        filter: Option<PixelFilter>,
    ) -> MoonRegResult<Image> {
        let warped = draw::with_nonzero_alpha(&self.transform_layer_image(layer)?)?;
        let (w, h) = self.size();
        stack_images(self.user, Roi::new(0, 0, w, h), &warped, transparency, filter)
    }
}

/// One-shot registration with default settings.
///
/// Returns the model-to-user homography. When the sizes differ the model is
/// resized to the user size first, so the homography maps coordinates of
/// that resized model, not of `model` itself.
pub fn compute_registration(
    user: &Image,
    model: &Image,
    algorithm: RegistrationAlgorithm,
) -> MoonRegResult<Homography> {
    let registrar = MoonRegistrar::new(algorithm)?;
    Ok(*registrar.register(user, model)?.homography())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RegistrationConfig::default();
        assert_eq!(cfg.knn_k, 2);
        assert_eq!(cfg.good_match_ratio, 0.7);
        assert_eq!(cfg.method, HomographyMethod::Ransac);
        assert_eq!(cfg.max_iters, 2000);
        assert_eq!(cfg.match_filter, MatchFilterKind::RatioOnly);
    }

    #[test]
    fn placeholders_are_rejected_up_front() {
        let img = Image::zeros(16, 16, 1).unwrap();
        for alg in [RegistrationAlgorithm::Empty, RegistrationAlgorithm::Invalid] {
            assert!(matches!(
                compute_registration(&img, &img, alg),
                Err(MoonRegError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn featureless_images_fail_to_register() {
        let img = Image::zeros(64, 64, 3).unwrap();
        let err = compute_registration(&img, &img, RegistrationAlgorithm::Orb).unwrap_err();
        assert!(matches!(err, MoonRegError::RegistrationError { .. }));
    }

    #[test]
    fn coarse_keypoints_weigh_less() {
        let kp = |size: f32| Keypoint {
            x: 0.0,
            y: 0.0,
            size,
            angle: 0.0,
            response: 0.0,
            octave: 0,
        };
        assert!(match_weight(&kp(31.0), &kp(31.0)) > match_weight(&kp(31.0), &kp(80.0)));
        assert_eq!(match_weight(&kp(0.0), &kp(0.0)), 1.0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let img = Image::zeros(16, 16, 1).unwrap();
        let registrar = MoonRegistrar::new(RegistrationAlgorithm::Orb)
            .unwrap()
            .with_config(RegistrationConfig {
                good_match_ratio: 0.0,
                ..RegistrationConfig::default()
            });
        assert!(matches!(
            registrar.register(&img, &img),
            Err(MoonRegError::InvalidInput(_))
        ));
    }
}
