//! Per-algorithm detector customisation.
//!
//! The detector loop is fixed; a [`DetectionSteps`] implementation decides
//! how the frame is preprocessed, how Hough parameters evolve between
//! iterations, which candidate is kept, and how the result is mapped back.

use super::select::{
    select_by_brightness_perc, select_by_shape, select_n_by_brightness_perc,
    select_n_by_largest_radius,
};
#[cfg(feature = "hough-alt")]
use super::select::select_by_confidence;
use super::{CircleCandidate, HoughCirclesAlgorithm, IterationRecord};
use crate::image::{Image, Plane};
use crate::preprocess::{moon_preprocess, ImageShape};
use crate::shapes::Circle;
use crate::util::MoonRegResult;

/// Hough parameters for one detector iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionParams {
    /// Finder run in the current iteration.
    pub algorithm: HoughCirclesAlgorithm,
    pub max_iteration: usize,
    /// Reaching this many surviving circles is a detection error.
    pub circle_threshold: usize,
    /// Padding added around the chosen circle when cropping for the next
    /// iteration.
    pub crop_padding: i32,
    /// Inverse accumulator resolution (pixels per accumulator cell).
    pub dp: f32,
    /// Minimum distance between accepted circle centres.
    pub min_dist: f32,
    /// Canny high threshold; the low threshold is half of it.
    pub param1: f32,
    /// Accumulator votes a gradient Hough peak needs.
    pub param2: f32,
    /// Edge support a contour circle needs, in `[0, 1]`.
    pub min_perfectness: f32,
    pub min_radius_rate: f32,
    pub min_radius: f32,
    pub max_radius_rate: f32,
    pub max_radius: f32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            algorithm: HoughCirclesAlgorithm::HoughGradient,
            max_iteration: 3,
            circle_threshold: 100,
            crop_padding: 30,
            dp: 4.0,
            min_dist: 50.0,
            param1: 100.0,
            param2: 30.0,
            min_perfectness: 0.5,
            min_radius_rate: 0.03,
            min_radius: 15.0,
            max_radius_rate: 0.6,
            max_radius: 300.0,
        }
    }
}

/// Hooks the detector loop calls, in order, for each frame.
pub trait DetectionSteps: Send + Sync {
    /// Algorithm these steps implement.
    fn algorithm(&self) -> HoughCirclesAlgorithm;

    /// Turns the input into the binary working frame; returns the frame and
    /// the scale applied to the input.
    fn preprocess(&self, image: &Image) -> MoonRegResult<(Plane<u8>, f32)> {
        moon_preprocess(image)
    }

    /// Parameters before the first iteration.
    fn param_init(&self, shape: &ImageShape) -> DetectionParams;

    /// Adjusts `params` for `iteration` on a working frame of `shape`.
    /// `previous` is the circle picked by the last iteration, in the current
    /// working frame's coordinates.
    fn iteration_param_update(
        &self,
        iteration: usize,
        brightness_perc: f32,
        shape: &ImageShape,
        previous: Option<&CircleCandidate>,
        params: &mut DetectionParams,
    );

    /// Chooses the circle to crop around, or `None` when nothing fits.
    fn iteration_circle_select(
        &self,
        iteration: usize,
        image: &Plane<u8>,
        candidates: &[CircleCandidate],
    ) -> Option<CircleCandidate> {
        default_iteration_circle_select(iteration, image, candidates)
    }

    /// Maps the last iteration's circle back into input coordinates.
    fn coordinate_remap(&self, records: &[IterationRecord], resize_ratio: f32) -> Circle {
        default_coordinate_remap(records, resize_ratio)
    }
}

/// Largest few circles on the full frame, then the brightest of them. Later
/// iterations take the brightest few and keep the roundest.
pub fn default_iteration_circle_select(
    iteration: usize,
    image: &Plane<u8>,
    candidates: &[CircleCandidate],
) -> Option<CircleCandidate> {
    if iteration == 0 {
        let largest = select_n_by_largest_radius(candidates, 5);
        select_by_brightness_perc(image, &largest)
    } else {
        let brightest = select_n_by_brightness_perc(image, candidates, 5);
        select_by_shape(image, &brightest)
    }
}

/// Adds the crop offsets of the last record and undoes the resize.
pub fn default_coordinate_remap(records: &[IterationRecord], resize_ratio: f32) -> Circle {
    let Some(last) = records.last() else {
        return Circle::INVALID;
    };
    let ratio = if resize_ratio > 0.0 { resize_ratio } else { 1.0 };
    let c = &last.candidate;
    let circle = Circle::from_f32(
        (c.x + last.offset.0 as f32) / ratio,
        (c.y + last.offset.1 as f32) / ratio,
        c.radius / ratio,
    );
    if circle.is_valid() {
        circle
    } else {
        Circle::INVALID
    }
}

/// Radius window on a crop, relative to the previous circle's radius.
pub const CROP_RADIUS_WINDOW: (f32, f32) = (0.8, 1.2);

/// Radius window and resolution schedule shared by the built-in steps.
///
/// The first iteration searches the whole frame with radius rates of its
/// longer side. Later ones run on a crop around the previous circle and look
/// for radii close to it with a finer accumulator.
fn scheduled_update(
    iteration: usize,
    brightness_perc: f32,
    shape: &ImageShape,
    previous: Option<&CircleCandidate>,
    params: &mut DetectionParams,
) {
    let longer = shape.longer_side as f32;
    let shorter = shape.shorter_side as f32;
    if iteration == 0 {
        params.min_dist = (shorter / 2.0).clamp(1.0, 50.0);
    } else {
        params.dp = (params.dp / 2.0).max(1.0);
        params.min_dist = (shorter / 2.0).max(1.0);
        params.min_radius_rate = 0.25;
        params.max_radius_rate = 0.6;
    }
    if let Some(prev) = previous.filter(|p| iteration > 0 && p.radius > 0.0) {
        params.min_radius = prev.radius * CROP_RADIUS_WINDOW.0;
        params.max_radius = prev.radius * CROP_RADIUS_WINDOW.1;
        return;
    }
    params.min_radius = longer * params.min_radius_rate;
    params.max_radius = longer * params.max_radius_rate;
    if brightness_perc < 0.01 {
        // Faint frames: the moon may be a thin sliver.
        params.min_radius /= 2.0;
    }
}

/// Gradient Hough on every iteration.
#[derive(Clone, Copy, Debug, Default)]
pub struct HoughGradientSteps;

impl DetectionSteps for HoughGradientSteps {
    fn algorithm(&self) -> HoughCirclesAlgorithm {
        HoughCirclesAlgorithm::HoughGradient
    }

    fn param_init(&self, _shape: &ImageShape) -> DetectionParams {
        DetectionParams::default()
    }

    fn iteration_param_update(
        &self,
        iteration: usize,
        brightness_perc: f32,
        shape: &ImageShape,
        previous: Option<&CircleCandidate>,
        params: &mut DetectionParams,
    ) {
        scheduled_update(iteration, brightness_perc, shape, previous, params);
    }
}

/// Contour finder on every iteration.
#[cfg(feature = "hough-alt")]
#[derive(Clone, Copy, Debug, Default)]
pub struct HoughGradientAltSteps;

#[cfg(feature = "hough-alt")]
impl DetectionSteps for HoughGradientAltSteps {
    fn algorithm(&self) -> HoughCirclesAlgorithm {
        HoughCirclesAlgorithm::HoughGradientAlt
    }

    fn param_init(&self, _shape: &ImageShape) -> DetectionParams {
        DetectionParams {
            algorithm: HoughCirclesAlgorithm::HoughGradientAlt,
            dp: 2.0,
            ..DetectionParams::default()
        }
    }

    fn iteration_param_update(
        &self,
        iteration: usize,
        brightness_perc: f32,
        shape: &ImageShape,
        previous: Option<&CircleCandidate>,
        params: &mut DetectionParams,
    ) {
        scheduled_update(iteration, brightness_perc, shape, previous, params);
        if iteration > 0 {
            params.min_perfectness = 0.6;
        }
    }
}

/// Confidence gap below which the mix steps prefer the larger circle.
#[cfg(feature = "hough-alt")]
pub const MIX_CONFIDENCE_TOLERANCE: f32 = 0.05;

/// Gradient Hough on the full frame, both finders on the crops.
#[cfg(feature = "hough-alt")]
#[derive(Clone, Copy, Debug, Default)]
pub struct HoughGradientMixSteps;

#[cfg(feature = "hough-alt")]
impl DetectionSteps for HoughGradientMixSteps {
    fn algorithm(&self) -> HoughCirclesAlgorithm {
        HoughCirclesAlgorithm::HoughGradientMix
    }

    fn param_init(&self, _shape: &ImageShape) -> DetectionParams {
        DetectionParams::default()
    }

    fn iteration_param_update(
        &self,
        iteration: usize,
        brightness_perc: f32,
        shape: &ImageShape,
        previous: Option<&CircleCandidate>,
        params: &mut DetectionParams,
    ) {
        scheduled_update(iteration, brightness_perc, shape, previous, params);
        params.algorithm = if iteration == 0 {
            HoughCirclesAlgorithm::HoughGradient
        } else {
            HoughCirclesAlgorithm::HoughGradientMix
        };
    }

    fn iteration_circle_select(
        &self,
        iteration: usize,
        image: &Plane<u8>,
        candidates: &[CircleCandidate],
    ) -> Option<CircleCandidate> {
        let (gradient, alt): (Vec<CircleCandidate>, Vec<CircleCandidate>) = candidates
            .iter()
            .partition(|c| c.source == HoughCirclesAlgorithm::HoughGradient);
        select_by_confidence(
            default_iteration_circle_select(iteration, image, &gradient),
            default_iteration_circle_select(iteration, image, &alt),
            MIX_CONFIDENCE_TOLERANCE,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(x: f32, y: f32, radius: f32) -> CircleCandidate {
        CircleCandidate {
            x,
            y,
            radius,
            confidence: 1.0,
            source: HoughCirclesAlgorithm::HoughGradient,
        }
    }

    #[test]
    fn schedule_narrows_radius_window_on_crops() {
        let steps = HoughGradientSteps;
        let mut params = steps.param_init(&ImageShape::new(500, 500));
        steps.iteration_param_update(0, 0.2, &ImageShape::new(500, 400), None, &mut params);
        assert!((params.min_radius - 15.0).abs() < 1e-3);
        assert!((params.max_radius - 300.0).abs() < 1e-3);
        assert_eq!(params.min_dist, 50.0);

        let prev = candidate(100.0, 100.0, 70.0);
        steps.iteration_param_update(1, 0.4, &ImageShape::new(200, 200), Some(&prev), &mut params);
        assert_eq!(params.dp, 2.0);
        assert!((params.min_radius - 56.0).abs() < 1e-3);
        assert!((params.max_radius - 84.0).abs() < 1e-3);
        assert_eq!(params.min_dist, 100.0);
    }

    #[test]
    fn small_circle_window_follows_the_previous_radius() {
        let steps = HoughGradientSteps;
        let mut params = steps.param_init(&ImageShape::new(500, 375));
        steps.iteration_param_update(0, 0.003, &ImageShape::new(500, 375), None, &mut params);
        // A 12 px circle padded by 30 px on each side gives an 84 px crop,
        // whose rate window would start at 21 px.
        let prev = candidate(42.0, 42.0, 12.0);
        steps.iteration_param_update(1, 0.06, &ImageShape::new(84, 84), Some(&prev), &mut params);
        assert!(params.min_radius <= 12.0 && params.max_radius >= 12.0);
        assert!((params.min_radius - 9.6).abs() < 1e-3);
        assert!((params.max_radius - 14.4).abs() < 1e-3);
    }

    #[test]
    fn crops_without_a_previous_circle_use_rates() {
        let steps = HoughGradientSteps;
        let mut params = steps.param_init(&ImageShape::new(500, 500));
        steps.iteration_param_update(1, 0.4, &ImageShape::new(200, 200), None, &mut params);
        assert!((params.min_radius - 50.0).abs() < 1e-3);
        assert!((params.max_radius - 120.0).abs() < 1e-3);
    }

    #[test]
    fn dark_frames_halve_min_radius() {
        let steps = HoughGradientSteps;
        let mut params = steps.param_init(&ImageShape::new(500, 500));
        steps.iteration_param_update(0, 0.001, &ImageShape::new(500, 500), None, &mut params);
        assert!((params.min_radius - 7.5).abs() < 1e-3);
    }

    #[test]
    fn remap_adds_offset_and_undoes_scale() {
        let record = IterationRecord {
            iteration: 1,
            candidate: CircleCandidate {
                x: 40.0,
                y: 30.0,
                radius: 20.0,
                confidence: 1.0,
                source: HoughCirclesAlgorithm::HoughGradient,
            },
            offset: (10, 20),
            crop: None,
        };
        assert_eq!(default_coordinate_remap(&[record], 0.5), Circle::new(100, 100, 40));
        assert_eq!(default_coordinate_remap(&[], 0.5), Circle::INVALID);
    }
}
