//! Moon (circle) detection.
//!
//! The detector runs a fixed loop over a binarised, downscaled frame:
//!
//! 1. find circle candidates with the configured Hough variant,
//! 2. pick one with the step's selection heuristic,
//! 3. crop around it and repeat on the crop with tighter parameters.
//!
//! When a crop yields no circle, the previous pick is carried into the crop
//! and kept.
//! The last circle is mapped back through the accumulated crop offsets and
//! the resize ratio. [`DetectionSteps`] controls every stage that is not the
//! loop itself.

use std::fmt;
use std::str::FromStr;

pub mod contours;
pub mod edges;
pub mod fit;
mod hough;
#[cfg(feature = "hough-alt")]
mod hough_alt;
pub mod select;
pub mod steps;

pub use steps::{DetectionParams, DetectionSteps, HoughGradientSteps};
#[cfg(feature = "hough-alt")]
pub use steps::{HoughGradientAltSteps, HoughGradientMixSteps};

use crate::image::{Image, Plane};
use crate::preprocess::{image_brightness_perc, ImageShape};
use crate::region::cut_plane_from_circle;
use crate::shapes::{Circle, Rectangle};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{MoonRegError, MoonRegResult};
use edges::canny;

/// Hough circle variants, with the numeric codes used at the boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HoughCirclesAlgorithm {
    Invalid,
    Empty,
    /// Gradient-direction voting into a centre accumulator.
    HoughGradient,
    /// Contour fitting scored by edge coverage.
    HoughGradientAlt,
    /// Gradient voting on the full frame, both variants on the crops.
    HoughGradientMix,
}

impl HoughCirclesAlgorithm {
    pub const ALL: [HoughCirclesAlgorithm; 5] = [
        HoughCirclesAlgorithm::Invalid,
        HoughCirclesAlgorithm::Empty,
        HoughCirclesAlgorithm::HoughGradient,
        HoughCirclesAlgorithm::HoughGradientAlt,
        HoughCirclesAlgorithm::HoughGradientMix,
    ];

    pub const fn code(self) -> u32 {
        match self {
            HoughCirclesAlgorithm::Invalid => 0x000,
            HoughCirclesAlgorithm::Empty => 0x001,
            HoughCirclesAlgorithm::HoughGradient => 0x101,
            HoughCirclesAlgorithm::HoughGradientAlt => 0x102,
            HoughCirclesAlgorithm::HoughGradientMix => 0x103,
        }
    }

    /// Unknown codes map to `Invalid`.
    pub fn from_code(code: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|a| a.code() == code)
            .unwrap_or(HoughCirclesAlgorithm::Invalid)
    }

    pub const fn name(self) -> &'static str {
        match self {
            HoughCirclesAlgorithm::Invalid => "invalid",
            HoughCirclesAlgorithm::Empty => "empty",
            HoughCirclesAlgorithm::HoughGradient => "hough_gradient",
            HoughCirclesAlgorithm::HoughGradientAlt => "hough_gradient_alt",
            HoughCirclesAlgorithm::HoughGradientMix => "hough_gradient_mix",
        }
    }

    /// Whether this build can run the algorithm.
    pub const fn is_supported(self) -> bool {
        match self {
            HoughCirclesAlgorithm::HoughGradient => true,
            HoughCirclesAlgorithm::HoughGradientAlt | HoughCirclesAlgorithm::HoughGradientMix => {
                cfg!(feature = "hough-alt")
            }
            HoughCirclesAlgorithm::Invalid | HoughCirclesAlgorithm::Empty => false,
        }
    }

    /// Rejects placeholder values and variants compiled out of this build.
    pub fn validate(self) -> MoonRegResult<Self> {
        match self {
            HoughCirclesAlgorithm::Invalid | HoughCirclesAlgorithm::Empty => Err(
                MoonRegError::InvalidInput("circle detection algorithm is empty or invalid"),
            ),
            a if !a.is_supported() => Err(MoonRegError::UnsupportedAlgorithm {
                algorithm: a.name(),
            }),
            a => Ok(a),
        }
    }
}

impl Default for HoughCirclesAlgorithm {
    /// The most capable variant compiled in.
    fn default() -> Self {
        if cfg!(feature = "hough-alt") {
            HoughCirclesAlgorithm::HoughGradientMix
        } else {
            HoughCirclesAlgorithm::HoughGradient
        }
    }
}

impl fmt::Display for HoughCirclesAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HoughCirclesAlgorithm {
    type Err = MoonRegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or(MoonRegError::InvalidInput("unknown circle detection algorithm"))
    }
}

/// Sub-pixel circle found by one of the finders.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CircleCandidate {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    /// Fraction of the perimeter backed by edges, in `[0, 1]`.
    pub confidence: f32,
    /// Finder that produced the candidate.
    pub source: HoughCirclesAlgorithm,
}

impl CircleCandidate {
    /// Rounded integer circle.
    pub fn circle(&self) -> Circle {
        Circle::from_f32(self.x, self.y, self.radius)
    }
}

/// Outcome of one detector iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IterationRecord {
    pub iteration: usize,
    /// Chosen circle, in the iteration's working-frame coordinates.
    pub candidate: CircleCandidate,
    /// Working-frame origin in preprocessed-frame coordinates.
    pub offset: (i32, i32),
    /// Crop taken around the candidate for the next iteration.
    pub crop: Option<Rectangle>,
}

/// Detection result with its provenance.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// Circle in input-image coordinates, or [`Circle::INVALID`].
    pub circle: Circle,
    /// Confidence of the last iteration's pick; 0 when nothing was found.
    pub confidence: f32,
    pub iterations: Vec<IterationRecord>,
}

impl Detection {
    fn not_found() -> Self {
        Self {
            circle: Circle::INVALID,
            confidence: 0.0,
            iterations: Vec::new(),
        }
    }

    pub fn is_found(&self) -> bool {
        self.circle.is_valid()
    }
}

/// Runs the finder(s) selected by `params.algorithm` on one working frame.
pub fn find_circles(image: &Plane<u8>, params: &DetectionParams) -> MoonRegResult<Vec<CircleCandidate>> {
    let _span = trace_span!("find_circles", algorithm = params.algorithm.name()).entered();
    let edges = canny(image, params.param1 / 2.0, params.param1, 1.0);
    match params.algorithm {
        HoughCirclesAlgorithm::HoughGradient => hough::hough_gradient(&edges, params),
        #[cfg(feature = "hough-alt")]
        HoughCirclesAlgorithm::HoughGradientAlt => hough_alt::hough_gradient_alt(&edges, params),
        #[cfg(feature = "hough-alt")]
        HoughCirclesAlgorithm::HoughGradientMix => {
            let mut found = hough::hough_gradient(&edges, params)?;
            found.extend(hough_alt::hough_gradient_alt(&edges, params)?);
            Ok(found)
        }
        other => other.validate().map(|_| Vec::new()),
    }
}

/// Loop limits applied on top of the steps' initial parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DetectorConfig {
    pub max_iteration: usize,
    pub circle_threshold: usize,
    pub crop_padding: i32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_iteration: 3,
            circle_threshold: 100,
            crop_padding: 30,
        }
    }
}

/// Iterative moon detector.
pub struct MoonDetector {
    steps: Box<dyn DetectionSteps>,
    config: Option<DetectorConfig>,
}

impl MoonDetector {
    /// Detector with the built-in steps for `algorithm`.
    pub fn new(algorithm: HoughCirclesAlgorithm) -> MoonRegResult<Self> {
        let steps: Box<dyn DetectionSteps> = match algorithm.validate()? {
            #[cfg(feature = "hough-alt")]
            HoughCirclesAlgorithm::HoughGradientAlt => Box::new(HoughGradientAltSteps),
            #[cfg(feature = "hough-alt")]
            HoughCirclesAlgorithm::HoughGradientMix => Box::new(HoughGradientMixSteps),
            _ => Box::new(HoughGradientSteps),
        };
        Ok(Self::with_steps(steps))
    }

    /// Detector driven by custom steps.
    pub fn with_steps(steps: Box<dyn DetectionSteps>) -> Self {
        Self {
            steps,
            config: None,
        }
    }

    /// Overrides the loop limits chosen by the steps.
    pub fn with_config(mut self, config: DetectorConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn algorithm(&self) -> HoughCirclesAlgorithm {
        self.steps.algorithm()
    }

    /// Circle in `image` coordinates, or [`Circle::INVALID`] when no moon
    /// is found.
    pub fn detect(&self, image: &Image) -> MoonRegResult<Circle> {
        self.detect_detailed(image).map(|d| d.circle)
    }

    pub fn detect_detailed(&self, image: &Image) -> MoonRegResult<Detection> {
        let _span = trace_span!(
            "detect_moon",
            algorithm = self.algorithm().name(),
            width = image.width(),
            height = image.height()
        )
        .entered();
        let steps = self.steps.as_ref();
        let (mut working, ratio) = steps.preprocess(image)?;
        let mut params = steps.param_init(&ImageShape::of_plane(&working));
        if let Some(config) = self.config {
            params.max_iteration = config.max_iteration;
            params.circle_threshold = config.circle_threshold;
            params.crop_padding = config.crop_padding;
        }
        let mut offset = (0i32, 0i32);
        let mut records: Vec<IterationRecord> = Vec::new();
        // Last pick, in the current working frame's coordinates.
        let mut previous: Option<CircleCandidate> = None;

        for iteration in 0..params.max_iteration {
            let _iter_span = trace_span!("detect_iteration", iteration = iteration).entered();
            let shape = ImageShape::of_plane(&working);
            let brightness = image_brightness_perc(&working);
            steps.iteration_param_update(iteration, brightness, &shape, previous.as_ref(), &mut params);
            let candidates = find_circles(&working, &params)?;
            trace_event!("circles_found", candidates = candidates.len());

            let chosen = match steps.iteration_circle_select(iteration, &working, &candidates) {
                Some(c) if c.circle().is_valid() => c,
                _ => match previous {
                    Some(prev) if iteration > 0 => {
                        trace_warn!("detect_keep_previous", iteration = iteration);
                        prev
                    }
                    _ => return Ok(Detection::not_found()),
                },
            };
            records.push(IterationRecord {
                iteration,
                candidate: chosen,
                offset,
                crop: None,
            });
            if iteration + 1 == params.max_iteration {
                break;
            }
            let Ok((next, rect)) = cut_plane_from_circle(&working, &chosen.circle(), params.crop_padding) else {
                break;
            };
            if let Some(last) = records.last_mut() {
                last.crop = Some(rect);
            }
            offset = (offset.0 + rect.top_left_x, offset.1 + rect.top_left_y);
            previous = Some(CircleCandidate {
                x: chosen.x - rect.top_left_x as f32,
                y: chosen.y - rect.top_left_y as f32,
                ..chosen
            });
            working = next;
        }

        let circle = steps.coordinate_remap(&records, ratio);
        let confidence = records.last().map_or(0.0, |r| r.candidate.confidence);
        trace_event!("detect_done", x = circle.x, y = circle.y, radius = circle.radius);
        Ok(Detection {
            circle,
            confidence,
            iterations: records,
        })
    }
}

/// One-shot detection with the built-in steps for `algorithm`.
pub fn detect_moon(image: &Image, algorithm: HoughCirclesAlgorithm) -> MoonRegResult<Circle> {
    MoonDetector::new(algorithm)?.detect(image)
}
