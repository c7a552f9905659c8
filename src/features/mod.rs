//! Keypoint detectors and descriptors.
//!
//! Four families are available behind [`RegistrationAlgorithm`]: SIFT
//! (float descriptors, L2) and ORB, AKAZE, BRISK (binary descriptors,
//! Hamming). All of them run on an 8-bit gray [`Plane`] and are
//! deterministic.

use std::fmt;
use std::str::FromStr;

pub mod akaze;
pub mod brisk;
pub(crate) mod fast;
pub mod orb;
pub mod sift;

use crate::image::Plane;
use crate::trace::{trace_event, trace_span};
use crate::util::math::{hamming, l2};
use crate::util::{MoonRegError, MoonRegResult};

/// Feature family used for registration, with its boundary code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegistrationAlgorithm {
    Invalid,
    Empty,
    Sift,
    Orb,
    Akaze,
    Brisk,
}

impl RegistrationAlgorithm {
    pub const ALL: [RegistrationAlgorithm; 6] = [
        RegistrationAlgorithm::Invalid,
        RegistrationAlgorithm::Empty,
        RegistrationAlgorithm::Sift,
        RegistrationAlgorithm::Orb,
        RegistrationAlgorithm::Akaze,
        RegistrationAlgorithm::Brisk,
    ];

    pub const fn code(self) -> u32 {
        match self {
            RegistrationAlgorithm::Invalid => 0x000,
            RegistrationAlgorithm::Empty => 0x001,
            RegistrationAlgorithm::Sift => 0x100,
            RegistrationAlgorithm::Orb => 0x101,
            RegistrationAlgorithm::Akaze => 0x102,
            RegistrationAlgorithm::Brisk => 0x103,
        }
    }

    /// Unknown codes map to `Invalid`.
    pub fn from_code(code: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|a| a.code() == code)
            .unwrap_or(RegistrationAlgorithm::Invalid)
    }

    pub const fn name(self) -> &'static str {
        match self {
            RegistrationAlgorithm::Invalid => "invalid",
            RegistrationAlgorithm::Empty => "empty",
            RegistrationAlgorithm::Sift => "sift",
            RegistrationAlgorithm::Orb => "orb",
            RegistrationAlgorithm::Akaze => "akaze",
            RegistrationAlgorithm::Brisk => "brisk",
        }
    }

    /// Rejects the placeholder values.
    pub fn validate(self) -> MoonRegResult<Self> {
        match self {
            RegistrationAlgorithm::Invalid | RegistrationAlgorithm::Empty => Err(
                MoonRegError::InvalidInput("registration algorithm is empty or invalid"),
            ),
            a => Ok(a),
        }
    }
}

impl Default for RegistrationAlgorithm {
    fn default() -> Self {
        RegistrationAlgorithm::Sift
    }
}

impl fmt::Display for RegistrationAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RegistrationAlgorithm {
    type Err = MoonRegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or(MoonRegError::InvalidInput("unknown registration algorithm"))
    }
}

/// A detected feature in full-resolution pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Diameter of the meaningful neighbourhood.
    pub size: f32,
    /// Orientation in degrees `[0, 360)`, `-1` when not oriented.
    pub angle: f32,
    pub response: f32,
    /// Pyramid level (or octave) the feature was found on.
    pub octave: i32,
}

/// One descriptor row per keypoint.
#[derive(Clone, Debug, PartialEq)]
pub enum Descriptors {
    /// Packed bits compared by Hamming distance.
    Binary { row_len: usize, data: Vec<u8> },
    /// Float vectors compared by L2 distance.
    Float { row_len: usize, data: Vec<f32> },
}

impl Descriptors {
    pub fn empty_binary(row_len: usize) -> Self {
        Descriptors::Binary {
            row_len,
            data: Vec::new(),
        }
    }

    pub fn empty_float(row_len: usize) -> Self {
        Descriptors::Float {
            row_len,
            data: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Descriptors::Binary { row_len, data } => data.len().checked_div(*row_len).unwrap_or(0),
            Descriptors::Float { row_len, data } => data.len().checked_div(*row_len).unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row_len(&self) -> usize {
        match self {
            Descriptors::Binary { row_len, .. } | Descriptors::Float { row_len, .. } => *row_len,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Descriptors::Binary { .. })
    }

    /// Distance between row `i` of `self` and row `j` of `other`; `None`
    /// when the kinds or row lengths differ.
    pub fn distance(&self, i: usize, other: &Descriptors, j: usize) -> Option<f32> {
        match (self, other) {
            (
                Descriptors::Binary { row_len: a, data: da },
                Descriptors::Binary { row_len: b, data: db },
            ) if a == b => Some(hamming(&da[i * a..(i + 1) * a], &db[j * b..(j + 1) * b]) as f32),
            (
                Descriptors::Float { row_len: a, data: da },
                Descriptors::Float { row_len: b, data: db },
            ) if a == b => Some(l2(&da[i * a..(i + 1) * a], &db[j * b..(j + 1) * b])),
            _ => None,
        }
    }
}

/// Keypoints with their descriptor rows, index-aligned.
#[derive(Clone, Debug, PartialEq)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Descriptors,
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// A keypoint detector with its descriptor extractor.
pub trait FeatureDetector: Send + Sync {
    fn algorithm(&self) -> RegistrationAlgorithm;

    /// Detects keypoints on `gray` and describes them.
    fn detect_and_compute(&self, gray: &Plane<u8>) -> Features;
}

/// Detector with default parameters for `algorithm`.
pub fn create_detector(algorithm: RegistrationAlgorithm) -> MoonRegResult<Box<dyn FeatureDetector>> {
    Ok(match algorithm.validate()? {
        RegistrationAlgorithm::Sift => Box::new(sift::Sift::default()),
        RegistrationAlgorithm::Orb => Box::new(orb::Orb::default()),
        RegistrationAlgorithm::Akaze => Box::new(akaze::Akaze::default()),
        RegistrationAlgorithm::Brisk => Box::new(brisk::Brisk::default()),
        RegistrationAlgorithm::Invalid | RegistrationAlgorithm::Empty => {
            return Err(MoonRegError::InvalidInput("registration algorithm is empty or invalid"))
        }
    })
}

/// One-shot detection with default parameters.
pub fn detect_and_compute(gray: &Plane<u8>, algorithm: RegistrationAlgorithm) -> MoonRegResult<Features> {
    let detector = create_detector(algorithm)?;
    let _span = trace_span!("detect_and_compute", algorithm = algorithm.name()).entered();
    let features = detector.detect_and_compute(gray);
    trace_event!("features", keypoints = features.len());
    Ok(features)
}

/// Keeps the `max` strongest keypoints (stable for equal responses).
pub(crate) fn retain_best<T>(items: &mut Vec<T>, max: usize, response: impl Fn(&T) -> f32) {
    if max == 0 || items.len() <= max {
        return;
    }
    items.sort_by(|a, b| response(b).total_cmp(&response(a)));
    items.truncate(max);
}
