//! Good-match filters applied to kNN results.
//!
//! A filter sees the two nearest model keypoints for one user keypoint
//! together with both keypoint sets and image sizes. Filters compose with
//! [`AllOf`].

use super::matcher::DMatch;
use crate::features::Keypoint;

/// What a filter may inspect for one kNN row.
#[derive(Clone, Copy, Debug)]
pub struct MatchContext<'a> {
    pub user_keypoints: &'a [Keypoint],
    pub model_keypoints: &'a [Keypoint],
    /// `(width, height)` of the user image.
    pub user_size: (usize, usize),
    /// `(width, height)` of the (resized) model image.
    pub model_size: (usize, usize),
}

impl MatchContext<'_> {
    fn pair(&self, m: &DMatch) -> Option<(&Keypoint, &Keypoint)> {
        Some((
            self.user_keypoints.get(m.query_idx)?,
            self.model_keypoints.get(m.train_idx)?,
        ))
    }
}

/// Decides whether the best match of a kNN row is good.
pub trait MatchFilter: Send + Sync {
    /// `knn` is sorted by ascending distance and holds at least one match.
    fn accepts(&self, ctx: &MatchContext<'_>, knn: &[DMatch]) -> bool;
}

/// Lowe's ratio test: `best < ratio * second`. Rows without a second
/// neighbour are rejected.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LowesRatio {
    pub ratio: f32,
}

impl MatchFilter for LowesRatio {
    fn accepts(&self, _ctx: &MatchContext<'_>, knn: &[DMatch]) -> bool {
        match knn {
            [m, n, ..] => m.distance < self.ratio * n.distance,
            _ => false,
        }
    }
}

/// Keeps matches whose keypoints both lie within `keep_ratio` of the
/// half shorter side from their image centre.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IgnoreEdge {
    pub keep_ratio: f32,
}

impl IgnoreEdge {
    fn inside(&self, kp: &Keypoint, (w, h): (usize, usize)) -> bool {
        let radius = self.keep_ratio * w.min(h) as f32 * 0.5;
        let (dx, dy) = (kp.x - w as f32 * 0.5, kp.y - h as f32 * 0.5);
        dx * dx + dy * dy <= radius * radius
    }
}

impl MatchFilter for IgnoreEdge {
    fn accepts(&self, ctx: &MatchContext<'_>, knn: &[DMatch]) -> bool {
        let Some((user, model)) = knn.first().and_then(|m| ctx.pair(m)) else {
            return false;
        };
        self.inside(user, ctx.user_size) && self.inside(model, ctx.model_size)
    }
}

/// Drops matches whose user and model positions are closer than
/// `min_fraction` of the user image diagonal (stationary overlays).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IgnoreClose {
    pub min_fraction: f32,
}

impl Default for IgnoreClose {
    fn default() -> Self {
        Self { min_fraction: 0.03 }
    }
}

impl MatchFilter for IgnoreClose {
    fn accepts(&self, ctx: &MatchContext<'_>, knn: &[DMatch]) -> bool {
        let Some((user, model)) = knn.first().and_then(|m| ctx.pair(m)) else {
            return false;
        };
        let (w, h) = ctx.user_size;
        let min_dist = self.min_fraction * (w as f32).hypot(h as f32);
        (user.x - model.x).hypot(user.y - model.y) >= min_dist
    }
}

/// Accepts when every inner filter accepts.
#[derive(Default)]
pub struct AllOf(pub Vec<Box<dyn MatchFilter>>);

impl AllOf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl MatchFilter + 'static) -> Self {
        self.0.push(Box::new(filter));
        self
    }
}

impl MatchFilter for AllOf {
    fn accepts(&self, ctx: &MatchContext<'_>, knn: &[DMatch]) -> bool {
        self.0.iter().all(|f| f.accepts(ctx, knn))
    }
}

/// Best match of every row the filter accepts.
pub fn good_matches(filter: &dyn MatchFilter, ctx: &MatchContext<'_>, knn: &[Vec<DMatch>]) -> Vec<DMatch> {
    knn.iter()
        .filter(|row| !row.is_empty() && filter.accepts(ctx, row))
        .map(|row| row[0])
        .collect()
}
