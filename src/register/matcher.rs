//! Brute-force k-nearest-neighbour descriptor matching.

use crate::features::Descriptors;
use crate::trace::{trace_event, trace_span};
use crate::util::{MoonRegError, MoonRegResult};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// A query row matched to a train row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

/// For each query row, the `k` closest train rows in ascending distance.
///
/// Equal distances keep the lower train index first. Queries with fewer
/// than `k` train rows available get shorter lists.
pub fn knn_match(query: &Descriptors, train: &Descriptors, k: usize) -> MoonRegResult<Vec<Vec<DMatch>>> {
    knn_match_with(query, train, k, cfg!(feature = "rayon"))
}

/// [`knn_match`] with explicit control over parallelism; the result does not
/// depend on `parallel`.
pub fn knn_match_with(
    query: &Descriptors,
    train: &Descriptors,
    k: usize,
    parallel: bool,
) -> MoonRegResult<Vec<Vec<DMatch>>> {
    if k == 0 {
        return Err(MoonRegError::InvalidInput("knn k must be at least 1"));
    }
    if query.is_binary() != train.is_binary() || query.row_len() != train.row_len() {
        return Err(MoonRegError::registration(
            "descriptor kinds or lengths differ between images",
        ));
    }
    let _span = trace_span!("knn_match", queries = query.len(), train = train.len(), k = k).entered();

    let rows = query.len();
    let matches = if parallel {
        match_rows_parallel(query, train, k, rows)
    } else {
        (0..rows).map(|q| match_row(query, train, k, q)).collect()
    };
    trace_event!("knn_matched", rows = rows);
    Ok(matches)
}

#[cfg(feature = "rayon")]
fn match_rows_parallel(query: &Descriptors, train: &Descriptors, k: usize, rows: usize) -> Vec<Vec<DMatch>> {
    (0..rows)
        .into_par_iter()
        .map(|q| match_row(query, train, k, q))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn match_rows_parallel(query: &Descriptors, train: &Descriptors, k: usize, rows: usize) -> Vec<Vec<DMatch>> {
    (0..rows).map(|q| match_row(query, train, k, q)).collect()
}

fn match_row(query: &Descriptors, train: &Descriptors, k: usize, q: usize) -> Vec<DMatch> {
    let mut best: Vec<DMatch> = Vec::with_capacity(k + 1);
    for t in 0..train.len() {
        let Some(distance) = query.distance(q, train, t) else {
            continue;
        };
        // Strict comparison keeps earlier train rows ahead on ties.
        if best.len() == k && best.last().is_some_and(|m| distance >= m.distance) {
            continue;
        }
        let pos = best.partition_point(|m| m.distance <= distance);
        best.insert(
            pos,
            DMatch {
                query_idx: q,
                train_idx: t,
                distance,
            },
        );
        best.truncate(k);
    }
    best
}
