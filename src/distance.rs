use crate::point::{Centroid, Point};
use ndarray::ArrayView1;

/// Euclidean (L2) distance between two coordinate vectors
#[inline]
pub fn euclidean_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Find the centroid of `bucket` nearest to `point`
///
/// Centroids are scanned in slice order, which is position-index order for a
/// store bucket. Only a strictly smaller distance replaces the current best,
/// so on a tie the lower position index wins.
///
/// # Returns
/// * `None` if the bucket is empty, otherwise the winner and its distance
pub fn nearest_centroid<'a>(point: &Point, bucket: &'a [Centroid]) -> Option<(&'a Centroid, f64)> {
    let mut best: Option<(&Centroid, f64)> = None;

    for centroid in bucket {
        let dist = point.distance(centroid.point());
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((centroid, dist)),
        }
    }

    best
}

/// True when every coordinate pair differs by at most `tol`
pub fn within_tolerance(a: &ArrayView1<f64>, b: &ArrayView1<f64>, tol: f64) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tol)
}

/// Largest absolute coordinate movement between two vectors
pub fn max_shift(old: &ArrayView1<f64>, new: &ArrayView1<f64>) -> f64 {
    old.iter()
        .zip(new.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}
