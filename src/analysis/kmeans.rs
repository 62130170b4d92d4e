//! Small deterministic k-means for grouping insiders

use super::stats::{mean, population_std};

const MAX_ITERATIONS: usize = 100;

/// Scale each feature column to zero mean and unit variance. A constant
/// column becomes all zeros.
pub fn standardize(points: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dims = points.first().map(Vec::len).unwrap_or(0);
    let mut scaled = points.to_vec();

    for dim in 0..dims {
        let column: Vec<f64> = points.iter().map(|p| p[dim]).collect();
        let (Some(mu), Some(sigma)) = (mean(&column), population_std(&column)) else {
            continue;
        };
        for point in scaled.iter_mut() {
            point[dim] = if sigma > 0.0 { (point[dim] - mu) / sigma } else { 0.0 };
        }
    }
    scaled
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    centroids
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| squared_distance(point, a).total_cmp(&squared_distance(point, b)))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Farthest-point seeding: the first point, then repeatedly the point
/// farthest from every centroid chosen so far.
fn seed_centroids(points: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let mut centroids = vec![points[0].clone()];
    while centroids.len() < k {
        let next = points
            .iter()
            .map(|p| centroids.iter().map(|c| squared_distance(p, c)).fold(f64::INFINITY, f64::min))
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, d)| if d > best.1 { (i, d) } else { best });
        centroids.push(points[next.0].clone());
    }
    centroids
}

/// Cluster label per point, `0..k`. Labels are numbered in order of first
/// appearance so the same input always gives the same labels.
pub fn kmeans(points: &[Vec<f64>], k: usize) -> Vec<usize> {
    if points.is_empty() {
        return Vec::new();
    }
    let k = k.clamp(1, points.len());
    let mut centroids = seed_centroids(points, k);
    let mut labels: Vec<usize> = points.iter().map(|p| nearest(p, &centroids)).collect();

    for _ in 0..MAX_ITERATIONS {
        for (cluster, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&Vec<f64>> = points
                .iter()
                .zip(&labels)
                .filter(|(_, &label)| label == cluster)
                .map(|(p, _)| p)
                .collect();
            // An emptied cluster keeps its previous centroid
            if members.is_empty() {
                continue;
            }
            for (dim, value) in centroid.iter_mut().enumerate() {
                *value = members.iter().map(|m| m[dim]).sum::<f64>() / members.len() as f64;
            }
        }

        let next: Vec<usize> = points.iter().map(|p| nearest(p, &centroids)).collect();
        if next == labels {
            break;
        }
        labels = next;
    }

    relabel_by_first_appearance(&labels)
}

fn relabel_by_first_appearance(labels: &[usize]) -> Vec<usize> {
    let mut mapping: Vec<(usize, usize)> = Vec::new();
    labels
        .iter()
        .map(|label| match mapping.iter().find(|(old, _)| old == label) {
            Some(&(_, new)) => new,
            None => {
                let new = mapping.len();
                mapping.push((*label, new));
                new
            }
        })
        .collect()
}
