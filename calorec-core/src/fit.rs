//! Straight-line fits through a cluster's layer centroids.

use nalgebra::{Point3, Unit, Vector3};

use crate::cluster::Cluster;
use crate::error::{Error, Result};
use crate::hit::CaloHit;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result of a straight-line fit over a contiguous layer range of one cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterFitResult {
    /// Fitted direction, oriented from inner to outer layers.
    pub direction: Unit<Vector3<f64>>,
    /// A point on the fitted line (the mean centroid).
    pub intercept: Point3<f64>,
    /// Mean squared perpendicular residual of the centroids about the line (mm^2).
    pub chi2: f64,
    /// Root of the mean squared residual (mm).
    pub rms: f64,
    /// Cosine between the fitted direction and the radial direction at the intercept.
    pub radial_direction_cosine: f64,
    /// Whether the fit converged and passed acceptance.
    pub successful: bool,
}

impl Default for ClusterFitResult {
    fn default() -> Self {
        Self {
            direction: Vector3::z_axis(),
            intercept: Point3::origin(),
            chi2: f64::INFINITY,
            rms: f64::INFINITY,
            radial_direction_cosine: 0.0,
            successful: false,
        }
    }
}

impl ClusterFitResult {
    /// An unsuccessful placeholder result.
    #[must_use]
    pub fn unsuccessful() -> Self {
        Self::default()
    }
}

/// Fits a straight line through the per-layer centroids of `cluster` over
/// the pseudolayer range `[inner_layer, outer_layer]`.
///
/// Each occupied layer in the range contributes one energy-weighted centroid;
/// the line is a per-coordinate least-squares regression against pseudolayer,
/// so the direction points from inner to outer layers. Fewer than two
/// centroids, or centroids with no spatial spread, yield an unsuccessful
/// result rather than an error.
///
/// # Errors
/// Returns [`Error::InvalidLayerRange`] if `inner_layer > outer_layer`.
pub fn fit_layer_centroids(
    cluster: &Cluster,
    hits: &[CaloHit],
    inner_layer: u32,
    outer_layer: u32,
) -> Result<ClusterFitResult> {
    if inner_layer > outer_layer {
        return Err(Error::InvalidLayerRange {
            inner: inner_layer,
            outer: outer_layer,
        });
    }

    let mut layers: Vec<f64> = Vec::new();
    let mut centroids: Vec<Point3<f64>> = Vec::new();
    for (layer, _) in cluster.layers_in_range(inner_layer, outer_layer) {
        if let Some(centroid) = cluster.layer_centroid(layer, hits) {
            layers.push(f64::from(layer));
            centroids.push(centroid);
        }
    }

    if centroids.len() < 2 {
        return Ok(ClusterFitResult::unsuccessful());
    }

    let n = layers.len() as f64;
    let layer_mean = layers.iter().sum::<f64>() / n;
    let mut centroid_mean = Vector3::zeros();
    for centroid in &centroids {
        centroid_mean += centroid.coords;
    }
    centroid_mean /= n;

    let mut layer_var = 0.0;
    let mut covariance = Vector3::zeros();
    for (layer, centroid) in layers.iter().zip(&centroids) {
        let dl = layer - layer_mean;
        layer_var += dl * dl;
        covariance += (centroid.coords - centroid_mean) * dl;
    }

    // Layers in the range are distinct, so layer_var > 0 for >= 2 centroids.
    let slope = covariance / layer_var;
    let Some(direction) = Unit::try_new(slope, 1.0e-12) else {
        return Ok(ClusterFitResult::unsuccessful());
    };

    let intercept = Point3::from(centroid_mean);
    let mut residual_sq_sum = 0.0;
    for centroid in &centroids {
        let offset = centroid.coords - centroid_mean;
        let along = direction.dot(&offset);
        residual_sq_sum += offset.norm_squared() - along * along;
    }
    let chi2 = (residual_sq_sum / n).max(0.0);

    let radial_direction_cosine = Unit::try_new(centroid_mean, 1.0e-12)
        .map_or(0.0, |radial| direction.dot(&radial));

    Ok(ClusterFitResult {
        direction,
        intercept,
        chi2,
        rms: chi2.sqrt(),
        radial_direction_cosine,
        successful: true,
    })
}

/// Cheap two-point direction estimate: the normalized difference between the
/// centroids of the outermost and innermost occupied layers in the range.
///
/// Returns `None` when fewer than two occupied layers exist in the range or
/// the two centroids coincide.
#[must_use]
pub fn approximate_direction(
    cluster: &Cluster,
    hits: &[CaloHit],
    inner_layer: u32,
    outer_layer: u32,
) -> Option<Unit<Vector3<f64>>> {
    let mut occupied = cluster
        .layers_in_range(inner_layer, outer_layer)
        .map(|(layer, _)| layer);
    let first = occupied.next()?;
    let last = occupied.last()?;

    let inner_centroid = cluster.layer_centroid(first, hits)?;
    let outer_centroid = cluster.layer_centroid(last, hits)?;
    Unit::try_new(outer_centroid - inner_centroid, 1.0e-12)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::HitRegion;
    use crate::hit::HitId;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn hit_at(x: f64, y: f64, z: f64, layer: u32) -> CaloHit {
        CaloHit::builder(Point3::new(x, y, z), layer, HitRegion::EcalBarrel)
            .with_hadronic_energy(1.0)
            .build()
            .unwrap()
    }

    fn cluster_over(hits: &[CaloHit]) -> Cluster {
        let mut cluster = Cluster::new();
        for (i, hit) in hits.iter().enumerate() {
            cluster.add_hit(HitId(i), hit);
        }
        cluster
    }

    #[test]
    fn test_fit_straight_line_along_z() {
        let hits: Vec<CaloHit> = (0..5)
            .map(|i| hit_at(10.0, 0.0, 100.0 + 10.0 * f64::from(i), i as u32))
            .collect();
        let cluster = cluster_over(&hits);

        let fit = fit_layer_centroids(&cluster, &hits, 0, 4).unwrap();
        assert!(fit.successful);
        assert_relative_eq!(fit.direction.z, 1.0, epsilon = 1.0e-9);
        assert_relative_eq!(fit.chi2, 0.0, epsilon = 1.0e-9);
        assert_relative_eq!(fit.intercept.z, 120.0, epsilon = 1.0e-9);
    }

    #[test]
    fn test_fit_reports_residuals() {
        // Centroids zig-zag in x around a line along z.
        let hits = vec![
            hit_at(1.0, 0.0, 100.0, 0),
            hit_at(-1.0, 0.0, 110.0, 1),
            hit_at(1.0, 0.0, 120.0, 2),
            hit_at(-1.0, 0.0, 130.0, 3),
        ];
        let cluster = cluster_over(&hits);

        let fit = fit_layer_centroids(&cluster, &hits, 0, 3).unwrap();
        assert!(fit.successful);
        assert!(fit.chi2 > 0.0);
        assert_relative_eq!(fit.rms, fit.chi2.sqrt(), epsilon = 1.0e-12);
    }

    #[test]
    fn test_fit_single_layer_is_unsuccessful() {
        let hits = vec![hit_at(0.0, 0.0, 100.0, 2), hit_at(1.0, 0.0, 100.0, 2)];
        let cluster = cluster_over(&hits);

        let fit = fit_layer_centroids(&cluster, &hits, 0, 10).unwrap();
        assert!(!fit.successful);
    }

    #[test]
    fn test_inverted_layer_range_is_an_error() {
        let hits = vec![hit_at(0.0, 0.0, 100.0, 2)];
        let cluster = cluster_over(&hits);
        assert!(fit_layer_centroids(&cluster, &hits, 5, 1).is_err());
    }

    #[test]
    fn test_approximate_direction() {
        let hits = vec![hit_at(0.0, 0.0, 100.0, 0), hit_at(0.0, 0.0, 150.0, 5)];
        let cluster = cluster_over(&hits);

        let direction = approximate_direction(&cluster, &hits, 0, 5).unwrap();
        assert_relative_eq!(direction.z, 1.0, epsilon = 1.0e-12);
        assert!(approximate_direction(&cluster, &hits, 0, 0).is_none());
    }
}
