//! Generic-distance metric engine.
//!
//! Computes the dimensionless association distance between a candidate hit
//! and an existing cluster at a given search layer. The metric is an ordered
//! sequence of sub-metrics evaluated over a shared context; each sub-metric
//! either contributes a candidate value or reports that it does not apply.
//! Values at or above the configured generic-distance cut never associate
//! (strict less-than semantics).

use calorec_core::{
    CaloHit, Cluster, Error, Event, Granularity, PseudoLayerPlugin, Result, Track,
};
use nalgebra::{Point3, Unit, Vector3};

use crate::cone::ConeClusteringConfig;

/// Below this, a granularity-derived distance cut indicates a broken
/// configuration rather than a legitimate absence of association.
const CUT_EPSILON: f64 = f64::EPSILON;

/// Sub-distances accepted below the generic cut under the mip-track and
/// track-seed rules are trusted more and discounted by this factor.
const TRUSTED_DISTANCE_DISCOUNT: f64 = 5.0;

/// Generic-distance calculator over one event.
///
/// Borrows the event, configuration, and geometry oracle for the duration of
/// a clustering pass.
pub struct GenericDistance<'a> {
    config: &'a ConeClusteringConfig,
    geometry: &'a dyn PseudoLayerPlugin,
    event: &'a Event,
}

impl<'a> GenericDistance<'a> {
    /// Creates a calculator for one pass.
    #[must_use]
    pub fn new(
        config: &'a ConeClusteringConfig,
        geometry: &'a dyn PseudoLayerPlugin,
        event: &'a Event,
    ) -> Self {
        Self {
            config,
            geometry,
            event,
        }
    }

    /// Computes the generic distance between `hit` and `cluster` at
    /// `search_layer`.
    ///
    /// Returns `Ok(Some(d))` only when the smallest qualifying sub-distance
    /// `d` is strictly below `best_so_far`; `Ok(None)` means no improvement
    /// (topological non-association included), which is a normal outcome.
    ///
    /// # Errors
    /// A zero-length granularity-derived cut is a configuration error, never
    /// a silent skip.
    pub fn generic_distance(
        &self,
        cluster: &Cluster,
        hit: &CaloHit,
        search_layer: u32,
        best_so_far: f64,
    ) -> Result<Option<f64>> {
        // At or before the interaction-point pseudolayer, a track-seeded
        // cluster is compared against its track projection alone.
        if search_layer <= self.geometry.pseudo_layer_at_ip() && cluster.is_track_seeded() {
            return self.track_projection_distance(cluster, hit, best_so_far);
        }

        // Occupancy gate: every remaining sub-metric needs cluster hits in
        // the search layer.
        let Some(layer_hits) = cluster.hits_in_layer(search_layer) else {
            return Ok(None);
        };

        let mut best = best_so_far;
        let mut improved = false;

        if hit.pseudo_layer() == search_layer {
            if let Some(d) = self.same_layer_distance(hit, layer_hits)? {
                if d < best {
                    best = d;
                    improved = true;
                }
            }
        }

        if let Some(initial_direction) = cluster.initial_direction() {
            if let Some(mut d) =
                self.cone_approach_to_layer(hit, layer_hits, &initial_direction)?
            {
                if self.config.should_follow_initial_direction
                    && cluster.is_track_seeded()
                    && search_layer > self.config.track_seed_cutoff_layer
                {
                    d /= TRUSTED_DISTANCE_DISCOUNT;
                }
                if d < best {
                    best = d;
                    improved = true;
                }
            }
        }

        let fit = cluster.current_fit();
        if fit.successful {
            if let Some(mut d) = self.cone_approach_to_layer(hit, layer_hits, &fit.direction)? {
                if d < self.config.generic_distance_cut && fit.chi2 < self.config.mip_track_chi2_cut
                {
                    d /= TRUSTED_DISTANCE_DISCOUNT;
                }
                if d < best {
                    best = d;
                    improved = true;
                }
            }
        }

        if cluster.is_track_seeded() && !self.config.should_follow_initial_direction {
            if let Some(mut d) = self.track_seed_distance(cluster, hit, search_layer)? {
                if d < self.config.generic_distance_cut {
                    d /= TRUSTED_DISTANCE_DISCOUNT;
                }
                if d < best {
                    best = d;
                    improved = true;
                }
            }
        }

        Ok(improved.then_some(best))
    }

    /// Sub-metric 1: cone approach between the hit and the seed track's
    /// projected position and direction at the calorimeter face.
    ///
    /// An expected-direction cosine below the minimum is a hard topological
    /// veto: no association, not a large distance.
    fn track_projection_distance(
        &self,
        cluster: &Cluster,
        hit: &CaloHit,
        best_so_far: f64,
    ) -> Result<Option<f64>> {
        let Some(track_id) = cluster.seed_track() else {
            return Ok(None);
        };
        let track = self.event.track(track_id)?;
        let state = track.state_at_calorimeter();
        let track_direction = state.direction();

        if hit.expected_direction().dot(&track_direction) < self.config.min_hit_track_cos_angle {
            return Ok(None);
        }

        let distance = self.cone_approach(hit, state.position, &track_direction)?;
        Ok(distance.filter(|d| *d < best_so_far))
    }

    /// Sub-metric 3: minimum Euclidean separation to the cluster's hits in
    /// the hit's own layer, normalized by the granularity pad-width cut.
    fn same_layer_distance(
        &self,
        hit: &CaloHit,
        layer_hits: &[calorec_core::HitId],
    ) -> Result<Option<f64>> {
        let pad_widths = match self.geometry.granularity(hit.region()) {
            Granularity::Fine => self.config.same_layer_pad_widths_fine,
            Granularity::Coarse => self.config.same_layer_pad_widths_coarse,
        };
        let cut = pad_widths * hit.cell_length_scale();
        if cut < CUT_EPSILON {
            return Err(Error::Config("zero same-layer pad-width cut".into()));
        }

        let mut smallest = f64::INFINITY;
        for id in layer_hits {
            let separation = (hit.position() - self.event.hit(*id)?.position()).norm();
            smallest = smallest.min(separation / cut);
        }
        Ok(smallest.is_finite().then_some(smallest))
    }

    /// Sub-metrics 4 and 5: minimum cone-approach distance from the hit to
    /// the cluster's hits in the search layer, along the given axis.
    fn cone_approach_to_layer(
        &self,
        hit: &CaloHit,
        layer_hits: &[calorec_core::HitId],
        axis: &Unit<Vector3<f64>>,
    ) -> Result<Option<f64>> {
        let mut smallest = f64::INFINITY;
        for id in layer_hits {
            let apex = self.event.hit(*id)?.position();
            if let Some(d) = self.cone_approach(hit, apex, axis)? {
                smallest = smallest.min(d);
            }
        }
        Ok(smallest.is_finite().then_some(smallest))
    }

    /// Cone-approach distance: the separation's perpendicular component,
    /// normalized by a cut that widens with the along-axis distance
    /// (approximating shower spread). Applies only inside the configured
    /// along-axis projection window (endpoints included) and below the hard
    /// maximum separation.
    fn cone_approach(
        &self,
        hit: &CaloHit,
        apex: Point3<f64>,
        axis: &Unit<Vector3<f64>>,
    ) -> Result<Option<f64>> {
        let separation = hit.position() - apex;
        let max_separation = self.config.cone_approach_max_separation;
        if separation.norm_squared() > max_separation * max_separation {
            return Ok(None);
        }

        let along = axis.dot(&separation);
        if along > self.config.max_cluster_dir_projection
            || along < self.config.min_cluster_dir_projection
        {
            return Ok(None);
        }

        let (tan_cone_angle, pad_widths) = match self.geometry.granularity(hit.region()) {
            Granularity::Fine => (
                self.config.tan_cone_angle_fine,
                self.config.additional_pad_widths_fine,
            ),
            Granularity::Coarse => (
                self.config.tan_cone_angle_coarse,
                self.config.additional_pad_widths_coarse,
            ),
        };
        let cut = along.abs() * tan_cone_angle + pad_widths * hit.cell_length_scale();
        if cut < CUT_EPSILON {
            return Err(Error::Config("zero cone-approach distance cut".into()));
        }

        let perpendicular = axis.cross(&separation).norm();
        Ok(Some(perpendicular / cut))
    }

    /// Sub-metric 6: perpendicular distance to the seed track's projection,
    /// with a flexibility factor that loosens the cut as the hit moves away
    /// from the projection.
    ///
    /// Beyond `max_layers_to_track_seed`, the candidate is only accepted if
    /// some cluster hit in the trailing `max_layers_to_track_like_hit` layers
    /// itself sits within the generic-distance cut of the track.
    fn track_seed_distance(
        &self,
        cluster: &Cluster,
        hit: &CaloHit,
        search_layer: u32,
    ) -> Result<Option<f64>> {
        let Some(track_id) = cluster.seed_track() else {
            return Ok(None);
        };
        let track = self.event.track(track_id)?;

        if search_layer <= self.config.max_layers_to_track_seed {
            return self.raw_track_seed_distance(track, hit);
        }

        let lowest_layer = search_layer.saturating_sub(self.config.max_layers_to_track_like_hit);
        for (_, ids) in cluster.layers_in_range(lowest_layer, search_layer) {
            for id in ids {
                let cluster_hit = self.event.hit(*id)?;
                if let Some(d) = self.raw_track_seed_distance(track, cluster_hit)? {
                    if d < self.config.generic_distance_cut {
                        return self.raw_track_seed_distance(track, hit);
                    }
                }
            }
        }
        Ok(None)
    }

    fn raw_track_seed_distance(&self, track: &Track, hit: &CaloHit) -> Result<Option<f64>> {
        let state = track.state_at_calorimeter();
        let separation = hit.position() - state.position;
        let max_separation = self.config.max_track_seed_separation;
        let separation_sq = separation.norm_squared();
        if separation_sq >= max_separation * max_separation {
            return Ok(None);
        }

        let flexibility = 1.0
            + self.config.track_path_width * (separation_sq.sqrt() / max_separation);
        let pad_widths = match self.geometry.granularity(hit.region()) {
            Granularity::Fine => self.config.additional_pad_widths_fine,
            Granularity::Coarse => self.config.additional_pad_widths_coarse,
        };
        let cut = flexibility * pad_widths * hit.cell_length_scale();
        if cut < CUT_EPSILON {
            return Err(Error::Config("zero track-seed distance cut".into()));
        }

        let perpendicular = state.direction().cross(&separation).norm();
        Ok(Some(perpendicular / cut))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calorec_core::{CaloHit, DetectorGeometry, Event, HitId, HitRegion, TrackId, TrackState};
    use nalgebra::{Point3, Vector3};

    fn hit_at(x: f64, y: f64, z: f64, layer: u32) -> CaloHit {
        CaloHit::builder(Point3::new(x, y, z), layer, HitRegion::EcalBarrel)
            .with_hadronic_energy(1.0)
            .build()
            .unwrap()
    }

    fn track_along_z() -> calorec_core::Track {
        calorec_core::Track::new(
            TrackState::new(Point3::new(0.0, 0.0, 100.0), Vector3::new(0.0, 0.0, 10.0)),
            true,
            true,
        )
        .unwrap()
    }

    /// Event with a two-hit cluster in layer 1 and one free candidate hit.
    fn event_with_cluster(candidate: CaloHit) -> (Event, calorec_core::ClusterId, HitId) {
        let hits = vec![hit_at(0.0, 0.0, 100.0, 1), hit_at(1.0, 0.0, 100.0, 1), candidate];
        let mut event = Event::without_tracks(hits);
        let cluster = event.create_cluster_from_hit(HitId(0)).unwrap();
        event.add_hit_to_cluster(cluster, HitId(1)).unwrap();
        (event, cluster, HitId(2))
    }

    #[test]
    fn test_distance_cut_boundary_is_strict() {
        let config = ConeClusteringConfig::default();
        let geometry = DetectorGeometry::new();

        // Same-layer separation exactly at pad_widths * cell scale gives a
        // normalized distance of exactly the generic cut.
        let exact = config.generic_distance_cut * config.same_layer_pad_widths_fine;
        let (event, cluster_id, hit_id) = event_with_cluster(hit_at(-exact, 0.0, 100.0, 1));
        let calc = GenericDistance::new(&config, &geometry, &event);
        let cluster = event.cluster(cluster_id).unwrap();
        let hit = event.hit(hit_id).unwrap();

        let result = calc
            .generic_distance(cluster, hit, 1, config.generic_distance_cut)
            .unwrap();
        assert_eq!(result, None);

        // Just below the cut must associate.
        let (event, cluster_id, hit_id) =
            event_with_cluster(hit_at(-(exact - 1.0e-6), 0.0, 100.0, 1));
        let calc = GenericDistance::new(&config, &geometry, &event);
        let cluster = event.cluster(cluster_id).unwrap();
        let hit = event.hit(hit_id).unwrap();

        let result = calc
            .generic_distance(cluster, hit, 1, config.generic_distance_cut)
            .unwrap();
        assert!(result.unwrap() < config.generic_distance_cut);
    }

    #[test]
    fn test_unoccupied_search_layer_is_no_association() {
        let config = ConeClusteringConfig::default();
        let geometry = DetectorGeometry::new();
        let (event, cluster_id, hit_id) = event_with_cluster(hit_at(0.5, 0.0, 110.0, 2));
        let calc = GenericDistance::new(&config, &geometry, &event);
        let cluster = event.cluster(cluster_id).unwrap();
        let hit = event.hit(hit_id).unwrap();

        // Cluster occupies layer 1 only.
        let result = calc.generic_distance(cluster, hit, 7, f64::INFINITY).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_zero_pad_width_is_fatal() {
        let config = ConeClusteringConfig::default().with_same_layer_pad_widths(0.0, 0.0);
        let geometry = DetectorGeometry::new();
        let (event, cluster_id, hit_id) = event_with_cluster(hit_at(0.5, 0.0, 100.0, 1));
        let calc = GenericDistance::new(&config, &geometry, &event);
        let cluster = event.cluster(cluster_id).unwrap();
        let hit = event.hit(hit_id).unwrap();

        assert!(calc.generic_distance(cluster, hit, 1, f64::INFINITY).is_err());
    }

    #[test]
    fn test_track_direction_veto() {
        let config = ConeClusteringConfig::default().with_min_hit_track_cos_angle(0.9);
        // Interaction point at pseudolayer 2 so that search layer 1 takes the
        // track-projection branch.
        let geometry = DetectorGeometry::new().with_ip_pseudo_layer(2);

        // Hit right on the track axis but with an orthogonal expected direction.
        let vetoed = CaloHit::builder(Point3::new(0.0, 0.0, 105.0), 1, HitRegion::EcalBarrel)
            .with_expected_direction(Vector3::x_axis())
            .with_hadronic_energy(1.0)
            .build()
            .unwrap();
        let mut event = Event::new(vec![vetoed], vec![track_along_z()]);
        let cluster_id = event.create_cluster_from_track(TrackId(0)).unwrap();

        let calc = GenericDistance::new(&config, &geometry, &event);
        let cluster = event.cluster(cluster_id).unwrap();
        let hit = event.hit(HitId(0)).unwrap();
        let result = calc.generic_distance(cluster, hit, 1, f64::INFINITY).unwrap();
        assert_eq!(result, None);

        // The same geometry without the veto associates through the track cone.
        let permissive = config.with_min_hit_track_cos_angle(-1.0);
        let calc = GenericDistance::new(&permissive, &geometry, &event);
        let result = calc.generic_distance(cluster, hit, 1, f64::INFINITY).unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn test_track_seed_distance_direct_at_threshold_layer() {
        let config = ConeClusteringConfig::default();
        let geometry = DetectorGeometry::new();

        // The cluster's hits in the threshold layer sit beyond the track-seed
        // separation limit, so layer-neighbor confirmation could never pass;
        // at the threshold layer itself the direct distance must apply.
        let far = CaloHit::builder(Point3::new(300.0, 0.0, 130.0), 3, HitRegion::EcalBarrel)
            .with_hadronic_energy(1.0)
            .build()
            .unwrap();
        let candidate = hit_at(0.0, 0.0, 130.0, 3);
        let mut event = Event::new(vec![far, candidate], vec![track_along_z()]);
        let cluster_id = event.create_cluster_from_track(TrackId(0)).unwrap();
        event.add_hit_to_cluster(cluster_id, HitId(0)).unwrap();

        let calc = GenericDistance::new(&config, &geometry, &event);
        let cluster = event.cluster(cluster_id).unwrap();
        let hit = event.hit(HitId(1)).unwrap();

        assert_eq!(config.max_layers_to_track_seed, 3);
        let result = calc
            .generic_distance(cluster, hit, 3, config.generic_distance_cut)
            .unwrap();
        // On-axis candidate: perpendicular component is zero.
        assert!(result.is_some());
        assert!(result.unwrap() < config.generic_distance_cut);
    }

    #[test]
    fn test_projection_window_endpoint_admitted() {
        let config = ConeClusteringConfig::default();
        let geometry = DetectorGeometry::new();

        // Candidate exactly at the upper edge of the along-axis window; the
        // window is inclusive, so the cone approach still applies.
        let along = config.max_cluster_dir_projection;
        let (event, cluster_id, hit_id) = event_with_cluster(
            CaloHit::builder(
                Point3::new(0.0, 0.0, 100.0 + along),
                2,
                HitRegion::EcalBarrel,
            )
            .with_hadronic_energy(1.0)
            .build()
            .unwrap(),
        );
        let calc = GenericDistance::new(&config, &geometry, &event);
        let cluster = event.cluster(cluster_id).unwrap();
        let hit = event.hit(hit_id).unwrap();

        let result = calc.generic_distance(cluster, hit, 1, f64::INFINITY).unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn test_projection_window_gates_cone_approach() {
        let config = ConeClusteringConfig::default();
        let geometry = DetectorGeometry::new();

        // Candidate far beyond the along-axis window of the cluster direction
        // (initial direction ~ +z). Placed in layer 2 so the same-layer
        // metric stays off for a search at layer 1.
        let along = config.max_cluster_dir_projection + 50.0;
        let (event, cluster_id, hit_id) = event_with_cluster(
            CaloHit::builder(
                Point3::new(0.0, 0.0, 100.0 + along),
                2,
                HitRegion::EcalBarrel,
            )
            .with_hadronic_energy(1.0)
            .build()
            .unwrap(),
        );
        let calc = GenericDistance::new(&config, &geometry, &event);
        let cluster = event.cluster(cluster_id).unwrap();
        let hit = event.hit(hit_id).unwrap();

        let result = calc.generic_distance(cluster, hit, 1, f64::INFINITY).unwrap();
        assert_eq!(result, None);
    }
}
