//! Cluster type: an ordered-by-pseudolayer collection of hits.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use nalgebra::{Point3, Unit, Vector3};

use crate::fit::ClusterFitResult;
use crate::hit::{CaloHit, HitId};
use crate::track::TrackId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a live cluster within an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterId(pub usize);

/// A mutable collection of hits, ordered by pseudolayer, optionally anchored
/// to one seed track.
///
/// A cluster is empty only transiently: track-seeded clusters are created
/// empty before layer processing and must either receive hits or be deleted
/// in the cleanup phase. Mutation goes through the [`Event`](crate::Event)
/// object model, which enforces single ownership of every hit.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cluster {
    layers: BTreeMap<u32, Vec<HitId>>,
    electromagnetic_energy: f64,
    hadronic_energy: f64,
    hit_count: usize,
    mip_hit_count: usize,
    seed_track: Option<TrackId>,
    initial_direction: Option<Unit<Vector3<f64>>>,
    current_fit: ClusterFitResult,
}

impl Cluster {
    /// Creates an empty, unseeded cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty cluster seeded by a track with the given direction.
    #[must_use]
    pub fn with_track_seed(track: TrackId, direction: Unit<Vector3<f64>>) -> Self {
        Self {
            seed_track: Some(track),
            initial_direction: Some(direction),
            ..Self::default()
        }
    }

    /// Adds a hit to the layer map and updates the running sums.
    ///
    /// The first hit of an unseeded cluster fixes its initial direction: the
    /// radial unit vector of the hit position, falling back to the hit's
    /// expected direction for a degenerate position.
    pub(crate) fn add_hit(&mut self, id: HitId, hit: &CaloHit) {
        self.layers.entry(hit.pseudo_layer()).or_default().push(id);
        self.electromagnetic_energy += hit.electromagnetic_energy();
        self.hadronic_energy += hit.hadronic_energy();
        self.hit_count += 1;
        if hit.is_possible_mip() {
            self.mip_hit_count += 1;
        }
        if self.initial_direction.is_none() {
            self.initial_direction = Some(
                Unit::try_new(hit.position().coords, 1.0e-12)
                    .unwrap_or_else(|| hit.expected_direction()),
            );
        }
    }

    /// Number of hits in the cluster.
    #[inline]
    pub fn hit_count(&self) -> usize {
        self.hit_count
    }

    /// True if the cluster holds no hits.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hit_count == 0
    }

    /// Running electromagnetic energy sum (GeV).
    #[inline]
    pub fn electromagnetic_energy(&self) -> f64 {
        self.electromagnetic_energy
    }

    /// Running hadronic energy sum (GeV).
    #[inline]
    pub fn hadronic_energy(&self) -> f64 {
        self.hadronic_energy
    }

    /// Fraction of hits flagged as possible mips.
    #[inline]
    pub fn mip_fraction(&self) -> f64 {
        if self.hit_count == 0 {
            0.0
        } else {
            self.mip_hit_count as f64 / self.hit_count as f64
        }
    }

    /// Seed track, if the cluster is track-seeded.
    #[inline]
    pub fn seed_track(&self) -> Option<TrackId> {
        self.seed_track
    }

    /// Whether the cluster was seeded from a track.
    #[inline]
    pub fn is_track_seeded(&self) -> bool {
        self.seed_track.is_some()
    }

    /// Initial direction: seed-track momentum for track-seeded clusters,
    /// first-hit radial direction otherwise. `None` only while an unseeded
    /// cluster is still empty.
    #[inline]
    pub fn initial_direction(&self) -> Option<Unit<Vector3<f64>>> {
        self.initial_direction
    }

    /// Cached fit result, recomputed once per processed pseudolayer.
    #[inline]
    pub fn current_fit(&self) -> &ClusterFitResult {
        &self.current_fit
    }

    /// Replaces the cached fit result.
    pub fn set_current_fit(&mut self, fit: ClusterFitResult) {
        self.current_fit = fit;
    }

    /// Innermost occupied pseudolayer.
    #[inline]
    pub fn inner_pseudo_layer(&self) -> Option<u32> {
        self.layers.keys().next().copied()
    }

    /// Outermost occupied pseudolayer.
    #[inline]
    pub fn outer_pseudo_layer(&self) -> Option<u32> {
        self.layers.keys().next_back().copied()
    }

    /// Hits in the given pseudolayer, or `None` if the layer is unoccupied.
    #[inline]
    pub fn hits_in_layer(&self, layer: u32) -> Option<&[HitId]> {
        self.layers.get(&layer).map(Vec::as_slice)
    }

    /// Iterator over `(pseudolayer, hits)` in ascending layer order.
    pub fn layers(&self) -> impl Iterator<Item = (u32, &[HitId])> {
        self.layers.iter().map(|(layer, ids)| (*layer, ids.as_slice()))
    }

    /// Iterator over occupied layers within `[inner, outer]`, ascending.
    pub fn layers_in_range(&self, inner: u32, outer: u32) -> impl Iterator<Item = (u32, &[HitId])> {
        let range: RangeInclusive<u32> = inner..=outer;
        self.layers
            .range(range)
            .map(|(layer, ids)| (*layer, ids.as_slice()))
    }

    /// All hit ids in the cluster, in ascending layer order.
    pub fn hit_ids(&self) -> impl Iterator<Item = HitId> + '_ {
        self.layers.values().flatten().copied()
    }

    /// Energy-weighted centroid of the hits in one pseudolayer.
    ///
    /// Falls back to the unweighted mean when the layer's energy sum is ~0.
    /// `None` if the layer is unoccupied.
    #[must_use]
    pub fn layer_centroid(&self, layer: u32, hits: &[CaloHit]) -> Option<Point3<f64>> {
        let ids = self.layers.get(&layer)?;
        let mut weighted = Vector3::zeros();
        let mut unweighted = Vector3::zeros();
        let mut weight_sum = 0.0;
        for id in ids {
            let hit = hits.get(id.0)?;
            let weight = hit.input_energy();
            weighted += hit.position().coords * weight;
            unweighted += hit.position().coords;
            weight_sum += weight;
        }
        if weight_sum > f64::EPSILON {
            Some(Point3::from(weighted / weight_sum))
        } else {
            Some(Point3::from(unweighted / ids.len() as f64))
        }
    }
}
