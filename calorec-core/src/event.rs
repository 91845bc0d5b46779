//! The event object model: hit and track lists plus cluster lifecycle.
//!
//! This is the in-process boundary the clustering engine is driven through.
//! Hits and tracks are created upstream and are read-only here apart from
//! hit availability, which flips exactly once when a hit is consumed by a
//! cluster. Every mutation returns a [`Result`]; a failure is fatal to the
//! clustering pass that triggered it.

use crate::cluster::{Cluster, ClusterId};
use crate::error::{Error, Result};
use crate::hit::{CaloHit, HitId};
use crate::track::{Track, TrackId};

/// One processing unit: the current hit list, optional track list, and the
/// clusters formed from them.
///
/// Cluster slots are never reused within an event, so a [`ClusterId`] stays
/// valid-or-dead for the whole event and deletion cannot alias.
#[derive(Debug, Clone, Default)]
pub struct Event {
    hits: Vec<CaloHit>,
    tracks: Option<Vec<Track>>,
    clusters: Vec<Option<Cluster>>,
}

impl Event {
    /// Creates an event with a hit list and a (possibly empty) track list.
    #[must_use]
    pub fn new(hits: Vec<CaloHit>, tracks: Vec<Track>) -> Self {
        Self {
            hits,
            tracks: Some(tracks),
            clusters: Vec::new(),
        }
    }

    /// Creates an event with no track list at all.
    ///
    /// Distinct from an empty track list: track seeding over an absent list
    /// is a configuration error, while an empty list simply seeds nothing.
    #[must_use]
    pub fn without_tracks(hits: Vec<CaloHit>) -> Self {
        Self {
            hits,
            tracks: None,
            clusters: Vec::new(),
        }
    }

    /// Current hit list.
    #[inline]
    pub fn hits(&self) -> &[CaloHit] {
        &self.hits
    }

    /// Current track list (empty slice when no list is present).
    #[inline]
    pub fn tracks(&self) -> &[Track] {
        self.tracks.as_deref().unwrap_or(&[])
    }

    /// Whether a track list is present for this event.
    #[inline]
    pub fn has_track_list(&self) -> bool {
        self.tracks.is_some()
    }

    /// Looks up a hit by id.
    ///
    /// # Errors
    /// [`Error::UnknownHit`] for an out-of-range id.
    pub fn hit(&self, id: HitId) -> Result<&CaloHit> {
        self.hits.get(id.0).ok_or(Error::UnknownHit(id.0))
    }

    /// Looks up a track by id.
    ///
    /// # Errors
    /// [`Error::UnknownTrack`] for an out-of-range id.
    pub fn track(&self, id: TrackId) -> Result<&Track> {
        self.tracks
            .as_deref()
            .and_then(|tracks| tracks.get(id.0))
            .ok_or(Error::UnknownTrack(id.0))
    }

    /// Ids of all hits in the event.
    pub fn hit_ids(&self) -> impl Iterator<Item = HitId> + '_ {
        (0..self.hits.len()).map(HitId)
    }

    /// Ids of all tracks in the event.
    pub fn track_ids(&self) -> impl Iterator<Item = TrackId> + '_ {
        (0..self.tracks().len()).map(TrackId)
    }

    /// Ids of all live clusters, in creation order.
    pub fn cluster_ids(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.clusters
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| ClusterId(i)))
    }

    /// Number of live clusters.
    #[must_use]
    pub fn live_cluster_count(&self) -> usize {
        self.clusters.iter().filter(|slot| slot.is_some()).count()
    }

    /// Looks up a live cluster by id.
    ///
    /// # Errors
    /// [`Error::UnknownCluster`] for a dead or out-of-range id.
    pub fn cluster(&self, id: ClusterId) -> Result<&Cluster> {
        self.clusters
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(Error::UnknownCluster(id.0))
    }

    /// Looks up a live cluster by id, mutably.
    ///
    /// # Errors
    /// [`Error::UnknownCluster`] for a dead or out-of-range id.
    pub fn cluster_mut(&mut self, id: ClusterId) -> Result<&mut Cluster> {
        self.clusters
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(Error::UnknownCluster(id.0))
    }

    /// Creates an empty cluster seeded by a track.
    ///
    /// # Errors
    /// [`Error::UnknownTrack`] if the track id is not in the event.
    pub fn create_cluster_from_track(&mut self, id: TrackId) -> Result<ClusterId> {
        let direction = self.track(id)?.state_at_calorimeter().direction();
        let cluster_id = ClusterId(self.clusters.len());
        self.clusters.push(Some(Cluster::with_track_seed(id, direction)));
        Ok(cluster_id)
    }

    /// Creates a single-hit cluster from an available hit, consuming it.
    ///
    /// # Errors
    /// [`Error::UnknownHit`] or [`Error::HitUnavailable`].
    pub fn create_cluster_from_hit(&mut self, id: HitId) -> Result<ClusterId> {
        let cluster_id = ClusterId(self.clusters.len());
        self.clusters.push(Some(Cluster::new()));
        if let Err(error) = self.add_hit_to_cluster(cluster_id, id) {
            self.clusters.pop();
            return Err(error);
        }
        Ok(cluster_id)
    }

    /// Attaches an available hit to a live cluster, consuming the hit.
    ///
    /// # Errors
    /// [`Error::UnknownCluster`], [`Error::UnknownHit`], or
    /// [`Error::HitUnavailable`] if the hit already belongs to a cluster.
    pub fn add_hit_to_cluster(&mut self, cluster_id: ClusterId, hit_id: HitId) -> Result<()> {
        let hit = *self.hit(hit_id)?;
        if !hit.is_available() {
            return Err(Error::HitUnavailable(hit_id.0));
        }
        let cluster = self.cluster_mut(cluster_id)?;
        cluster.add_hit(hit_id, &hit);
        self.hits[hit_id.0].available = false;
        Ok(())
    }

    /// Deletes a live, empty cluster.
    ///
    /// # Errors
    /// [`Error::UnknownCluster`], or [`Error::ClusterNotEmpty`] if the
    /// cluster still holds hits — the clustering core only ever deletes
    /// empty clusters.
    pub fn delete_cluster(&mut self, id: ClusterId) -> Result<()> {
        let cluster = self.cluster(id)?;
        if !cluster.is_empty() {
            return Err(Error::ClusterNotEmpty {
                cluster: id.0,
                hits: cluster.hit_count(),
            });
        }
        self.clusters[id.0] = None;
        Ok(())
    }
}
