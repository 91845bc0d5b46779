//! Cone clustering engine.
//!
//! Seeds clusters from tracks, then walks pseudolayers in ascending order:
//! a lookback pass first tries to attach each layer's hits to clusters via
//! earlier layers, then a same-layer fixed-point pass attaches hits to
//! clusters occupying the layer itself, seeding brand-new clusters from the
//! highest-priority leftovers. Clusters still empty after the last layer are
//! deleted.

use std::collections::{BTreeSet, HashMap};

use calorec_core::{
    approximate_direction, fit_layer_centroids, CaloHit, Cluster, ClusterFitResult, ClusterId,
    DetectorGeometry, Error, Event, Granularity, HitId, PseudoLayerPlugin, Result, TrackId,
};
use log::{debug, trace};
use nalgebra::Point3;

use crate::distance::GenericDistance;
use crate::spatial::KdTree;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which tracks seed an empty cluster before layer processing begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SeedStrategy {
    /// No track seeding.
    None,
    /// Only tracks whose calorimeter projection lands in the endcap.
    EndcapOnly,
    /// Every track capable of forming a particle-flow object.
    #[default]
    All,
}

/// Tuning parameters of the cone clustering engine.
///
/// One configured instance serves one pass; there is no ambient state. Every
/// parameter has a usable default, and the engine functions with defaults
/// alone.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConeClusteringConfig {
    /// Track seeding strategy. Default: [`SeedStrategy::All`].
    pub seed_strategy: SeedStrategy,
    /// Consider only electromagnetic-calorimeter hits. Default: false.
    pub should_use_only_ecal_hits: bool,
    /// Consider hits flagged as isolated. Default: false.
    pub should_use_isolated_hits: bool,
    /// Lookback depth for fine-granularity hits. Default: 3.
    pub layers_to_step_back_fine: u32,
    /// Lookback depth for coarse-granularity hits. Default: 3.
    pub layers_to_step_back_coarse: u32,
    /// Attach a hit at the first lookback layer that yields a cluster,
    /// instead of scanning all lookback layers. Default: true.
    pub attach_in_first_lookback_layer: bool,
    /// Global association cut: only generic distances strictly below this
    /// associate. Default: 1.0.
    pub generic_distance_cut: f64,
    /// Minimum cosine between a hit's expected direction and the seed track
    /// direction; below it the track-projection metric vetoes association
    /// outright. Default: 0.0.
    pub min_hit_track_cos_angle: f64,
    /// Same-layer pad-width multiplier, fine granularity. Default: 2.8.
    pub same_layer_pad_widths_fine: f64,
    /// Same-layer pad-width multiplier, coarse granularity. Default: 1.8.
    pub same_layer_pad_widths_coarse: f64,
    /// Hard cap on hit-to-cone-apex separation (mm). Default: 1000.
    pub cone_approach_max_separation: f64,
    /// Cone half-angle tangent, fine granularity. Default: 0.3.
    pub tan_cone_angle_fine: f64,
    /// Cone half-angle tangent, coarse granularity. Default: 0.5.
    pub tan_cone_angle_coarse: f64,
    /// Additional pad-width term of the cone cut, fine granularity.
    /// Default: 2.5.
    pub additional_pad_widths_fine: f64,
    /// Additional pad-width term of the cone cut, coarse granularity.
    /// Default: 2.5.
    pub additional_pad_widths_coarse: f64,
    /// Upper bound of the along-axis projection window (mm). Default: 200.
    pub max_cluster_dir_projection: f64,
    /// Lower bound of the along-axis projection window (mm). Default: -10.
    pub min_cluster_dir_projection: f64,
    /// Track path width entering the track-seed flexibility factor (mm).
    /// Default: 2.
    pub track_path_width: f64,
    /// Hard maximum hit-to-track-projection separation (mm). Default: 250.
    pub max_track_seed_separation: f64,
    /// Below this search layer the track-seed metric applies directly;
    /// beyond it a nearby cluster hit must confirm track proximity first.
    /// Default: 3.
    pub max_layers_to_track_seed: u32,
    /// How many trailing layers are examined for that confirmation.
    /// Default: 3.
    pub max_layers_to_track_like_hit: u32,
    /// Keep track-seeded clusters on their initial direction, discounting
    /// the initial-direction metric and disabling the track-seed metric.
    /// Default: false.
    pub should_follow_initial_direction: bool,
    /// Layer beyond which the follow-initial-direction discount applies.
    /// Default: 0.
    pub track_seed_cutoff_layer: u32,
    /// Minimum spanned layers for a full layer-centroid fit. Default: 6.
    pub n_layers_spanned_for_fit: u32,
    /// Minimum spanned layers for the cheap two-point direction. Default: 2.
    pub n_layers_spanned_for_approx_fit: u32,
    /// Trailing layers entering a full fit. Default: 8.
    pub n_layers_to_fit: u32,
    /// Mip fraction above which the fit depth is multiplied. Default: 0.5.
    pub mip_fraction_for_deep_fit: f64,
    /// Fit-depth multiplier for very mip-like clusters. Default: 2.
    pub deep_fit_multiplier: u32,
    /// First fit-rejection cut pair: a successful fit with direction cosine
    /// to the initial direction below this... Default: 0.75.
    pub fit_success_dot_product_cut1: f64,
    /// ...and chi2 above this is downgraded to unsuccessful. Default: 5.0.
    pub fit_success_chi2_cut1: f64,
    /// Second, independent fit-rejection cut pair. Default: 0.50.
    pub fit_success_dot_product_cut2: f64,
    /// Chi2 member of the second rejection pair. Default: 2.5.
    pub fit_success_chi2_cut2: f64,
    /// Fit chi2 below which a cluster is treated as a straight mip track and
    /// its fit-direction distances are discounted. Default: 2.5.
    pub mip_track_chi2_cut: f64,
    /// Restrict candidate clusters through the spatial index instead of
    /// scanning all live clusters. Default: true.
    pub use_spatial_index: bool,
}

impl Default for ConeClusteringConfig {
    fn default() -> Self {
        Self {
            seed_strategy: SeedStrategy::All,
            should_use_only_ecal_hits: false,
            should_use_isolated_hits: false,
            layers_to_step_back_fine: 3,
            layers_to_step_back_coarse: 3,
            attach_in_first_lookback_layer: true,
            generic_distance_cut: 1.0,
            min_hit_track_cos_angle: 0.0,
            same_layer_pad_widths_fine: 2.8,
            same_layer_pad_widths_coarse: 1.8,
            cone_approach_max_separation: 1000.0,
            tan_cone_angle_fine: 0.3,
            tan_cone_angle_coarse: 0.5,
            additional_pad_widths_fine: 2.5,
            additional_pad_widths_coarse: 2.5,
            max_cluster_dir_projection: 200.0,
            min_cluster_dir_projection: -10.0,
            track_path_width: 2.0,
            max_track_seed_separation: 250.0,
            max_layers_to_track_seed: 3,
            max_layers_to_track_like_hit: 3,
            should_follow_initial_direction: false,
            track_seed_cutoff_layer: 0,
            n_layers_spanned_for_fit: 6,
            n_layers_spanned_for_approx_fit: 2,
            n_layers_to_fit: 8,
            mip_fraction_for_deep_fit: 0.5,
            deep_fit_multiplier: 2,
            fit_success_dot_product_cut1: 0.75,
            fit_success_chi2_cut1: 5.0,
            fit_success_dot_product_cut2: 0.50,
            fit_success_chi2_cut2: 2.5,
            mip_track_chi2_cut: 2.5,
            use_spatial_index: true,
        }
    }
}

impl ConeClusteringConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the track seeding strategy.
    #[must_use]
    pub fn with_seed_strategy(mut self, strategy: SeedStrategy) -> Self {
        self.seed_strategy = strategy;
        self
    }

    /// Sets the global generic-distance cut.
    #[must_use]
    pub fn with_generic_distance_cut(mut self, cut: f64) -> Self {
        self.generic_distance_cut = cut;
        self
    }

    /// Sets the same-layer pad-width multipliers.
    #[must_use]
    pub fn with_same_layer_pad_widths(mut self, fine: f64, coarse: f64) -> Self {
        self.same_layer_pad_widths_fine = fine;
        self.same_layer_pad_widths_coarse = coarse;
        self
    }

    /// Sets the minimum hit-to-track direction cosine.
    #[must_use]
    pub fn with_min_hit_track_cos_angle(mut self, cos_angle: f64) -> Self {
        self.min_hit_track_cos_angle = cos_angle;
        self
    }

    /// Selects between index-restricted and all-live-clusters candidate supply.
    #[must_use]
    pub fn with_spatial_index(mut self, use_index: bool) -> Self {
        self.use_spatial_index = use_index;
        self
    }

    /// Selects the lookback attachment policy.
    #[must_use]
    pub fn with_attach_in_first_lookback_layer(mut self, first_wins: bool) -> Self {
        self.attach_in_first_lookback_layer = first_wins;
        self
    }
}

/// Counters reported by one clustering pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusteringStats {
    /// Clusters seeded from tracks before layer processing.
    pub track_seeded_clusters: usize,
    /// Clusters seeded from unattached hits in the same-layer phase.
    pub hit_seeded_clusters: usize,
    /// Hits attached during lookback passes.
    pub hits_attached_lookback: usize,
    /// Hits attached during same-layer fixed-point passes.
    pub hits_attached_same_layer: usize,
    /// Empty clusters deleted in cleanup.
    pub empty_clusters_removed: usize,
}

/// Pass-scoped state: spatial indices built once from the input lists, plus
/// the incrementally-mutated ownership maps. Owned exclusively by the engine
/// for one pass and discarded on every exit path.
#[derive(Default)]
struct PassState {
    track_index: Option<KdTree<3>>,
    hit_index: Option<KdTree<4>>,
    hit_to_cluster: HashMap<HitId, ClusterId>,
    track_to_cluster: HashMap<TrackId, ClusterId>,
}

/// Cone clustering engine over a geometry oracle.
pub struct ConeClustering<G = DetectorGeometry> {
    config: ConeClusteringConfig,
    geometry: G,
}

impl ConeClustering<DetectorGeometry> {
    /// Creates an engine with the default detector geometry.
    #[must_use]
    pub fn new(config: ConeClusteringConfig) -> Self {
        Self {
            config,
            geometry: DetectorGeometry::new(),
        }
    }
}

impl Default for ConeClustering<DetectorGeometry> {
    fn default() -> Self {
        Self::new(ConeClusteringConfig::default())
    }
}

impl<G: PseudoLayerPlugin> ConeClustering<G> {
    /// Creates an engine over a custom geometry oracle.
    pub fn with_geometry(config: ConeClusteringConfig, geometry: G) -> Self {
        Self { config, geometry }
    }

    /// Current configuration.
    pub fn config(&self) -> &ConeClusteringConfig {
        &self.config
    }

    /// Runs one full clustering pass over the event.
    ///
    /// Pseudolayers are visited in strictly ascending order; within the
    /// same-layer fixed point, attachments are applied one at a time with
    /// re-evaluation between them. The pass either completes or fails
    /// fatally; there is no partial-success mode.
    ///
    /// # Errors
    /// Configuration errors and object-model mutation failures abort the
    /// pass immediately.
    pub fn run(&self, event: &mut Event) -> Result<ClusteringStats> {
        let mut stats = ClusteringStats::default();
        let mut state = self.build_pass_state(event);

        self.seed_track_clusters(event, &mut state, &mut stats)?;
        debug!(
            "seeded {} track clusters over {} hits",
            stats.track_seeded_clusters,
            event.hits().len()
        );

        let layers: BTreeSet<u32> = event.hits().iter().map(CaloHit::pseudo_layer).collect();
        for layer in layers {
            self.refresh_cluster_fits(event)?;
            let mut layer_hits = self.relevant_hits(event, layer);
            trace!("layer {layer}: {} candidate hits", layer_hits.len());
            self.lookback_pass(event, &mut state, layer, &mut layer_hits, &mut stats)?;
            self.same_layer_pass(event, &mut state, layer, &mut layer_hits, &mut stats)?;
        }

        stats.empty_clusters_removed = self.remove_empty_clusters(event)?;
        debug!(
            "pass complete: {} clusters live, {} empty removed, {}+{} hits attached",
            event.live_cluster_count(),
            stats.empty_clusters_removed,
            stats.hits_attached_lookback,
            stats.hits_attached_same_layer
        );
        Ok(stats)
    }

    /// Builds the pass-scoped indices from the then-current input lists.
    ///
    /// An empty input leaves the corresponding index absent; searching an
    /// absent index is a no-op.
    fn build_pass_state(&self, event: &Event) -> PassState {
        let mut state = PassState::default();
        if !self.config.use_spatial_index {
            return state;
        }

        let hit_entries: Vec<([f64; 4], usize)> = event
            .hits()
            .iter()
            .enumerate()
            .map(|(i, hit)| {
                let p = hit.position();
                ([p.x, p.y, p.z, f64::from(hit.pseudo_layer())], i)
            })
            .collect();
        if !hit_entries.is_empty() {
            state.hit_index = Some(KdTree::build(hit_entries));
        }

        let track_entries: Vec<([f64; 3], usize)> = event
            .tracks()
            .iter()
            .enumerate()
            .map(|(i, track)| {
                let p = track.state_at_calorimeter().position;
                ([p.x, p.y, p.z], i)
            })
            .collect();
        if !track_entries.is_empty() {
            state.track_index = Some(KdTree::build(track_entries));
        }
        state
    }

    /// Creates one empty cluster per qualifying track.
    fn seed_track_clusters(
        &self,
        event: &mut Event,
        state: &mut PassState,
        stats: &mut ClusteringStats,
    ) -> Result<()> {
        if self.config.seed_strategy == SeedStrategy::None {
            return Ok(());
        }
        if !event.has_track_list() {
            return Err(Error::MissingTrackList);
        }

        let track_ids: Vec<TrackId> = event.track_ids().collect();
        for track_id in track_ids {
            let track = event.track(track_id)?;
            let qualifies = track.can_form_pfo()
                && match self.config.seed_strategy {
                    SeedStrategy::None => false,
                    SeedStrategy::EndcapOnly => track.reaches_endcap(),
                    SeedStrategy::All => true,
                };
            if qualifies {
                let cluster_id = event.create_cluster_from_track(track_id)?;
                state.track_to_cluster.insert(track_id, cluster_id);
                stats.track_seeded_clusters += 1;
            }
        }
        Ok(())
    }

    /// Recomputes the cached fit of every live cluster with more than one hit.
    fn refresh_cluster_fits(&self, event: &mut Event) -> Result<()> {
        let cluster_ids: Vec<ClusterId> = event.cluster_ids().collect();
        for cluster_id in cluster_ids {
            let fit = {
                let cluster = event.cluster(cluster_id)?;
                if cluster.hit_count() > 1 {
                    self.compute_fit(event, cluster)?
                } else {
                    ClusterFitResult::unsuccessful()
                }
            };
            event.cluster_mut(cluster_id)?.set_current_fit(fit);
        }
        Ok(())
    }

    /// Chooses the fit flavor by spanned layers: a full fit over the trailing
    /// layers, a two-point direction, or none. A full fit that disagrees too
    /// strongly with the cluster's initial direction is downgraded to
    /// unsuccessful so that a noisy late-layer fit cannot override a good
    /// early-shower estimate.
    fn compute_fit(&self, event: &Event, cluster: &Cluster) -> Result<ClusterFitResult> {
        let (Some(inner), Some(outer)) =
            (cluster.inner_pseudo_layer(), cluster.outer_pseudo_layer())
        else {
            return Ok(ClusterFitResult::unsuccessful());
        };
        let span = outer - inner;

        if span > self.config.n_layers_spanned_for_fit {
            let mut depth = self.config.n_layers_to_fit;
            if cluster.mip_fraction() > self.config.mip_fraction_for_deep_fit {
                depth = depth.saturating_mul(self.config.deep_fit_multiplier);
            }
            let fit_inner = outer.saturating_sub(depth.saturating_sub(1)).max(inner);
            let mut fit = fit_layer_centroids(cluster, event.hits(), fit_inner, outer)?;
            if fit.successful {
                if let Some(initial) = cluster.initial_direction() {
                    let dot = fit.direction.dot(&initial);
                    if (dot < self.config.fit_success_dot_product_cut1
                        && fit.chi2 > self.config.fit_success_chi2_cut1)
                        || (dot < self.config.fit_success_dot_product_cut2
                            && fit.chi2 > self.config.fit_success_chi2_cut2)
                    {
                        fit.successful = false;
                    }
                }
            }
            return Ok(fit);
        }

        if span > self.config.n_layers_spanned_for_approx_fit {
            if let Some(direction) = approximate_direction(cluster, event.hits(), inner, outer) {
                let intercept = cluster
                    .layer_centroid(inner, event.hits())
                    .unwrap_or_else(Point3::origin);
                // No residuals are measured, so the chi2 stays infinite and
                // the mip-track discount never fires on a two-point fit.
                return Ok(ClusterFitResult {
                    direction,
                    intercept,
                    chi2: f64::INFINITY,
                    rms: f64::INFINITY,
                    radial_direction_cosine: nalgebra::Unit::try_new(intercept.coords, 1.0e-12)
                        .map_or(0.0, |radial| direction.dot(&radial)),
                    successful: true,
                });
            }
        }

        Ok(ClusterFitResult::unsuccessful())
    }

    /// Available hits in the layer passing the isolation/only-ECAL filters,
    /// ordered by decreasing input energy with the hit id as the stable
    /// secondary key.
    fn relevant_hits(&self, event: &Event, layer: u32) -> Vec<HitId> {
        let mut hits: Vec<(HitId, f64)> = event
            .hits()
            .iter()
            .enumerate()
            .filter(|(_, hit)| {
                hit.pseudo_layer() == layer
                    && hit.is_available()
                    && (self.config.should_use_isolated_hits || !hit.is_isolated())
                    && (!self.config.should_use_only_ecal_hits || hit.region().is_ecal())
            })
            .map(|(i, hit)| (HitId(i), hit.input_energy()))
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hits.into_iter().map(|(id, _)| id).collect()
    }

    /// Lookback pass: tries to attach each hit to a cluster through the
    /// step-back layers below its own. Unattached hits stay in `layer_hits`
    /// for the same-layer pass.
    fn lookback_pass(
        &self,
        event: &mut Event,
        state: &mut PassState,
        layer: u32,
        layer_hits: &mut Vec<HitId>,
        stats: &mut ClusteringStats,
    ) -> Result<()> {
        let mut remaining = Vec::with_capacity(layer_hits.len());
        for &hit_id in layer_hits.iter() {
            let hit = *event.hit(hit_id)?;
            let step_back = match self.geometry.granularity(hit.region()) {
                Granularity::Fine => self.config.layers_to_step_back_fine,
                Granularity::Coarse => self.config.layers_to_step_back_coarse,
            };

            let mut scanned_best: Option<(f64, ClusterId)> = None;
            let mut attached = false;
            for step in 1..=step_back {
                let Some(search_layer) = layer.checked_sub(step) else {
                    break;
                };
                let Some((cluster_id, distance)) =
                    self.best_cluster_for_hit(event, state, &hit, search_layer)?
                else {
                    continue;
                };

                if self.config.attach_in_first_lookback_layer {
                    event.add_hit_to_cluster(cluster_id, hit_id)?;
                    state.hit_to_cluster.insert(hit_id, cluster_id);
                    stats.hits_attached_lookback += 1;
                    attached = true;
                    break;
                }
                if scanned_best.map_or(true, |(best, _)| distance < best) {
                    scanned_best = Some((distance, cluster_id));
                }
            }

            if attached {
                continue;
            }
            if let Some((_, cluster_id)) = scanned_best {
                event.add_hit_to_cluster(cluster_id, hit_id)?;
                state.hit_to_cluster.insert(hit_id, cluster_id);
                stats.hits_attached_lookback += 1;
            } else {
                remaining.push(hit_id);
            }
        }
        *layer_hits = remaining;
        Ok(())
    }

    /// Same-layer pass: repeats full scans until a scan attaches nothing
    /// (each attachment can make a cluster the best neighbor of a later
    /// hit), then seeds one new cluster from the highest-priority leftover
    /// and repeats. Terminates because every outer iteration consumes at
    /// least one hit.
    fn same_layer_pass(
        &self,
        event: &mut Event,
        state: &mut PassState,
        layer: u32,
        layer_hits: &mut Vec<HitId>,
        stats: &mut ClusteringStats,
    ) -> Result<()> {
        while !layer_hits.is_empty() {
            loop {
                let mut modified = false;
                let mut still_free = Vec::with_capacity(layer_hits.len());
                for &hit_id in layer_hits.iter() {
                    let hit = *event.hit(hit_id)?;
                    match self.best_cluster_for_hit(event, state, &hit, layer)? {
                        Some((cluster_id, _)) => {
                            event.add_hit_to_cluster(cluster_id, hit_id)?;
                            state.hit_to_cluster.insert(hit_id, cluster_id);
                            stats.hits_attached_same_layer += 1;
                            modified = true;
                        }
                        None => still_free.push(hit_id),
                    }
                }
                *layer_hits = still_free;
                if !modified {
                    break;
                }
            }

            if let Some(&seed_id) = layer_hits.first() {
                let cluster_id = event.create_cluster_from_hit(seed_id)?;
                state.hit_to_cluster.insert(seed_id, cluster_id);
                stats.hit_seeded_clusters += 1;
                layer_hits.remove(0);
                trace!("layer {layer}: seeded cluster {} from hit {}", cluster_id.0, seed_id.0);
            }
        }
        Ok(())
    }

    /// Best cluster for one hit at one search layer: smallest generic
    /// distance strictly below the cut. Candidates are scanned in hadronic
    /// energy order so that an equal-distance tie resolves to the more
    /// energetic cluster.
    fn best_cluster_for_hit(
        &self,
        event: &Event,
        state: &PassState,
        hit: &CaloHit,
        search_layer: u32,
    ) -> Result<Option<(ClusterId, f64)>> {
        let candidates = self.candidate_clusters(event, state, hit, search_layer)?;
        let calculator =
            GenericDistance::new(&self.config, &self.geometry as &dyn PseudoLayerPlugin, event);

        let mut best_distance = self.config.generic_distance_cut;
        let mut best = None;
        for cluster_id in candidates {
            let cluster = event.cluster(cluster_id)?;
            if let Some(distance) =
                calculator.generic_distance(cluster, hit, search_layer, best_distance)?
            {
                best_distance = distance;
                best = Some((cluster_id, distance));
            }
        }
        Ok(best)
    }

    /// Candidate clusters for one (hit, search layer) pair, ordered by
    /// descending hadronic energy then id.
    ///
    /// With the index enabled, the hit box covers every separation at which
    /// the same-layer or cone-approach metrics can still fall below the cut,
    /// and the track box covers the track-projection and track-seed metrics;
    /// an axis-aligned box of half-width r contains the ball of radius r, so
    /// the restriction prunes no reachable cluster.
    fn candidate_clusters(
        &self,
        event: &Event,
        state: &PassState,
        hit: &CaloHit,
        search_layer: u32,
    ) -> Result<Vec<ClusterId>> {
        let ids: Vec<ClusterId> = if self.config.use_spatial_index {
            let mut set: BTreeSet<ClusterId> = BTreeSet::new();
            let p = hit.position();

            if let Some(index) = &state.hit_index {
                let pad_widths = match self.geometry.granularity(hit.region()) {
                    Granularity::Fine => self.config.same_layer_pad_widths_fine,
                    Granularity::Coarse => self.config.same_layer_pad_widths_coarse,
                };
                let same_layer_reach =
                    self.config.generic_distance_cut * pad_widths * hit.cell_length_scale();
                let r = self.config.cone_approach_max_separation.max(same_layer_reach);
                let l = f64::from(search_layer);
                let mut found = Vec::new();
                index.search_box(&[p.x - r, p.y - r, p.z - r, l], &[p.x + r, p.y + r, p.z + r, l], &mut found);
                for raw in found {
                    if let Some(cluster_id) = state.hit_to_cluster.get(&HitId(raw)) {
                        set.insert(*cluster_id);
                    }
                }
            }

            if let Some(index) = &state.track_index {
                let r = self
                    .config
                    .max_track_seed_separation
                    .max(self.config.cone_approach_max_separation);
                let mut found = Vec::new();
                index.search_box(&[p.x - r, p.y - r, p.z - r], &[p.x + r, p.y + r, p.z + r], &mut found);
                for raw in found {
                    if let Some(cluster_id) = state.track_to_cluster.get(&TrackId(raw)) {
                        set.insert(*cluster_id);
                    }
                }
            }

            set.into_iter().collect()
        } else {
            event.cluster_ids().collect()
        };

        let mut with_energy: Vec<(ClusterId, f64)> = Vec::with_capacity(ids.len());
        for cluster_id in ids {
            with_energy.push((cluster_id, event.cluster(cluster_id)?.hadronic_energy()));
        }
        with_energy.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(with_energy.into_iter().map(|(id, _)| id).collect())
    }

    /// Cleanup: deletes every cluster left with zero hits. Idempotent.
    fn remove_empty_clusters(&self, event: &mut Event) -> Result<usize> {
        let empty: Vec<ClusterId> = event
            .cluster_ids()
            .filter(|id| event.cluster(*id).map(Cluster::is_empty).unwrap_or(false))
            .collect();
        let removed = empty.len();
        for cluster_id in empty {
            event.delete_cluster(cluster_id)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calorec_core::HitRegion;
    use nalgebra::Point3;

    fn hit_at(x: f64, y: f64, z: f64, layer: u32, energy: f64) -> CaloHit {
        CaloHit::builder(Point3::new(x, y, z), layer, HitRegion::EcalBarrel)
            .with_hadronic_energy(energy)
            .build()
            .unwrap()
    }

    #[test]
    fn test_relevant_hits_ordering_is_energy_then_id() {
        let engine = ConeClustering::new(
            ConeClusteringConfig::default().with_seed_strategy(SeedStrategy::None),
        );
        let event = Event::without_tracks(vec![
            hit_at(0.0, 0.0, 10.0, 0, 1.0),
            hit_at(1.0, 0.0, 10.0, 0, 5.0),
            hit_at(2.0, 0.0, 10.0, 0, 5.0),
            hit_at(3.0, 0.0, 10.0, 0, 2.0),
        ]);

        let ordered = engine.relevant_hits(&event, 0);
        assert_eq!(ordered, vec![HitId(1), HitId(2), HitId(3), HitId(0)]);
    }

    #[test]
    fn test_isolated_hits_skipped_by_default() {
        let engine = ConeClustering::new(
            ConeClusteringConfig::default().with_seed_strategy(SeedStrategy::None),
        );
        let isolated = CaloHit::builder(Point3::new(0.0, 0.0, 10.0), 0, HitRegion::EcalBarrel)
            .with_isolated(true)
            .with_hadronic_energy(1.0)
            .build()
            .unwrap();
        let event = Event::without_tracks(vec![isolated, hit_at(5.0, 0.0, 10.0, 0, 1.0)]);

        assert_eq!(engine.relevant_hits(&event, 0), vec![HitId(1)]);
    }

    #[test]
    fn test_seeding_requires_track_list() {
        let engine = ConeClustering::new(ConeClusteringConfig::default());
        let mut event = Event::without_tracks(vec![hit_at(0.0, 0.0, 10.0, 0, 1.0)]);
        assert!(matches!(engine.run(&mut event), Err(Error::MissingTrackList)));

        // An empty-but-present list is not an error.
        let mut event = Event::new(vec![hit_at(0.0, 0.0, 10.0, 0, 1.0)], vec![]);
        let stats = engine.run(&mut event).unwrap();
        assert_eq!(stats.track_seeded_clusters, 0);
        assert_eq!(stats.hit_seeded_clusters, 1);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        use calorec_core::{Track, TrackState};
        use nalgebra::Vector3;

        let engine = ConeClustering::new(ConeClusteringConfig::default());
        let track = Track::new(
            TrackState::new(Point3::new(0.0, 0.0, 200.0), Vector3::new(0.0, 0.0, 5.0)),
            true,
            false,
        )
        .unwrap();
        let mut event = Event::new(vec![], vec![track]);
        event.create_cluster_from_track(TrackId(0)).unwrap();

        assert_eq!(engine.remove_empty_clusters(&mut event).unwrap(), 1);
        assert_eq!(engine.remove_empty_clusters(&mut event).unwrap(), 0);
        assert_eq!(event.live_cluster_count(), 0);
    }
}
