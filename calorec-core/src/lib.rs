//! calorec-core: object model and geometry for calorimeter reconstruction.
//!
//! This crate provides the foundational types consumed by the clustering
//! engines: calorimeter hits, reconstructed tracks, clusters ordered by
//! pseudolayer, the geometry oracle boundary, and the layer-centroid fit
//! helper.

pub mod cluster;
pub mod error;
pub mod event;
pub mod fit;
pub mod geometry;
pub mod hit;
pub mod track;

pub use cluster::{Cluster, ClusterId};
pub use error::{Error, Result};
pub use event::Event;
pub use fit::{approximate_direction, fit_layer_centroids, ClusterFitResult};
pub use geometry::{DetectorGeometry, Granularity, HitRegion, PseudoLayerPlugin};
pub use hit::{CaloHit, CaloHitBuilder, HitId};
pub use track::{Track, TrackId, TrackState};
