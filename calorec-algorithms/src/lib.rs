//! calorec-algorithms: cone clustering for calorimeter reconstruction.
//!
//! The entry point is [`ConeClustering`]: configured once, then run over an
//! [`Event`] holding the input hit and track lists. The engine seeds clusters
//! from tracks, walks pseudolayers in ascending order attaching hits through
//! the generic distance metric, and deletes clusters that end the pass empty.
//!
//! ```no_run
//! use calorec_algorithms::{ConeClustering, ConeClusteringConfig};
//! use calorec_core::Event;
//!
//! # fn demo(mut event: Event) -> calorec_core::Result<()> {
//! let engine = ConeClustering::new(ConeClusteringConfig::default());
//! let stats = engine.run(&mut event)?;
//! println!("{} clusters formed", event.live_cluster_count());
//! # let _ = stats;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cone;
pub mod distance;
pub mod spatial;

pub use cone::{ClusteringStats, ConeClustering, ConeClusteringConfig, SeedStrategy};
pub use distance::GenericDistance;
pub use spatial::KdTree;

pub use calorec_core::{
    CaloHit, CaloHitBuilder, Cluster, ClusterId, DetectorGeometry, Error, Event, Granularity,
    HitId, HitRegion, PseudoLayerPlugin, Result, Track, TrackId, TrackState,
};
