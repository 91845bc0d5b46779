//! Error types for calorec-core.

use thiserror::Error;

/// Result type alias for calorec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for calorimeter reconstruction.
///
/// Topological non-association ("this hit/cluster pair yields no usable
/// metric") is a normal outcome and is never represented here; see the
/// distance-metric APIs, which return `Option` for that case.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A hit failed construction-time validation.
    #[error("invalid hit: {0}")]
    InvalidHit(String),

    /// A track failed construction-time validation.
    #[error("invalid track: {0}")]
    InvalidTrack(String),

    /// Hit id does not refer to a hit in the event.
    #[error("unknown hit id: {0}")]
    UnknownHit(usize),

    /// Track id does not refer to a track in the event.
    #[error("unknown track id: {0}")]
    UnknownTrack(usize),

    /// Cluster id does not refer to a live cluster.
    #[error("unknown cluster id: {0}")]
    UnknownCluster(usize),

    /// Attempt to assign a hit that already belongs to a cluster.
    #[error("hit {0} is already assigned to a cluster")]
    HitUnavailable(usize),

    /// Attempt to delete a cluster that still holds hits.
    #[error("cluster {cluster} still contains {hits} hits")]
    ClusterNotEmpty {
        /// Offending cluster id.
        cluster: usize,
        /// Number of hits it still contains.
        hits: usize,
    },

    /// Track seeding was requested but the event carries no track list.
    #[error("track seeding requested but no track list is present")]
    MissingTrackList,

    /// A layer-range fit was requested with `inner > outer`.
    #[error("inconsistent layer range: [{inner}, {outer}]")]
    InvalidLayerRange {
        /// Requested inner pseudolayer.
        inner: u32,
        /// Requested outer pseudolayer.
        outer: u32,
    },
}
