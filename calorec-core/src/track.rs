//! Reconstructed track types.

use nalgebra::{Point3, Unit, Vector3};

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a track within an event's track list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackId(pub usize);

/// Projected track state (position and momentum) at the calorimeter front face.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackState {
    /// Projected position (mm).
    pub position: Point3<f64>,
    /// Momentum at the projection point (GeV).
    pub momentum: Vector3<f64>,
}

impl TrackState {
    /// Creates a track state from a projected position and momentum.
    #[must_use]
    pub fn new(position: Point3<f64>, momentum: Vector3<f64>) -> Self {
        Self { position, momentum }
    }

    /// Unit momentum direction.
    ///
    /// The momentum is validated non-degenerate at [`Track`] construction,
    /// so normalization here cannot fail.
    #[inline]
    #[must_use]
    pub fn direction(&self) -> Unit<Vector3<f64>> {
        Unit::new_normalize(self.momentum)
    }
}

/// A reconstructed charged-particle trajectory, read-only to the clustering core.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Track {
    state_at_calorimeter: TrackState,
    can_form_pfo: bool,
    reaches_endcap: bool,
}

impl Track {
    /// Creates a track from its calorimeter-face projection and seeding flags.
    ///
    /// # Errors
    /// Fails if the projected state is non-finite or the momentum is degenerate.
    pub fn new(
        state_at_calorimeter: TrackState,
        can_form_pfo: bool,
        reaches_endcap: bool,
    ) -> Result<Self> {
        let finite = state_at_calorimeter.position.coords.iter().all(|c| c.is_finite())
            && state_at_calorimeter.momentum.iter().all(|c| c.is_finite());
        if !finite {
            return Err(Error::InvalidTrack("non-finite calorimeter projection".into()));
        }
        if state_at_calorimeter.momentum.norm_squared() <= 0.0 {
            return Err(Error::InvalidTrack("zero momentum at calorimeter".into()));
        }

        Ok(Self {
            state_at_calorimeter,
            can_form_pfo,
            reaches_endcap,
        })
    }

    /// Projected state at the calorimeter front face.
    #[inline]
    pub fn state_at_calorimeter(&self) -> &TrackState {
        &self.state_at_calorimeter
    }

    /// Whether the track is usable to seed a particle-flow cluster.
    #[inline]
    pub fn can_form_pfo(&self) -> bool {
        self.can_form_pfo
    }

    /// Whether the calorimeter projection lands in the endcap region.
    #[inline]
    pub fn reaches_endcap(&self) -> bool {
        self.reaches_endcap
    }
}
