//! Calorimeter hit type and builder.

use nalgebra::{Point3, Unit, Vector3};

use crate::error::{Error, Result};
use crate::geometry::HitRegion;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a hit within an event's hit list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HitId(pub usize);

/// A single calorimeter energy deposit.
///
/// Hits are created by the hosting engine before clustering runs and are
/// immutable apart from the availability flag, which the [`Event`](crate::Event)
/// object model flips once when the hit is consumed by a cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CaloHit {
    position: Point3<f64>,
    expected_direction: Unit<Vector3<f64>>,
    electromagnetic_energy: f64,
    hadronic_energy: f64,
    cell_length_scale: f64,
    pseudo_layer: u32,
    region: HitRegion,
    is_isolated: bool,
    is_possible_mip: bool,
    pub(crate) available: bool,
}

impl CaloHit {
    /// Starts building a hit at the given position, pseudolayer, and region.
    #[must_use]
    pub fn builder(position: Point3<f64>, pseudo_layer: u32, region: HitRegion) -> CaloHitBuilder {
        CaloHitBuilder::new(position, pseudo_layer, region)
    }

    /// Hit position (mm).
    #[inline]
    pub fn position(&self) -> Point3<f64> {
        self.position
    }

    /// Expected direction: the local detector-cell normal.
    #[inline]
    pub fn expected_direction(&self) -> Unit<Vector3<f64>> {
        self.expected_direction
    }

    /// Electromagnetic energy (GeV).
    #[inline]
    pub fn electromagnetic_energy(&self) -> f64 {
        self.electromagnetic_energy
    }

    /// Hadronic energy (GeV).
    #[inline]
    pub fn hadronic_energy(&self) -> f64 {
        self.hadronic_energy
    }

    /// Total input energy (GeV), the ordering key for hit processing.
    #[inline]
    pub fn input_energy(&self) -> f64 {
        self.electromagnetic_energy + self.hadronic_energy
    }

    /// Local granularity size of the cell (mm).
    #[inline]
    pub fn cell_length_scale(&self) -> f64 {
        self.cell_length_scale
    }

    /// Discretized depth from the interaction point.
    #[inline]
    pub fn pseudo_layer(&self) -> u32 {
        self.pseudo_layer
    }

    /// Detector region of the hit.
    #[inline]
    pub fn region(&self) -> HitRegion {
        self.region
    }

    /// Whether the hit was flagged as isolated upstream.
    #[inline]
    pub fn is_isolated(&self) -> bool {
        self.is_isolated
    }

    /// Whether the deposit pattern is consistent with a minimum-ionizing particle.
    #[inline]
    pub fn is_possible_mip(&self) -> bool {
        self.is_possible_mip
    }

    /// False once the hit has been consumed by a cluster.
    #[inline]
    pub fn is_available(&self) -> bool {
        self.available
    }
}

/// Builder for [`CaloHit`] with construction-time validation.
#[derive(Debug, Clone)]
pub struct CaloHitBuilder {
    position: Point3<f64>,
    expected_direction: Option<Unit<Vector3<f64>>>,
    electromagnetic_energy: f64,
    hadronic_energy: f64,
    cell_length_scale: f64,
    pseudo_layer: u32,
    region: HitRegion,
    is_isolated: bool,
    is_possible_mip: bool,
}

impl CaloHitBuilder {
    /// Creates a builder for a hit at the given position, pseudolayer, and region.
    #[must_use]
    pub fn new(position: Point3<f64>, pseudo_layer: u32, region: HitRegion) -> Self {
        Self {
            position,
            expected_direction: None,
            electromagnetic_energy: 0.0,
            hadronic_energy: 0.0,
            cell_length_scale: 1.0,
            pseudo_layer,
            region,
            is_isolated: false,
            is_possible_mip: false,
        }
    }

    /// Sets the expected direction (local cell normal).
    ///
    /// Defaults to the radial unit vector of the hit position.
    #[must_use]
    pub fn with_expected_direction(mut self, direction: Unit<Vector3<f64>>) -> Self {
        self.expected_direction = Some(direction);
        self
    }

    /// Sets the electromagnetic energy (GeV).
    #[must_use]
    pub fn with_electromagnetic_energy(mut self, energy: f64) -> Self {
        self.electromagnetic_energy = energy;
        self
    }

    /// Sets the hadronic energy (GeV).
    #[must_use]
    pub fn with_hadronic_energy(mut self, energy: f64) -> Self {
        self.hadronic_energy = energy;
        self
    }

    /// Sets the local cell length scale (mm).
    #[must_use]
    pub fn with_cell_length_scale(mut self, scale: f64) -> Self {
        self.cell_length_scale = scale;
        self
    }

    /// Flags the hit as isolated.
    #[must_use]
    pub fn with_isolated(mut self, isolated: bool) -> Self {
        self.is_isolated = isolated;
        self
    }

    /// Flags the hit as a possible minimum-ionizing-particle deposit.
    #[must_use]
    pub fn with_possible_mip(mut self, mip: bool) -> Self {
        self.is_possible_mip = mip;
        self
    }

    /// Validates and builds the hit.
    ///
    /// # Errors
    /// Fails on non-finite position, negative energies, or a non-positive
    /// cell length scale.
    pub fn build(self) -> Result<CaloHit> {
        if !self.position.coords.iter().all(|c| c.is_finite()) {
            return Err(Error::InvalidHit("non-finite position".into()));
        }
        if self.electromagnetic_energy < 0.0 || self.hadronic_energy < 0.0 {
            return Err(Error::InvalidHit("negative energy".into()));
        }
        if !(self.cell_length_scale > 0.0) {
            return Err(Error::InvalidHit("non-positive cell length scale".into()));
        }

        let expected_direction = match self.expected_direction {
            Some(direction) => direction,
            None => Unit::try_new(self.position.coords, 1.0e-12)
                .unwrap_or_else(|| Vector3::z_axis()),
        };

        Ok(CaloHit {
            position: self.position,
            expected_direction,
            electromagnetic_energy: self.electromagnetic_energy,
            hadronic_energy: self.hadronic_energy,
            cell_length_scale: self.cell_length_scale,
            pseudo_layer: self.pseudo_layer,
            region: self.region,
            is_isolated: self.is_isolated,
            is_possible_mip: self.is_possible_mip,
            available: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_builder_defaults() {
        let hit = CaloHit::builder(Point3::new(0.0, 0.0, 100.0), 3, HitRegion::EcalBarrel)
            .with_hadronic_energy(1.5)
            .build()
            .unwrap();

        assert_eq!(hit.pseudo_layer(), 3);
        assert!(hit.is_available());
        assert!(!hit.is_isolated());
        assert_relative_eq!(hit.input_energy(), 1.5);
        // Default expected direction is radial.
        assert_relative_eq!(hit.expected_direction().z, 1.0);
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        assert!(CaloHit::builder(Point3::new(f64::NAN, 0.0, 0.0), 0, HitRegion::EcalBarrel)
            .build()
            .is_err());
        assert!(
            CaloHit::builder(Point3::new(0.0, 0.0, 1.0), 0, HitRegion::EcalBarrel)
                .with_electromagnetic_energy(-1.0)
                .build()
                .is_err()
        );
        assert!(
            CaloHit::builder(Point3::new(0.0, 0.0, 1.0), 0, HitRegion::EcalBarrel)
                .with_cell_length_scale(0.0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_degenerate_position_falls_back_to_z_axis() {
        let hit = CaloHit::builder(Point3::origin(), 0, HitRegion::EcalBarrel)
            .build()
            .unwrap();
        assert_relative_eq!(hit.expected_direction().z, 1.0);
    }
}
