//! Detector geometry: regions, granularity, and the pseudolayer oracle.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cell-size classification of a detector region.
///
/// Selects which set of distance-cut tunings applies to a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Granularity {
    /// Small cells (typically the electromagnetic calorimeter).
    Fine,
    /// Large cells (typically the hadronic calorimeter and muon system).
    Coarse,
}

/// Detector region a calorimeter hit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HitRegion {
    /// Electromagnetic calorimeter, barrel.
    EcalBarrel,
    /// Electromagnetic calorimeter, endcap.
    EcalEndcap,
    /// Hadronic calorimeter, barrel.
    HcalBarrel,
    /// Hadronic calorimeter, endcap.
    HcalEndcap,
    /// Muon system.
    Muon,
}

impl HitRegion {
    /// Whether this region is part of the electromagnetic calorimeter.
    #[inline]
    pub fn is_ecal(self) -> bool {
        matches!(self, HitRegion::EcalBarrel | HitRegion::EcalEndcap)
    }
}

/// Geometry oracle consumed by the clustering engine.
///
/// Exposes the pseudolayer assigned to the interaction point and the
/// granularity class of each detector region. Implementations are expected
/// to be cheap to query; the engine calls them per hit.
pub trait PseudoLayerPlugin: Send + Sync {
    /// Pseudolayer assigned to the interaction point.
    fn pseudo_layer_at_ip(&self) -> u32;

    /// Granularity class of a detector region.
    fn granularity(&self, region: HitRegion) -> Granularity;
}

/// Default geometry oracle.
///
/// Treats the electromagnetic calorimeter as fine-granularity and everything
/// else as coarse, with a configurable interaction-point pseudolayer.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectorGeometry {
    ip_pseudo_layer: u32,
}

impl DetectorGeometry {
    /// Creates the default geometry (interaction point at pseudolayer 0).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pseudolayer assigned to the interaction point.
    #[must_use]
    pub fn with_ip_pseudo_layer(mut self, layer: u32) -> Self {
        self.ip_pseudo_layer = layer;
        self
    }
}

impl PseudoLayerPlugin for DetectorGeometry {
    #[inline]
    fn pseudo_layer_at_ip(&self) -> u32 {
        self.ip_pseudo_layer
    }

    #[inline]
    fn granularity(&self, region: HitRegion) -> Granularity {
        if region.is_ecal() {
            Granularity::Fine
        } else {
            Granularity::Coarse
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_granularity_map() {
        let geometry = DetectorGeometry::new();
        assert_eq!(geometry.granularity(HitRegion::EcalBarrel), Granularity::Fine);
        assert_eq!(geometry.granularity(HitRegion::EcalEndcap), Granularity::Fine);
        assert_eq!(geometry.granularity(HitRegion::HcalBarrel), Granularity::Coarse);
        assert_eq!(geometry.granularity(HitRegion::Muon), Granularity::Coarse);
    }

    #[test]
    fn test_ip_pseudo_layer() {
        let geometry = DetectorGeometry::new().with_ip_pseudo_layer(2);
        assert_eq!(geometry.pseudo_layer_at_ip(), 2);
    }
}
