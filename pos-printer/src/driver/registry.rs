//! Driver registry and detection

use tracing::debug;

use super::{
    BrandDescriptor, CitizenDescriptor, DriverDescriptor, EpsonDescriptor, GenericDescriptor,
    StarDescriptor,
};

/// Every registered descriptor, in registration order
///
/// Brand drivers come before the catch-all so they win priority ties.
pub fn all_descriptors() -> [DriverDescriptor; 4] {
    [
        StarDescriptor.into(),
        EpsonDescriptor.into(),
        CitizenDescriptor.into(),
        GenericDescriptor.into(),
    ]
}

/// Pick the driver for a device
///
/// Among descriptors whose `detect` matches, the lowest priority wins;
/// ties go to the earlier registration. Never fails: the generic
/// descriptor matches everything.
pub fn select_driver(name: &str, address: &str) -> DriverDescriptor {
    let selected = all_descriptors()
        .into_iter()
        .filter(|d| d.detect(name, address))
        .min_by_key(|d| d.priority())
        .unwrap_or_else(|| GenericDescriptor.into());

    debug!(name, address, brand = %selected.brand(), "Driver selected");
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Brand;

    #[test]
    fn test_star_tsp100_over_bluetooth() {
        let d = select_driver("Star TSP100", "00:11:22:33:44:55");
        assert_eq!(d.brand(), Brand::Star);
        assert_eq!(d.brand_name(), "Star Micronics");
    }

    #[test]
    fn test_empty_input_resolves_generic() {
        assert_eq!(select_driver("", "").brand(), Brand::Generic);
        assert_eq!(select_driver("HPRT TP808", "192.168.1.50").brand(), Brand::Generic);
    }

    #[test]
    fn test_lower_priority_wins() {
        // Matches Epson ("tm") and the generic fallback
        let d = select_driver("TM-T20", "");
        assert_eq!(d.brand(), Brand::Epson);
        assert!(d.priority() < GenericDescriptor.priority());
    }

    #[test]
    fn test_ties_follow_registration_order() {
        // "star" and "epson" both match at priority 1; Star is registered first
        assert_eq!(select_driver("epson star bundle", "").brand(), Brand::Star);
        // "citizen" and "tm" (via "ppu-tm") both match; Epson precedes Citizen
        assert_eq!(select_driver("citizen ppu-tm", "").brand(), Brand::Epson);
    }

    #[test]
    fn test_registry_has_single_fallback_last() {
        let all = all_descriptors();
        let fallbacks: Vec<_> = all.iter().filter(|d| d.detect("", "")).collect();
        assert_eq!(fallbacks.len(), 1);
        assert_eq!(all[3].brand(), Brand::Generic);
        assert!(all.iter().all(|d| d.priority() <= all[3].priority()));
    }
}
