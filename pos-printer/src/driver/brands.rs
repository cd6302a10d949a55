//! Brand descriptors

use super::{BRAND_PRIORITY, BrandDescriptor, FALLBACK_PRIORITY};
use crate::profile::Brand;

/// Star Micronics (TSP, mC-Print, SM series)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StarDescriptor;

impl BrandDescriptor for StarDescriptor {
    fn brand(&self) -> Brand {
        Brand::Star
    }

    fn priority(&self) -> u8 {
        BRAND_PRIORITY
    }

    fn keywords(&self) -> &'static [&'static str] {
        &[
            "star", "tsp", "mcp", "mc-print", "mcprint", "sm-l", "sm-s", "sm-t",
        ]
    }
}

/// Epson TM receipt printers, plus office models sharing the vendor name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpsonDescriptor;

impl BrandDescriptor for EpsonDescriptor {
    fn brand(&self) -> Brand {
        Brand::Epson
    }

    fn priority(&self) -> u8 {
        BRAND_PRIORITY
    }

    fn keywords(&self) -> &'static [&'static str] {
        &[
            "epson", "tm-t", "tm-m", "tm-p", "tm-u", "tm-l", "tm-h", "tm", "et-", "wf-", "xp-",
            "ecotank",
        ]
    }
}

/// Citizen CT-S / CL-S series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CitizenDescriptor;

impl BrandDescriptor for CitizenDescriptor {
    fn brand(&self) -> Brand {
        Brand::Citizen
    }

    fn priority(&self) -> u8 {
        BRAND_PRIORITY
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["citizen", "ct-s", "cl-s", "cmp", "cbm", "ppu"]
    }
}

/// Any ESC/POS printer (HPRT, Rongta, Xprinter, Bixolon, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericDescriptor;

impl BrandDescriptor for GenericDescriptor {
    fn brand(&self) -> Brand {
        Brand::Generic
    }

    fn priority(&self) -> u8 {
        FALLBACK_PRIORITY
    }

    fn keywords(&self) -> &'static [&'static str] {
        &[]
    }

    fn detect(&self, _name: &str, _address: &str) -> bool {
        true
    }

    fn raw_socket_fallback(&self) -> bool {
        true
    }
}
