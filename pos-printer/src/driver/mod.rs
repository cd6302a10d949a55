//! Brand drivers
//!
//! A closed set of brand descriptors decides which code page and fallbacks
//! a session uses. Descriptors are pure; the live connection belongs to the
//! [`BrandDriver`] session created from one.

use enum_dispatch::enum_dispatch;

use crate::codepage::{CodePage, code_page_for};
use crate::profile::Brand;

mod brands;
mod identify;
mod registry;
mod session;

pub use brands::{CitizenDescriptor, EpsonDescriptor, GenericDescriptor, StarDescriptor};
pub use identify::{IDENTIFY_MAKER_QUERY, identify_lan_brand, parse_identity_reply};
pub use registry::{all_descriptors, select_driver};
pub use session::{BrandDriver, DeliveryRoute, PrintReport};

/// Priority of SDK-capable brand drivers
pub const BRAND_PRIORITY: u8 = 1;
/// Priority of the catch-all driver
pub const FALLBACK_PRIORITY: u8 = 10;

/// Static description of a brand family
#[enum_dispatch]
pub trait BrandDescriptor {
    fn brand(&self) -> Brand;

    /// Lower is preferred
    fn priority(&self) -> u8;

    /// Lowercase substrings of the device name that identify the brand
    fn keywords(&self) -> &'static [&'static str];

    /// Whether this descriptor claims the device
    ///
    /// Only the name is inspected; the address format never decides the
    /// brand.
    fn detect(&self, name: &str, _address: &str) -> bool {
        let name = name.to_lowercase();
        self.keywords().iter().any(|k| name.contains(k))
    }

    fn brand_name(&self) -> &'static str {
        self.brand().name()
    }

    fn code_page(&self) -> CodePage {
        code_page_for(self.brand())
    }

    /// Whether printing may fall back to a fresh raw socket on port 9100
    fn raw_socket_fallback(&self) -> bool {
        false
    }
}

/// Registered driver, dispatched statically
#[enum_dispatch(BrandDescriptor)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverDescriptor {
    Star(StarDescriptor),
    Epson(EpsonDescriptor),
    Citizen(CitizenDescriptor),
    Generic(GenericDescriptor),
}

impl From<Brand> for DriverDescriptor {
    fn from(brand: Brand) -> Self {
        match brand {
            Brand::Star => StarDescriptor.into(),
            Brand::Epson => EpsonDescriptor.into(),
            Brand::Citizen => CitizenDescriptor.into(),
            Brand::Generic => GenericDescriptor.into(),
        }
    }
}
