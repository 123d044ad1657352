use std::fmt;

use serde::{Deserialize, Serialize};

/// EPSG coordinate reference system code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Crs(u32);

impl Crs {
    /// Geographic longitude/latitude, the working system of the pipeline.
    pub const WGS84: Crs = Crs(4326);
    /// Spherical web mercator.
    pub const WEB_MERCATOR: Crs = Crs(3857);

    pub const fn epsg(code: u32) -> Self {
        Self(code)
    }

    pub fn code(&self) -> u32 {
        self.0
    }

    /// Parses `EPSG:4326`, `urn:ogc:def:crs:EPSG::4326`, `OGC:CRS84` style names or a bare code.
    pub fn parse(name: &str) -> Option<Crs> {
        let name = name.trim();
        let upper = name.to_uppercase();

        if upper.ends_with("CRS84") {
            return Some(Crs::WGS84);
        }

        let code = upper
            .rsplit(':')
            .find(|segment| !segment.is_empty())
            .unwrap_or(&upper);

        code.parse().ok().map(Crs)
    }
}

impl Default for Crs {
    fn default() -> Self {
        Crs::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}
