mod base;
mod geojson;
mod memory;

pub use base::PointSource;
pub use geojson::GeoJsonSource;
pub use memory::MemorySource;
