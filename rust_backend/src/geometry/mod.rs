//! Geometry/interval engine: polygons, ellipsoid, footprints and the in-view
//! predicate.

pub mod access;
pub mod ellipsoid;
pub mod footprint;
pub mod polygon;

pub use access::AccessPredicate;
pub use footprint::{boresight_ground_point, project_footprint, Footprint};
pub use polygon::{GeoPoint, GeoPolygon};
