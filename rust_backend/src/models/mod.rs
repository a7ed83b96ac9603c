pub mod activity;
pub mod aoi;
pub mod satellite;

pub use activity::*;
pub use aoi::*;
pub use satellite::*;
