//! Raster synthesis from frequency-domain data.

pub mod image;
pub mod palette;
