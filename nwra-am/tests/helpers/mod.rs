//! Test Helper Utilities
//!
//! Shared utilities for testing nwra-am

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod raster_generator;
pub mod workspace;

pub use raster_generator::{write_constant_raster, write_corrupt_raster, write_raster_values, RasterSpec};
pub use workspace::TestWorkspace;
