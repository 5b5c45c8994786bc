//! Deterministic medieval city generator.
//!
//! A seeded build partitions the map into Voronoi patches on a planar
//! half-edge graph, raises a curtain wall, routes streets and an optional
//! canal over a vertex topology graph, grows districts, and subdivides the
//! alley wards down to blocks, lots and building footprints. The same
//! blueprint always produces the same city.

pub mod blocks;
pub mod canal;
pub mod city;
pub mod district;
pub mod error;
pub mod geom;
pub mod partition;
pub mod planar;
pub mod random;
pub mod streets;
pub mod topology;
pub mod wall;
pub mod ward;

pub use city::{next_size, Blueprint, City};
pub use error::{BuildError, Result};
pub use random::Gen;
