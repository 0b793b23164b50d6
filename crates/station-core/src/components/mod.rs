//! Component definitions for the station simulation.
//!
//! Tile components are pure data attached to tile entities in the station's
//! ECS world. Behaviour lives in the systems, the power grid and crew actions.

mod common;
mod crew;
mod tile;

pub use common::*;
pub use crew::*;
pub use tile::*;
