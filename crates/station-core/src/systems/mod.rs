//! Systems - per-tick logic over tiles, effects and crew

mod doors;
mod effects;
mod environment;
mod oxygen;

pub use doors::*;
pub use effects::*;
pub use environment::*;
pub use oxygen::*;

use hecs::Entity;

use crate::components::{Oxygen, Vector2Int};
use crate::station::Station;

/// Tile holding the oxygen pool of a cell, usually its floor.
pub(crate) fn oxygen_tile(station: &Station, position: Vector2Int) -> Option<Entity> {
    station
        .tiles_at(position)
        .iter()
        .copied()
        .find(|&e| station.world.get::<&Oxygen>(e).is_ok())
}
