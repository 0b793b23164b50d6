//! Oxygen production and diffusion between neighbouring cells.

use std::collections::HashMap;

use hecs::Entity;

use super::oxygen_tile;
use crate::components::{Door, Oxygen, OxygenProducer, PowerConsumer, TileInfo, Vector2Int};
use crate::config::GameConfig;
use crate::station::Station;

/// Producers feed the oxygen pool of their cell. A producer that draws
/// power only runs while its consumer was served this tick.
pub fn produce_oxygen(station: &mut Station, config: &GameConfig, dt: f32) {
    let output: Vec<(Vector2Int, f32)> = station
        .world
        .query::<(&TileInfo, &OxygenProducer, Option<&PowerConsumer>)>()
        .iter()
        .filter(|(_, (_, _, consumer))| consumer.map_or(true, |c| c.active))
        .map(|(_, (info, producer, _))| (info.position, producer.rate * dt))
        .collect();

    for (position, amount) in output {
        let Some(tile) = oxygen_tile(station, position) else {
            continue;
        };
        if let Ok(mut oxygen) = station.world.get::<&mut Oxygen>(tile) {
            oxygen.level = (oxygen.level + amount).min(config.tile_max_oxygen);
        }
    }
}

/// Exchange oxygen between cardinal neighbours, `(a - b) * rate * dt / 2`
/// per pair. Every flow is computed from the levels at the start of the
/// call. Cells behind a sealed door neither give nor take.
pub fn diffuse_oxygen(station: &mut Station, config: &GameConfig, dt: f32) {
    let mut levels: HashMap<Vector2Int, (Entity, f32)> = HashMap::new();
    for (entity, (info, oxygen)) in station.world.query::<(&TileInfo, &Oxygen)>().iter() {
        levels.insert(info.position, (entity, oxygen.level));
    }
    levels.retain(|&position, _| !is_sealed(station, position));

    let factor = config.oxygen_diffusion_rate * dt / 2.0;
    let mut deltas: HashMap<Entity, f32> = HashMap::new();
    for (&position, &(entity, level)) in &levels {
        // East and south only, so each pair is visited once.
        for neighbour in [position + Vector2Int::EAST, position + Vector2Int::SOUTH] {
            let Some(&(other, other_level)) = levels.get(&neighbour) else {
                continue;
            };
            let flow = (level - other_level) * factor;
            *deltas.entry(entity).or_insert(0.0) -= flow;
            *deltas.entry(other).or_insert(0.0) += flow;
        }
    }

    for (entity, delta) in deltas {
        if let Ok(mut oxygen) = station.world.get::<&mut Oxygen>(entity) {
            oxygen.level = (oxygen.level + delta).clamp(0.0, config.tile_max_oxygen);
        }
    }
}

fn is_sealed(station: &Station, position: Vector2Int) -> bool {
    station.door_at(position).is_some_and(|door| {
        station
            .world
            .get::<&Door>(door)
            .map(|d| d.is_sealed())
            .unwrap_or(false)
    })
}
