//! Fire growth, spread and decay.

use rand::seq::SliceRandom;
use rand::Rng;

use super::oxygen_tile;
use crate::components::{Durability, Oxygen, Vector2Int};
use crate::config::GameConfig;
use crate::defs::EffectKind;
use crate::station::Station;

const SPREAD_SIZE: f32 = 0.1;

/// Advance every fire by `dt` seconds.
///
/// A fire burns oxygen from its cell, then grows if enough is left and
/// shrinks otherwise. Large fires may ignite one cardinal neighbour per
/// tick. Tiles on a burning cell lose durability and are destroyed at zero.
pub fn update_effects(station: &mut Station, config: &GameConfig, dt: f32) {
    let fires: Vec<(usize, Vector2Int, f32)> = station
        .effects
        .iter()
        .enumerate()
        .filter(|(_, e)| e.kind == EffectKind::Fire)
        .map(|(i, e)| (i, e.position, e.size))
        .collect();

    let mut ignitions = Vec::new();
    let mut destroyed = Vec::new();
    for (index, position, size) in fires {
        let oxygen = burn_oxygen(station, position, config.fire_oxygen_use * size * dt);
        let new_size = if oxygen >= config.fire_min_oxygen {
            (size + config.fire_growth * dt).min(1.0)
        } else {
            size - config.fire_growth * dt
        };
        station.effects[index].size = new_size;

        let damage = config.fire_tile_damage * size * dt;
        for &tile in station.tiles_at(position) {
            if let Ok(mut durability) = station.world.get::<&mut Durability>(tile) {
                durability.hitpoints = (durability.hitpoints - damage).max(0.0);
                if durability.is_destroyed() {
                    destroyed.push(tile);
                }
            }
        }

        if new_size >= config.fire_spread_size
            && station.rng.gen::<f32>() < config.fire_spread_chance * dt
        {
            if let Some(&direction) = Vector2Int::CARDINALS.choose(&mut station.rng) {
                ignitions.push(position + direction);
            }
        }
    }

    station
        .effects
        .retain(|e| e.kind != EffectKind::Fire || e.size > 0.0);

    let fire_id = station
        .catalog()
        .effect_of_kind(EffectKind::Fire)
        .map(|def| def.id.clone())
        .unwrap_or_else(|| "fire".to_string());
    for target in ignitions {
        if can_ignite(station, target) {
            log::debug!("fire spread to {}", target);
            station.place_effect(fire_id.clone(), EffectKind::Fire, target, SPREAD_SIZE);
        }
    }

    for tile in destroyed {
        if let Some(info) = station.tile_info(tile) {
            log::info!("{} at {} burnt down", info.def_id, info.position);
        }
        station.delete_tile(tile);
    }
}

/// Remove up to `amount` oxygen from a cell, returning what is left.
fn burn_oxygen(station: &mut Station, position: Vector2Int, amount: f32) -> f32 {
    let Some(tile) = oxygen_tile(station, position) else {
        return 0.0;
    };
    match station.world.get::<&mut Oxygen>(tile) {
        Ok(mut oxygen) => {
            oxygen.level = (oxygen.level - amount).max(0.0);
            oxygen.level
        }
        Err(_) => 0.0,
    }
}

/// A cell catches fire only if it holds oxygen and has no fire or foam.
pub fn can_ignite(station: &Station, position: Vector2Int) -> bool {
    station.oxygen_at(position).is_some_and(|level| level > 0.0)
        && station.effect_at(position, EffectKind::Fire).is_none()
        && station.effect_at(position, EffectKind::Foam).is_none()
}
