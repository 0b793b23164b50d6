//! How the station acts on the crew standing in it.

use super::oxygen_tile;
use crate::actions::clear_actions;
use crate::components::{Crew, Oxygen};
use crate::config::GameConfig;
use crate::defs::EffectKind;
use crate::station::Station;

/// Breathe, burn and possibly die.
pub fn apply_environment(crew: &mut Crew, station: &mut Station, config: &GameConfig, dt: f32) {
    if !crew.alive {
        return;
    }
    let cell = crew.cell();

    let mut breathed = false;
    if let Some(tile) = oxygen_tile(station, cell) {
        if let Ok(mut pool) = station.world.get::<&mut Oxygen>(tile) {
            if pool.level >= config.breathable_oxygen {
                let wanted = (config.oxygen_refill * dt)
                    .min(config.crew_max_oxygen - crew.oxygen)
                    .max(0.0);
                let drawn = wanted.min(pool.level);
                pool.level -= drawn;
                crew.oxygen += drawn;
                breathed = true;
            }
        }
    }
    if !breathed {
        crew.oxygen -= config.oxygen_use * dt;
    }

    if let Some(fire) = station.effect_at(cell, EffectKind::Fire) {
        crew.health -= config.fire_damage * fire.size * dt;
    }

    if crew.oxygen <= 0.0 || crew.health <= 0.0 {
        log::info!("{} ({}) died at {}", crew.name, crew.id, cell);
        clear_actions(crew, station);
        crew.die();
    }
}

pub fn update_current_tile(crew: &mut Crew, station: &Station) {
    crew.current_tile = station.floor_tile_at(crew.cell());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{CrewId, Vector2, Vector2Int};
    use crate::defs::DefinitionCatalog;

    fn setup(oxygen: f32) -> (Station, Crew) {
        let mut station = Station::new(DefinitionCatalog::builtin(), 5);
        let floor = station.create_tile("floor", Vector2Int::ZERO, None).unwrap();
        station.component_mut::<Oxygen>(floor).unwrap().level = oxygen;
        let crew = Crew::new(CrewId(0), "Okafor", Vector2::new(0.5, 0.5), 100.0);
        (station, crew)
    }

    #[test]
    fn test_breathing_draws_from_cell() {
        let (mut station, mut crew) = setup(50.0);
        crew.oxygen = 90.0;
        apply_environment(&mut crew, &mut station, &GameConfig::default(), 0.5);
        assert!((crew.oxygen - 95.0).abs() < 1e-6);
        assert!((station.oxygen_at(Vector2Int::ZERO).unwrap() - 45.0).abs() < 1e-6);
    }

    #[test]
    fn test_thin_air_suffocates() {
        let (mut station, mut crew) = setup(5.0);
        crew.oxygen = 1.0;
        apply_environment(&mut crew, &mut station, &GameConfig::default(), 1.0);
        assert!(!crew.alive);
        assert_eq!(crew.oxygen, 0.0);
        assert_eq!(station.oxygen_at(Vector2Int::ZERO), Some(5.0));
    }

    #[test]
    fn test_fire_burns_crew() {
        let (mut station, mut crew) = setup(100.0);
        station.add_effect("fire", Vector2Int::ZERO).unwrap();
        apply_environment(&mut crew, &mut station, &GameConfig::default(), 1.0);
        // 10 * 0.5.
        assert!((crew.health - 95.0).abs() < 1e-6);
        assert!(crew.alive);
    }

    #[test]
    fn test_current_tile_tracks_floor() {
        let (station, mut crew) = setup(0.0);
        update_current_tile(&mut crew, &station);
        assert_eq!(crew.current_tile, station.floor_tile_at(Vector2Int::ZERO));
        crew.position = Vector2::new(4.0, 4.0);
        update_current_tile(&mut crew, &station);
        assert_eq!(crew.current_tile, None);
    }
}
