//! Door animation and solar output, the per-tick tile updates that only
//! touch a single component.

use hecs::World;

use crate::components::{Door, PowerProducer, SolarPanel};
use crate::config::GameConfig;

/// Forced-open doors open, idle doors drift closed.
pub fn update_doors(world: &World, config: &GameConfig, dt: f32) {
    for (_entity, door) in world.query::<&mut Door>().iter() {
        door.step(config.door_speed, dt);
    }
}

pub fn update_solar_panels(world: &World, config: &GameConfig) {
    for (_entity, (panel, producer)) in world.query::<(&SolarPanel, &mut PowerProducer)>().iter() {
        producer.production = panel.output * config.solar_intensity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doors_close_unless_forced() {
        let mut world = World::new();
        let idle = world.spawn((Door::new(true),));
        let forced = world.spawn((Door::new(false),));
        world.get::<&mut Door>(forced).unwrap().force_open();

        let config = GameConfig::default();
        update_doors(&world, &config, 0.25);

        assert!((world.get::<&Door>(idle).unwrap().progress - 0.5).abs() < 1e-6);
        assert!((world.get::<&Door>(forced).unwrap().progress - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_solar_follows_intensity() {
        let mut world = World::new();
        let panel = world.spawn((SolarPanel { output: 8.0 }, PowerProducer::new(0.0)));
        let config = GameConfig {
            solar_intensity: 0.5,
            ..Default::default()
        };
        update_solar_panels(&world, &config);
        assert!((world.get::<&PowerProducer>(panel).unwrap().production - 4.0).abs() < 1e-6);
    }
}
