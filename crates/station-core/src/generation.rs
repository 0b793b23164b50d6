//! Demo station generation - two rooms joined by a door, each on its own grid

use hecs::Entity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::components::*;
use crate::engine::Simulation;
use crate::station::StationError;

/// Configuration for the demo station
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Interior width of each room in cells.
    pub room_width: i32,
    pub room_height: i32,
    pub crew_count: u32,
    pub starting_steel: u32,
    pub starting_copper: u32,
    /// Oxygen level every interior floor starts with.
    pub initial_oxygen: f32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            room_width: 6,
            room_height: 5,
            crew_count: 3,
            starting_steel: 20,
            starting_copper: 10,
            initial_oxygen: 80.0,
        }
    }
}

/// Result of demo generation
#[derive(Debug)]
pub struct DemoLayout {
    pub bridge: RoomId,
    pub engineering: RoomId,
    pub door: Vector2Int,
    pub oxygen_generator: Entity,
    pub console: Entity,
    pub generator: Entity,
    pub battery: Entity,
    pub crew: Vec<CrewId>,
}

/// Build the demo station into an empty simulation.
///
/// The bridge (west) runs a solar panel, an oxygen generator, a console and
/// a light. Engineering (east) runs a generator, a battery and a light. The
/// shared wall has a closed door in the middle. Crew start on the bridge.
pub fn generate_demo_station(
    sim: &mut Simulation,
    config: &DemoConfig,
) -> Result<DemoLayout, StationError> {
    let w = config.room_width.max(4);
    let h = config.room_height.max(3);
    let divider = w + 1;
    let east_edge = 2 * w + 2;
    let door = Vector2Int::new(divider, (h + 1) / 2);

    let station = &mut sim.station;
    let bridge = station.create_room("Bridge");
    let engineering = station.create_room("Engineering");

    for x in 0..=east_edge {
        for y in 0..=h + 1 {
            let cell = Vector2Int::new(x, y);
            let boundary = x == 0 || x == east_edge || x == divider || y == 0 || y == h + 1;
            if cell == door {
                station.create_tile("floor", cell, None)?;
                station.create_tile("door", cell, None)?;
            } else if boundary {
                station.create_tile("wall", cell, None)?;
            } else {
                let room = if x < divider { bridge } else { engineering };
                let floor = station.create_tile("floor", cell, Some(room))?;
                if let Some(mut oxygen) = station.component_mut::<Oxygen>(floor) {
                    oxygen.level = config.initial_oxygen;
                }
            }
        }
    }

    for x in 1..=w {
        station.create_tile("wire", Vector2Int::new(x, 1), Some(bridge))?;
    }
    for x in divider + 1..east_edge {
        station.create_tile("wire", Vector2Int::new(x, 1), Some(engineering))?;
    }

    let oxygen_generator = station.create_tile("oxygen_generator", Vector2Int::new(1, 1), Some(bridge))?;
    station.create_tile("solar_panel", Vector2Int::new(2, 1), Some(bridge))?;
    let console = station.create_tile("console", Vector2Int::new(3, 1), Some(bridge))?;
    station.create_tile("ceiling_light", Vector2Int::new(w / 2, 2), Some(bridge))?;

    let generator = station.create_tile("generator", Vector2Int::new(divider + 1, 1), Some(engineering))?;
    let battery = station.create_tile("battery", Vector2Int::new(divider + 2, 1), Some(engineering))?;
    station.create_tile("ceiling_light", Vector2Int::new(divider + w / 2, 2), Some(engineering))?;

    station.add_resource("steel", config.starting_steel);
    station.add_resource("copper", config.starting_copper);

    let mut rng = StdRng::seed_from_u64(sim.config().seed);
    let mut crew = Vec::new();
    for i in 0..config.crew_count as i32 {
        let cell = Vector2Int::new(1 + i % w, h - (i / w) % (h - 1));
        let name = generate_name(&mut rng);
        let id = sim.add_crew(name, cell.to_vector2());
        if let Some(member) = sim.crew_mut(id) {
            member.color = CREW_COLORS[i as usize % CREW_COLORS.len()];
        }
        crew.push(id);
    }

    log::info!(
        "generated demo station: {} tiles, {} grids, {} crew",
        sim.station.tile_count(),
        sim.station.power_grids().len(),
        crew.len()
    );

    Ok(DemoLayout {
        bridge,
        engineering,
        door,
        oxygen_generator,
        console,
        generator,
        battery,
        crew,
    })
}

pub fn generate_name(rng: &mut impl Rng) -> String {
    let given = GIVEN_NAMES[rng.gen_range(0..GIVEN_NAMES.len())];
    let family = FAMILY_NAMES[rng.gen_range(0..FAMILY_NAMES.len())];
    format!("{given} {family}")
}

static GIVEN_NAMES: &[&str] = &[
    "Ada", "Bram", "Chiara", "Dmitri", "Esi", "Farid", "Greta", "Hiro", "Ines", "Jonah", "Kaveh",
    "Leila", "Mateo", "Nkechi", "Oskar", "Priya", "Quinn", "Rosa", "Soren", "Tamsin",
];

static FAMILY_NAMES: &[&str] = &[
    "Abara", "Brandt", "Castillo", "Dahl", "Eze", "Fontaine", "Gupta", "Halvorsen", "Ito",
    "Jovanovic", "Kowalski", "Lindqvist", "Mensah", "Novak", "Okoro", "Petrov",
];

const CREW_COLORS: [Color; 4] = [
    Color::rgb(230, 90, 70),
    Color::rgb(80, 160, 230),
    Color::rgb(120, 200, 90),
    Color::rgb(240, 200, 60),
];
