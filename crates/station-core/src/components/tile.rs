//! Tile components: the capability objects attached to tile entities.
//!
//! Every tile is an entity in the station's `hecs::World`. A tile carries a
//! [`TileInfo`] plus at most one instance of each capability component below.
//! Capability lookup is a typed `world.get::<&T>(entity)`.

use bitflags::bitflags;
use hecs::Entity;
use serde::{Deserialize, Serialize};

use super::common::Vector2Int;

bitflags! {
    /// Height layers a tile occupies within its cell.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct TileHeight: u8 {
        const FLOOR = 0b001;
        const WAIST = 0b010;
        const CEILING = 0b100;
    }
}

bitflags! {
    /// Direction flags of a power connector.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PowerIo: u8 {
        const INPUT = 0b01;
        const OUTPUT = 0b10;
    }
}

/// Identifier of a room inside a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomId(pub u32);

/// Identity of a tile entity: which definition it came from and where it sits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileInfo {
    pub def_id: String,
    pub position: Vector2Int,
    pub height: TileHeight,
    pub room: Option<RoomId>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Walkable;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Solid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Structure;

/// Wire endpoint. `connections` holds connector tiles on adjacent cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerConnector {
    pub io: PowerIo,
    #[serde(skip)]
    pub connections: Vec<Entity>,
}

impl PowerConnector {
    pub fn new(io: PowerIo) -> Self {
        Self {
            io,
            connections: Vec::new(),
        }
    }

    pub fn connect(&mut self, other: Entity) {
        if !self.connections.contains(&other) {
            self.connections.push(other);
        }
    }

    pub fn disconnect(&mut self, other: Entity) {
        self.connections.retain(|e| *e != other);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Battery {
    pub charge: f32,
    pub max_charge: f32,
    /// Net charge change during the last power tick.
    pub delta_charge: f32,
}

impl Battery {
    pub fn new(charge: f32, max_charge: f32) -> Self {
        Self {
            charge: charge.clamp(0.0, max_charge),
            max_charge,
            delta_charge: 0.0,
        }
    }

    pub fn fraction(&self) -> f32 {
        if self.max_charge > 0.0 {
            self.charge / self.max_charge
        } else {
            0.0
        }
    }

    pub fn headroom(&self) -> f32 {
        (self.max_charge - self.charge).max(0.0)
    }
}

/// Consumer priority. Declaration order is service order; `Offline`
/// consumers are never served.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PowerPriority {
    Critical,
    #[default]
    Normal,
    Low,
    Offline,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PowerConsumer {
    /// Power drawn per second while active.
    pub consumption: f32,
    /// Player switch. Switched-off consumers draw nothing.
    pub powered_on: bool,
    /// Whether the consumer was served during the last power tick.
    pub active: bool,
    pub priority: PowerPriority,
}

impl PowerConsumer {
    pub fn new(consumption: f32, priority: PowerPriority) -> Self {
        Self {
            consumption,
            powered_on: true,
            active: false,
            priority,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PowerProducer {
    /// Power produced per second.
    pub production: f32,
    /// Production offered to the grid during the last power tick.
    pub available_power: f32,
}

impl PowerProducer {
    pub fn new(production: f32) -> Self {
        Self {
            production,
            available_power: 0.0,
        }
    }
}

/// Drives its tile's producer from station light levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolarPanel {
    pub output: f32,
}

/// Breathable air held by a cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Oxygen {
    pub level: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OxygenProducer {
    /// Oxygen added to the cell per second.
    pub rate: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecorativePart {
    pub offset: Vector2Int,
    pub sprite: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Decorative {
    pub parts: Vec<DecorativePart>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoorMovingState {
    /// Door drifts closed.
    #[default]
    Idle,
    /// Door has been pushed open by a crew member.
    ForcedOpen,
}

/// Door. `progress` is closure: 1.0 fully closed, 0.0 fully open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Door {
    pub moving_state: DoorMovingState,
    pub progress: f32,
}

impl Door {
    pub fn new(open: bool) -> Self {
        Self {
            moving_state: DoorMovingState::Idle,
            progress: if open { 0.0 } else { 1.0 },
        }
    }

    pub fn is_open(&self) -> bool {
        self.progress <= 0.0
    }

    pub fn is_sealed(&self) -> bool {
        self.progress >= 1.0
    }

    pub fn force_open(&mut self) {
        self.moving_state = DoorMovingState::ForcedOpen;
    }

    pub fn release(&mut self) {
        self.moving_state = DoorMovingState::Idle;
    }

    /// Animate toward open or closed.
    pub fn step(&mut self, speed: f32, dt: f32) {
        self.progress = match self.moving_state {
            DoorMovingState::ForcedOpen => (self.progress - speed * dt).max(0.0),
            DoorMovingState::Idle => (self.progress + speed * dt).min(1.0),
        };
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Durability {
    pub hitpoints: f32,
    pub max_hitpoints: f32,
}

impl Durability {
    pub fn new(max_hitpoints: f32) -> Self {
        Self {
            hitpoints: max_hitpoints,
            max_hitpoints,
        }
    }

    pub fn is_intact(&self) -> bool {
        self.hitpoints >= self.max_hitpoints
    }

    pub fn is_destroyed(&self) -> bool {
        self.hitpoints <= 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    North,
    East,
    South,
    West,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Rotatable {
    pub rotation: Rotation,
}

/// Cardinal mask of same-definition neighbours, for connected sprites.
/// Bit 0 north, 1 east, 2 south, 3 west.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteVariant(pub u8);

/// Closed set of capability kinds a tile definition can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Walkable,
    Solid,
    PowerConnector,
    Battery,
    PowerConsumer,
    PowerProducer,
    SolarPanel,
    Oxygen,
    OxygenProducer,
    Decorative,
    Door,
    Durability,
    Rotatable,
    Structure,
}

impl ComponentKind {
    pub fn is_power(self) -> bool {
        matches!(
            self,
            ComponentKind::PowerConnector
                | ComponentKind::Battery
                | ComponentKind::PowerConsumer
                | ComponentKind::PowerProducer
                | ComponentKind::SolarPanel
        )
    }
}
