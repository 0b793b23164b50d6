//! Station Core - Space Station Simulation Engine
//!
//! A tile-based simulation of a crewed space station: power grids, oxygen,
//! fire and crew working through queued actions, advanced on a fixed
//! timestep separate from rendering.
//!
//! # Architecture
//!
//! Tiles are entities in a `hecs` world owned by the [`station::Station`]:
//! - **Definitions**: JSON tile and effect templates ([`defs`])
//! - **Components**: Pure data attached to tiles (Door, Battery, Oxygen, etc.)
//! - **Systems**: Per-tick logic over tiles, effects and crew
//! - **Actions**: Per-crew FIFO queues of Move, Extinguish, Repair and
//!   Construction work
//!
//! A [`server::GameServer`] runs the [`engine::Simulation`] on a scheduler
//! thread and accepts player intents from any thread.
//!
//! # Example
//!
//! ```rust,no_run
//! use station_core::prelude::*;
//! use station_core::generation::{generate_demo_station, DemoConfig};
//!
//! let mut sim = Simulation::new(GameConfig::builtin(), DefinitionCatalog::builtin());
//! let layout = generate_demo_station(&mut sim, &DemoConfig::default()).unwrap();
//!
//! let mut server = GameServer::new(sim, GameMode::Local);
//! server.start().unwrap();
//! server.send_player_action(layout.crew[0], Action::move_to(layout.door));
//! ```

pub mod actions;
pub mod components;
pub mod config;
pub mod defs;
pub mod engine;
pub mod generation;
pub mod pathfinding;
pub mod power;
pub mod scheduler;
pub mod server;
pub mod station;
pub mod systems;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::actions::{Action, ActionStatus};
    pub use crate::components::*;
    pub use crate::config::GameConfig;
    pub use crate::defs::{DefinitionCatalog, EffectKind};
    pub use crate::engine::{Simulation, TickPhase, TICK_PHASES};
    pub use crate::server::{GameMode, GameServer, RenderSnapshot};
    pub use crate::station::{Station, StationError};
}
