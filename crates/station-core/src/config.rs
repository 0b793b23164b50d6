//! Gameplay constants, loaded once before the simulation starts.
//!
//! A `GameConfig` is validated on load and then shared read-only as
//! `Arc<GameConfig>` between the scheduler thread and player-facing calls.
//! Rates are per simulated second unless noted otherwise.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const BUILTIN_CONFIG: &str = include_str!("../../../data/config.json");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse game config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read game config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid game config value {field}: {value}")]
    Invalid { field: &'static str, value: f32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Length of one fixed simulation tick in seconds.
    pub tick_seconds: f32,
    /// Crew walking speed in cells per second.
    pub move_speed: f32,
    pub crew_max_health: f32,
    pub crew_max_oxygen: f32,
    /// Crew oxygen lost per second in unbreathable air.
    pub oxygen_use: f32,
    /// Crew oxygen regained per second in breathable air.
    pub oxygen_refill: f32,
    /// Minimum cell oxygen level a crew member can breathe.
    pub breathable_oxygen: f32,
    pub tile_max_oxygen: f32,
    /// Fraction of the level difference exchanged between neighbours per second.
    pub oxygen_diffusion_rate: f32,
    /// Hitpoints restored per second.
    pub repair_speed: f32,
    /// Extinguish progress per second (1.0 completes).
    pub extinguish_speed: f32,
    /// Planned task progress per second (1.0 completes).
    pub build_speed: f32,
    /// Door travel per second (1.0 is a full open or close).
    pub door_speed: f32,
    /// Crew health lost per second per unit of fire size.
    pub fire_damage: f32,
    /// Cell oxygen burnt per second per unit of fire size.
    pub fire_oxygen_use: f32,
    /// Fire size change per second.
    pub fire_growth: f32,
    /// Cell oxygen below which fire shrinks instead of growing.
    pub fire_min_oxygen: f32,
    /// Fire size from which fire may spread.
    pub fire_spread_size: f32,
    /// Spread probability per second.
    pub fire_spread_chance: f32,
    /// Tile hitpoints lost per second per unit of fire size.
    pub fire_tile_damage: f32,
    pub solar_intensity: f32,
    /// Idle sleep between scheduler iterations.
    pub scheduler_sleep_ms: u64,
    pub seed: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 0.05,
            move_speed: 3.0,
            crew_max_health: 100.0,
            crew_max_oxygen: 100.0,
            oxygen_use: 2.0,
            oxygen_refill: 10.0,
            breathable_oxygen: 20.0,
            tile_max_oxygen: 100.0,
            oxygen_diffusion_rate: 0.5,
            repair_speed: 10.0,
            extinguish_speed: 0.5,
            build_speed: 0.25,
            door_speed: 2.0,
            fire_damage: 10.0,
            fire_oxygen_use: 4.0,
            fire_growth: 0.1,
            fire_min_oxygen: 10.0,
            fire_spread_size: 0.8,
            fire_spread_chance: 0.2,
            fire_tile_damage: 5.0,
            solar_intensity: 1.0,
            scheduler_sleep_ms: 1,
            seed: 7,
        }
    }
}

impl GameConfig {
    /// Config embedded in the crate. Panics if the embedded data is invalid.
    pub fn builtin() -> Arc<Self> {
        Self::from_json_str(BUILTIN_CONFIG)
            .map(Arc::new)
            .expect("builtin game config should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_seconds > 0.0) {
            return Err(ConfigError::Invalid {
                field: "tick_seconds",
                value: self.tick_seconds,
            });
        }
        let rates = [
            ("move_speed", self.move_speed),
            ("crew_max_health", self.crew_max_health),
            ("crew_max_oxygen", self.crew_max_oxygen),
            ("oxygen_use", self.oxygen_use),
            ("oxygen_refill", self.oxygen_refill),
            ("breathable_oxygen", self.breathable_oxygen),
            ("tile_max_oxygen", self.tile_max_oxygen),
            ("oxygen_diffusion_rate", self.oxygen_diffusion_rate),
            ("repair_speed", self.repair_speed),
            ("extinguish_speed", self.extinguish_speed),
            ("build_speed", self.build_speed),
            ("door_speed", self.door_speed),
            ("fire_damage", self.fire_damage),
            ("fire_oxygen_use", self.fire_oxygen_use),
            ("fire_growth", self.fire_growth),
            ("fire_min_oxygen", self.fire_min_oxygen),
            ("fire_spread_size", self.fire_spread_size),
            ("fire_spread_chance", self.fire_spread_chance),
            ("fire_tile_damage", self.fire_tile_damage),
            ("solar_intensity", self.solar_intensity),
        ];
        for (field, value) in rates {
            if !(value >= 0.0) {
                return Err(ConfigError::Invalid { field, value });
            }
        }
        Ok(())
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f32(self.tick_seconds)
    }

    pub fn scheduler_sleep(&self) -> Duration {
        Duration::from_millis(self.scheduler_sleep_ms)
    }

    /// Distance a crew member covers in one tick.
    pub fn move_per_tick(&self) -> f32 {
        self.move_speed * self.tick_seconds
    }
}
