//! Crew members: position, vitals and their queued work.

use std::collections::VecDeque;

use hecs::Entity;
use serde::{Deserialize, Serialize};

use super::common::{Color, Vector2, Vector2Int};
use crate::actions::Action;

/// Stable identifier used by player intents to address a crew member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CrewId(pub u32);

impl std::fmt::Display for CrewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "crew#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Crew {
    pub id: CrewId,
    pub name: String,
    pub position: Vector2,
    pub color: Color,
    pub health: f32,
    pub oxygen: f32,
    pub alive: bool,
    /// Floor tile under the crew member, refreshed once per tick.
    pub current_tile: Option<Entity>,
    /// Front is the active action.
    pub actions: VecDeque<Action>,
}

impl Crew {
    pub fn new(id: CrewId, name: impl Into<String>, position: Vector2, max_vitals: f32) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            color: Color::rgb(255, 255, 255),
            health: max_vitals,
            oxygen: max_vitals,
            alive: true,
            current_tile: None,
            actions: VecDeque::new(),
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn cell(&self) -> Vector2Int {
        self.position.floor()
    }

    pub fn is_idle(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn current_action(&self) -> Option<&Action> {
        self.actions.front()
    }

    /// The entity stays around so corpses can still be displayed.
    pub fn die(&mut self) {
        self.actions.clear();
        self.health = 0.0;
        self.oxygen = 0.0;
        self.alive = false;
    }
}
