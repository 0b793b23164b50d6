//! Simulation engine - one fixed tick over the station and its crew

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::actions::{advance_front_action, Action};
use crate::components::*;
use crate::config::GameConfig;
use crate::defs::DefinitionCatalog;
use crate::station::Station;
use crate::systems::{apply_environment, update_current_tile};

/// Phases of one tick, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickPhase {
    ProcessPending,
    AdvanceActions,
    ApplyEffectsToCrew,
    UpdateCurrentTile,
    UpdateEffects,
    UpdateTiles,
}

pub const TICK_PHASES: [TickPhase; 6] = [
    TickPhase::ProcessPending,
    TickPhase::AdvanceActions,
    TickPhase::ApplyEffectsToCrew,
    TickPhase::UpdateCurrentTile,
    TickPhase::UpdateEffects,
    TickPhase::UpdateTiles,
];

/// An action submitted from outside the simulation thread.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub crew: CrewId,
    pub action: Action,
}

/// Main simulation state
pub struct Simulation {
    config: Arc<GameConfig>,
    /// Everything spatial
    pub station: Station,
    /// Crew by id. Iteration order within a tick is not part of the contract.
    pub crews: BTreeMap<CrewId, Crew>,
    tick: u64,
    next_crew_id: u32,
}

impl Simulation {
    pub fn new(config: Arc<GameConfig>, catalog: Arc<DefinitionCatalog>) -> Self {
        let station = Station::new(catalog, config.seed);
        Self {
            config,
            station,
            crews: BTreeMap::new(),
            tick: 0,
            next_crew_id: 0,
        }
    }

    pub fn config(&self) -> &Arc<GameConfig> {
        &self.config
    }

    /// Ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Spawn a crew member with full vitals at a world position.
    pub fn add_crew(&mut self, name: impl Into<String>, position: Vector2) -> CrewId {
        let id = CrewId(self.next_crew_id);
        self.next_crew_id += 1;

        let max = self.config.crew_max_health.min(self.config.crew_max_oxygen);
        let mut crew = Crew::new(id, name, position, max);
        crew.health = self.config.crew_max_health;
        crew.oxygen = self.config.crew_max_oxygen;
        update_current_tile(&mut crew, &self.station);
        self.crews.insert(id, crew);
        id
    }

    pub fn crew(&self, id: CrewId) -> Option<&Crew> {
        self.crews.get(&id)
    }

    pub fn crew_mut(&mut self, id: CrewId) -> Option<&mut Crew> {
        self.crews.get_mut(&id)
    }

    /// Run one full tick, consuming `pending` in phase one.
    pub fn tick(&mut self, pending: Vec<PendingAction>) {
        let mut pending = Some(pending);
        for phase in TICK_PHASES {
            self.run_phase(phase, &mut pending);
        }
        self.tick += 1;
    }

    fn run_phase(&mut self, phase: TickPhase, pending: &mut Option<Vec<PendingAction>>) {
        let config = Arc::clone(&self.config);
        let dt = config.tick_seconds;
        match phase {
            TickPhase::ProcessPending => {
                for submitted in pending.take().unwrap_or_default() {
                    self.enqueue(submitted);
                }
            }
            TickPhase::AdvanceActions => {
                for crew in self.crews.values_mut() {
                    advance_front_action(crew, &mut self.station, &config);
                }
            }
            TickPhase::ApplyEffectsToCrew => {
                for crew in self.crews.values_mut() {
                    apply_environment(crew, &mut self.station, &config, dt);
                }
            }
            TickPhase::UpdateCurrentTile => {
                for crew in self.crews.values_mut() {
                    update_current_tile(crew, &self.station);
                }
            }
            TickPhase::UpdateEffects => self.station.update_effects(&config, dt),
            TickPhase::UpdateTiles => self.station.update_tiles(&config, dt),
        }
    }

    /// Append a drained action to its crew queue. Actions for unknown, dead
    /// or off-station crew are dropped.
    fn enqueue(&mut self, submitted: PendingAction) {
        let Some(crew) = self.crews.get_mut(&submitted.crew) else {
            log::warn!("dropping {} action for unknown {}", submitted.action.name(), submitted.crew);
            return;
        };
        let on_station = crew
            .current_tile
            .is_some_and(|tile| self.station.contains_tile(tile));
        if !crew.alive || !on_station {
            log::warn!(
                "dropping {} action for {} ({})",
                submitted.action.name(),
                crew.id,
                if crew.alive { "off station" } else { "dead" }
            );
            return;
        }
        crew.actions.push_back(submitted.action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::EffectKind;

    fn simulation() -> Simulation {
        let mut sim = Simulation::new(Arc::new(GameConfig::default()), DefinitionCatalog::builtin());
        for x in 0..4 {
            let floor = sim.station.create_tile("floor", Vector2Int::new(x, 0), None).unwrap();
            sim.station.component_mut::<Oxygen>(floor).unwrap().level = 100.0;
        }
        sim
    }

    #[test]
    fn test_phase_order() {
        assert_eq!(TICK_PHASES[0], TickPhase::ProcessPending);
        assert_eq!(TICK_PHASES[5], TickPhase::UpdateTiles);
        let mut seen = std::collections::HashSet::new();
        assert!(TICK_PHASES.iter().all(|p| seen.insert(*p)));
    }

    #[test]
    fn test_pending_actions_reach_queue() {
        let mut sim = simulation();
        let id = sim.add_crew("Reyes", Vector2::new(0.0, 0.0));
        assert!(sim.crew(id).unwrap().current_tile.is_some());

        sim.tick(vec![PendingAction {
            crew: id,
            action: Action::move_to(Vector2Int::new(3, 0)),
        }]);
        let crew = sim.crew(id).unwrap();
        assert_eq!(crew.actions.len(), 1);
        assert!(crew.position.x > 0.0);
        assert_eq!(sim.tick_count(), 1);
    }

    #[test]
    fn test_dead_crew_drop_pending() {
        let mut sim = simulation();
        let id = sim.add_crew("Reyes", Vector2::new(0.0, 0.0));
        sim.crew_mut(id).unwrap().die();
        sim.tick(vec![PendingAction {
            crew: id,
            action: Action::move_to(Vector2Int::new(3, 0)),
        }]);
        let crew = sim.crew(id).unwrap();
        assert!(crew.is_idle());
        assert_eq!(crew.health, 0.0);
    }

    #[test]
    fn test_off_station_crew_drop_pending() {
        let mut sim = simulation();
        let id = sim.add_crew("Drifter", Vector2::new(20.0, 20.0));
        sim.tick(vec![PendingAction {
            crew: id,
            action: Action::extinguish(Vector2Int::ZERO),
        }]);
        assert!(sim.crew(id).unwrap().is_idle());
    }

    #[test]
    fn test_unknown_crew_is_ignored() {
        let mut sim = simulation();
        sim.tick(vec![PendingAction {
            crew: CrewId(99),
            action: Action::move_to(Vector2Int::ZERO),
        }]);
        assert_eq!(sim.tick_count(), 1);
    }

    #[test]
    fn test_fire_hurts_crew_within_tick() {
        let mut sim = simulation();
        let id = sim.add_crew("Reyes", Vector2::new(1.5, 0.5));
        sim.station.add_effect("fire", Vector2Int::new(1, 0)).unwrap();
        sim.tick(Vec::new());
        assert!(sim.crew(id).unwrap().health < 100.0);
        assert!(sim.station.effect_at(Vector2Int::new(1, 0), EffectKind::Fire).is_some());
    }
}
