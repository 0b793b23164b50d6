//! Crew action state machine.
//!
//! Each crew member owns a FIFO queue of actions. Only the front action is
//! updated, once per tick, and its returned [`ActionStatus`] is the only
//! way it leaves the queue. Missing targets are not errors: the action is
//! abandoned and popped.

use std::collections::VecDeque;

use hecs::Entity;
use serde::{Deserialize, Serialize};

use crate::components::{Crew, Door, Durability, Vector2Int};
use crate::config::GameConfig;
use crate::defs::EffectKind;
use crate::pathfinding::{a_star, does_path_have_obstacles, euclidean};
use crate::station::{Station, StationError, TaskProgress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    InProgress,
    Complete,
    Abandoned,
}

#[derive(Debug, Clone)]
pub enum Action {
    Move(MoveAction),
    Extinguish(ExtinguishAction),
    Repair(RepairAction),
    Construction(ConstructionAction),
}

impl Action {
    pub fn move_to(target: Vector2Int) -> Self {
        Action::Move(MoveAction::new(target))
    }

    pub fn extinguish(target: Vector2Int) -> Self {
        Action::Extinguish(ExtinguishAction::new(target))
    }

    pub fn repair(target: Entity) -> Self {
        Action::Repair(RepairAction::new(target))
    }

    pub fn construct(target: Vector2Int) -> Self {
        Action::Construction(ConstructionAction::new(target))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Move(_) => "move",
            Action::Extinguish(_) => "extinguish",
            Action::Repair(_) => "repair",
            Action::Construction(_) => "construction",
        }
    }

    /// Undo any hold this action has on the station. Called whenever the
    /// action leaves the queue.
    pub fn release(&mut self, station: &mut Station) {
        if let Action::Move(action) = self {
            action.release_door(station);
        }
    }

    /// Advance by one tick.
    pub fn update(&mut self, crew: &mut Crew, station: &mut Station, config: &GameConfig) -> ActionStatus {
        match self {
            Action::Move(action) => action.update(crew, station, config),
            Action::Extinguish(action) => action.update(station, config),
            Action::Repair(action) => action.update(station, config),
            Action::Construction(action) => action.update(crew, station, config),
        }
    }
}

/// Walk to a cell along an A* path, pushing doors open on the way.
#[derive(Debug, Clone)]
pub struct MoveAction {
    pub target: Vector2Int,
    path: Option<VecDeque<Vector2Int>>,
    /// Door this move is holding open.
    forced_door: Option<Entity>,
}

impl MoveAction {
    pub fn new(target: Vector2Int) -> Self {
        Self {
            target,
            path: None,
            forced_door: None,
        }
    }

    pub fn path(&self) -> Option<&VecDeque<Vector2Int>> {
        self.path.as_ref()
    }

    pub fn forced_door(&self) -> Option<Entity> {
        self.forced_door
    }

    fn release_door(&mut self, station: &mut Station) {
        if let Some(door) = self.forced_door.take() {
            if let Some(mut door) = station.component_mut::<Door>(door) {
                door.release();
            }
        }
    }

    fn update(&mut self, crew: &mut Crew, station: &mut Station, config: &GameConfig) -> ActionStatus {
        if self.path.is_none() {
            let start = crew.cell();
            if start == self.target {
                return ActionStatus::Complete;
            }
            let mut path = a_star(start, self.target, euclidean, |p| station.is_pathable(p));
            if path.is_empty() {
                log::debug!("{}: no path from {} to {}", crew.id, start, self.target);
                path.push_back(start);
            }
            self.path = Some(path);
        }
        let Some(path) = self.path.as_mut() else {
            return ActionStatus::Abandoned;
        };

        let mut budget = config.move_per_tick();
        loop {
            let Some(&waypoint) = path.front() else {
                return ActionStatus::Complete;
            };
            let goal = waypoint.to_vector2();
            let distance_left_sq = crew.position.distance_squared(&goal) - budget * budget;

            if distance_left_sq <= 0.0 {
                crew.position = goal;
                path.pop_front();
                if let Some(door) = station.door_at(waypoint) {
                    if let Some(mut door) = station.component_mut::<Door>(door) {
                        door.release();
                    }
                    if self.forced_door == Some(door) {
                        self.forced_door = None;
                    }
                }
                if path.is_empty() {
                    return ActionStatus::Complete;
                }
                if does_path_have_obstacles(path.iter(), |p| station.is_pathable(p)) {
                    log::debug!("{}: path to {} blocked, recomputing", crew.id, self.target);
                    self.path = None;
                    self.release_door(station);
                    return ActionStatus::InProgress;
                }
                budget = (-distance_left_sq).sqrt();
                continue;
            }

            if let Some(entity) = station.door_at(waypoint) {
                if self.forced_door != Some(entity) {
                    self.release_door(station);
                    self.forced_door = Some(entity);
                }
                if let Some(mut door) = station.component_mut::<Door>(entity) {
                    door.force_open();
                    if door.progress > 0.0 {
                        return ActionStatus::InProgress;
                    }
                }
            }
            let direction = (goal - crew.position).normalize();
            crew.position = crew.position + direction * budget;
            return ActionStatus::InProgress;
        }
    }
}

/// Put out the fire on a cell, leaving foam behind.
#[derive(Debug, Clone)]
pub struct ExtinguishAction {
    pub target: Vector2Int,
    pub progress: f32,
}

impl ExtinguishAction {
    pub fn new(target: Vector2Int) -> Self {
        Self {
            target,
            progress: 0.0,
        }
    }

    fn update(&mut self, station: &mut Station, config: &GameConfig) -> ActionStatus {
        if station.effect_at(self.target, EffectKind::Fire).is_none() {
            return ActionStatus::Abandoned;
        }
        self.progress += config.extinguish_speed * config.tick_seconds;
        if self.progress <= 1.0 {
            return ActionStatus::InProgress;
        }

        station.remove_effect(self.target, EffectKind::Fire);
        let foam = station
            .catalog()
            .effect_of_kind(EffectKind::Foam)
            .map(|def| def.id.clone());
        if let Some(foam) = foam {
            station.place_effect(foam, EffectKind::Foam, self.target, 1.0);
        }
        ActionStatus::Complete
    }
}

#[derive(Debug, Clone)]
pub struct RepairAction {
    pub target: Entity,
}

impl RepairAction {
    pub fn new(target: Entity) -> Self {
        Self { target }
    }

    fn update(&mut self, station: &mut Station, config: &GameConfig) -> ActionStatus {
        // Nothing left to repair.
        let Some(mut durability) = station.component_mut::<Durability>(self.target) else {
            return ActionStatus::Complete;
        };
        durability.hitpoints = (durability.hitpoints + config.repair_speed * config.tick_seconds)
            .min(durability.max_hitpoints);
        if durability.is_intact() {
            ActionStatus::Complete
        } else {
            ActionStatus::InProgress
        }
    }
}

/// Work on the planned task at the cell the crew member stands on.
#[derive(Debug, Clone)]
pub struct ConstructionAction {
    pub target: Vector2Int,
}

impl ConstructionAction {
    pub fn new(target: Vector2Int) -> Self {
        Self { target }
    }

    fn update(&mut self, crew: &Crew, station: &mut Station, config: &GameConfig) -> ActionStatus {
        if crew.cell() != self.target {
            return ActionStatus::Abandoned;
        }
        match station.progress_planned_task(self.target, config.build_speed * config.tick_seconds) {
            Ok(TaskProgress::InProgress(_)) => ActionStatus::InProgress,
            Ok(TaskProgress::Completed) => ActionStatus::Complete,
            Err(StationError::NoTask(_)) => ActionStatus::Abandoned,
            Err(err) => {
                log::warn!("{}: construction at {} failed: {}", crew.id, self.target, err);
                ActionStatus::Abandoned
            }
        }
    }
}

/// Update the front action of `crew`, popping it unless still in progress.
///
/// Returns `None` when there was nothing to run.
pub fn advance_front_action(
    crew: &mut Crew,
    station: &mut Station,
    config: &GameConfig,
) -> Option<ActionStatus> {
    if !crew.alive {
        return None;
    }
    let mut action = crew.actions.pop_front()?;
    let on_station = crew.current_tile.is_some_and(|tile| station.contains_tile(tile));
    let status = if on_station {
        action.update(crew, station, config)
    } else {
        ActionStatus::Abandoned
    };

    match status {
        ActionStatus::InProgress => crew.actions.push_front(action),
        ActionStatus::Complete => {
            action.release(station);
            log::debug!("{}: {} complete", crew.id, action.name());
        }
        ActionStatus::Abandoned => {
            action.release(station);
            log::debug!("{}: {} abandoned", crew.id, action.name());
        }
    }
    Some(status)
}

/// Drop every queued action, releasing whatever they hold on the station.
pub fn clear_actions(crew: &mut Crew, station: &mut Station) {
    for mut action in crew.actions.drain(..) {
        action.release(station);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{CrewId, Vector2};
    use crate::defs::DefinitionCatalog;

    fn v(x: i32, y: i32) -> Vector2Int {
        Vector2Int::new(x, y)
    }

    fn floor_strip(len: i32) -> Station {
        let mut station = Station::new(DefinitionCatalog::builtin(), 9);
        for x in 0..len {
            station.create_tile("floor", v(x, 0), None).unwrap();
        }
        station
    }

    fn crew_at(station: &Station, cell: Vector2Int) -> Crew {
        let mut crew = Crew::new(CrewId(1), "Ishikawa", cell.to_vector2(), 100.0);
        crew.current_tile = station.floor_tile_at(cell);
        crew
    }

    fn config() -> GameConfig {
        GameConfig {
            tick_seconds: 0.1,
            move_speed: 5.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_move_already_at_target() {
        let mut station = floor_strip(1);
        let mut crew = crew_at(&station, v(0, 0));
        crew.actions.push_back(Action::move_to(v(0, 0)));
        let status = advance_front_action(&mut crew, &mut station, &config());
        assert_eq!(status, Some(ActionStatus::Complete));
        assert!(crew.is_idle());
    }

    #[test]
    fn test_move_walks_to_target() {
        let mut station = floor_strip(4);
        let mut crew = crew_at(&station, v(0, 0));
        crew.actions.push_back(Action::move_to(v(3, 0)));
        let config = config();

        // 0.5 cells per tick.
        advance_front_action(&mut crew, &mut station, &config);
        assert!((crew.position.x - 0.5).abs() < 1e-5);
        advance_front_action(&mut crew, &mut station, &config);
        assert!((crew.position.x - 1.0).abs() < 1e-5);

        for _ in 0..4 {
            advance_front_action(&mut crew, &mut station, &config);
        }
        assert!(crew.is_idle());
        assert_eq!(crew.position, Vector2::new(3.0, 0.0));
    }

    #[test]
    fn test_move_carries_leftover_budget() {
        let mut station = floor_strip(4);
        let mut crew = crew_at(&station, v(0, 0));
        crew.actions.push_back(Action::move_to(v(3, 0)));
        // 0.75 cells per tick.
        let config = GameConfig {
            tick_seconds: 0.1,
            move_speed: 7.5,
            ..Default::default()
        };

        advance_front_action(&mut crew, &mut station, &config);
        assert!((crew.position.x - 0.75).abs() < 1e-4);

        // Snaps to (1, 0) with 0.25 covered, then spends sqrt(0.75² - 0.25²).
        advance_front_action(&mut crew, &mut station, &config);
        let carried = (0.75f32 * 0.75 - 0.25 * 0.25).sqrt();
        assert!((crew.position.x - (1.0 + carried)).abs() < 1e-4);
        assert_eq!(crew.position.y, 0.0);
    }

    #[test]
    fn test_move_to_unreachable_target_pops() {
        let mut station = floor_strip(2);
        let mut crew = crew_at(&station, v(0, 0));
        crew.actions.push_back(Action::move_to(v(5, 5)));
        let status = advance_front_action(&mut crew, &mut station, &config());
        assert_eq!(status, Some(ActionStatus::Complete));
        assert!(crew.is_idle());
        assert_eq!(crew.cell(), v(0, 0));
    }

    #[test]
    fn test_move_waits_for_door() {
        let mut station = floor_strip(3);
        let door = station.create_tile("door", v(1, 0), None).unwrap();
        let mut crew = crew_at(&station, v(0, 0));
        crew.actions.push_back(Action::move_to(v(2, 0)));
        let config = GameConfig {
            tick_seconds: 0.1,
            move_speed: 1.0,
            ..Default::default()
        };

        // Door cell is the first waypoint. Crew cannot reach it in one tick.
        advance_front_action(&mut crew, &mut station, &config);
        let forced = station.component::<Door>(door).unwrap().moving_state;
        assert_eq!(forced, crate::components::DoorMovingState::ForcedOpen);
        assert_eq!(crew.position, Vector2::new(0.0, 0.0));

        // Open the door fully, then the crew advances.
        station.component_mut::<Door>(door).unwrap().progress = 0.0;
        advance_front_action(&mut crew, &mut station, &config);
        assert!(crew.position.x > 0.0);
    }

    fn waiting_at_door() -> (Station, Crew, Entity, GameConfig) {
        let mut station = floor_strip(3);
        let door = station.create_tile("door", v(1, 0), None).unwrap();
        let mut crew = crew_at(&station, v(0, 0));
        crew.actions.push_back(Action::move_to(v(2, 0)));
        let config = GameConfig {
            tick_seconds: 0.1,
            move_speed: 1.0,
            ..Default::default()
        };
        advance_front_action(&mut crew, &mut station, &config);
        for _ in 0..3 {
            station.update_tiles(&config, config.tick_seconds);
        }
        let Some(Action::Move(action)) = crew.current_action() else {
            panic!("move should still be queued");
        };
        assert_eq!(action.forced_door(), Some(door));
        (station, crew, door, config)
    }

    #[test]
    fn test_cleared_move_releases_door() {
        let (mut station, mut crew, door, config) = waiting_at_door();
        assert!(!station.component::<Door>(door).unwrap().is_sealed());

        clear_actions(&mut crew, &mut station);
        assert!(crew.is_idle());
        assert_eq!(
            station.component::<Door>(door).unwrap().moving_state,
            crate::components::DoorMovingState::Idle
        );
        for _ in 0..10 {
            station.update_tiles(&config, config.tick_seconds);
        }
        assert!(station.component::<Door>(door).unwrap().is_sealed());
    }

    #[test]
    fn test_abandoned_move_releases_door() {
        let (mut station, mut crew, door, config) = waiting_at_door();
        crew.current_tile = None;
        assert_eq!(
            advance_front_action(&mut crew, &mut station, &config),
            Some(ActionStatus::Abandoned)
        );
        assert_eq!(
            station.component::<Door>(door).unwrap().moving_state,
            crate::components::DoorMovingState::Idle
        );
    }

    #[test]
    fn test_move_replans_around_new_wall() {
        let mut station = Station::new(DefinitionCatalog::builtin(), 9);
        for x in 0..5 {
            for y in 0..2 {
                station.create_tile("floor", v(x, y), None).unwrap();
            }
        }
        let mut crew = crew_at(&station, v(0, 0));
        crew.actions.push_back(Action::move_to(v(4, 0)));
        let config = config();

        advance_front_action(&mut crew, &mut station, &config);
        station.create_tile("wall", v(3, 0), None).unwrap();

        // Reaching (1, 0) reveals the wall further down the cached path.
        advance_front_action(&mut crew, &mut station, &config);
        assert_eq!(crew.position, Vector2::new(1.0, 0.0));
        let Some(Action::Move(action)) = crew.current_action() else {
            panic!("move should still be queued");
        };
        assert!(action.path().is_none());

        for _ in 0..30 {
            advance_front_action(&mut crew, &mut station, &config);
        }
        assert!(crew.is_idle());
        assert_eq!(crew.cell(), v(4, 0));
    }

    #[test]
    fn test_extinguish_missing_fire_is_abandoned() {
        let mut station = floor_strip(1);
        let mut crew = crew_at(&station, v(0, 0));
        crew.actions.push_back(Action::extinguish(v(0, 0)));
        let before = (crew.position, crew.health, crew.oxygen);

        let status = advance_front_action(&mut crew, &mut station, &config());
        assert_eq!(status, Some(ActionStatus::Abandoned));
        assert!(crew.is_idle());
        assert_eq!((crew.position, crew.health, crew.oxygen), before);
    }

    #[test]
    fn test_extinguish_leaves_foam() {
        let mut station = floor_strip(2);
        station.add_effect("fire", v(1, 0)).unwrap();
        let mut crew = crew_at(&station, v(0, 0));
        crew.actions.push_back(Action::extinguish(v(1, 0)));
        let config = GameConfig {
            tick_seconds: 0.1,
            extinguish_speed: 4.0,
            ..Default::default()
        };

        let mut ticks = 0;
        while !crew.is_idle() && ticks < 10 {
            advance_front_action(&mut crew, &mut station, &config);
            ticks += 1;
        }
        assert_eq!(ticks, 3);
        assert!(station.effect_at(v(1, 0), EffectKind::Fire).is_none());
        assert!(station.effect_at(v(1, 0), EffectKind::Foam).is_some());
    }

    #[test]
    fn test_repair_restores_hitpoints() {
        let mut station = floor_strip(2);
        let wall = station.create_tile("wall", v(1, 0), None).unwrap();
        station.component_mut::<Durability>(wall).unwrap().hitpoints = 95.0;
        let mut crew = crew_at(&station, v(0, 0));
        crew.actions.push_back(Action::repair(wall));
        let config = config();

        // 1.0 hitpoint per tick.
        for _ in 0..4 {
            assert_eq!(
                advance_front_action(&mut crew, &mut station, &config),
                Some(ActionStatus::InProgress)
            );
        }
        assert_eq!(
            advance_front_action(&mut crew, &mut station, &config),
            Some(ActionStatus::Complete)
        );
        assert!(station.component::<Durability>(wall).unwrap().is_intact());
    }

    #[test]
    fn test_repair_target_gone() {
        let mut station = floor_strip(2);
        let wall = station.create_tile("wall", v(1, 0), None).unwrap();
        station.delete_tile(wall);
        let mut crew = crew_at(&station, v(0, 0));
        crew.actions.push_back(Action::repair(wall));
        assert_eq!(
            advance_front_action(&mut crew, &mut station, &config()),
            Some(ActionStatus::Complete)
        );
        assert!(crew.is_idle());
    }

    #[test]
    fn test_construction_requires_presence() {
        let mut station = floor_strip(2);
        station.add_resource("copper", 1);
        station.request_planned_task(v(1, 0), "wire", true).unwrap();
        let mut crew = crew_at(&station, v(0, 0));
        crew.actions.push_back(Action::construct(v(1, 0)));
        assert_eq!(
            advance_front_action(&mut crew, &mut station, &config()),
            Some(ActionStatus::Abandoned)
        );
        assert_eq!(station.planned_task_at(v(1, 0)).unwrap().progress, 0.0);
    }

    #[test]
    fn test_construction_builds_tile() {
        let mut station = floor_strip(2);
        station.add_resource("copper", 1);
        station.request_planned_task(v(1, 0), "wire", true).unwrap();
        let mut crew = crew_at(&station, v(1, 0));
        crew.actions.push_back(Action::construct(v(1, 0)));
        let config = GameConfig {
            tick_seconds: 0.1,
            build_speed: 5.0,
            ..Default::default()
        };

        assert_eq!(
            advance_front_action(&mut crew, &mut station, &config),
            Some(ActionStatus::InProgress)
        );
        assert_eq!(
            advance_front_action(&mut crew, &mut station, &config),
            Some(ActionStatus::Complete)
        );
        assert!(station.tile_of_def_at(v(1, 0), "wire").is_some());
        assert!(station.planned_tasks().is_empty());
    }

    #[test]
    fn test_only_front_action_runs() {
        let mut station = floor_strip(3);
        let wall = station.create_tile("wall", v(2, 0), None).unwrap();
        station.component_mut::<Durability>(wall).unwrap().hitpoints = 10.0;
        let mut crew = crew_at(&station, v(0, 0));
        crew.actions.push_back(Action::move_to(v(1, 0)));
        crew.actions.push_back(Action::repair(wall));

        advance_front_action(&mut crew, &mut station, &config());
        assert_eq!(station.component::<Durability>(wall).unwrap().hitpoints, 10.0);
        assert_eq!(crew.actions.len(), 2);
    }

    #[test]
    fn test_crew_off_station_abandons() {
        let mut station = floor_strip(1);
        let mut crew = crew_at(&station, v(0, 0));
        crew.current_tile = None;
        crew.actions.push_back(Action::move_to(v(0, 0)));
        assert_eq!(
            advance_front_action(&mut crew, &mut station, &config()),
            Some(ActionStatus::Abandoned)
        );
    }
}
