//! Game server: the thread-safe surface between players and the simulation.
//!
//! Player intents arrive from any thread. Actions are queued behind the
//! narrow pending lock and drained at the start of the next tick; station
//! edits and reads take the coarse simulation lock.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

use crate::actions::{clear_actions, Action};
use crate::components::{Crew, CrewId, Vector2Int};
use crate::engine::{PendingAction, Simulation};
use crate::scheduler::{self, lock, Shared};
use crate::station::{PlannedTask, Station, StationError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("scheduler is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Station(#[from] StationError),
}

/// Pausing is only honoured for a local single-player game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameMode {
    #[default]
    Local,
    Hosted,
}

/// Read-only view of the simulation between two ticks.
pub struct RenderSnapshot<'a> {
    pub crews: &'a BTreeMap<CrewId, Crew>,
    pub station: &'a Station,
    /// Time accumulated toward the next tick, for interpolation.
    pub time_since_tick: Duration,
    pub tick: u64,
}

pub struct GameServer {
    shared: Arc<Shared>,
    mode: GameMode,
    handle: Option<JoinHandle<()>>,
}

impl GameServer {
    pub fn new(simulation: Simulation, mode: GameMode) -> Self {
        Self {
            shared: Arc::new(Shared::new(simulation)),
            mode,
            handle: None,
        }
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    /// Start the fixed-step scheduler thread.
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.handle.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        let sleep = lock(&self.shared.state).simulation.config().scheduler_sleep();
        self.shared.running.store(true, Ordering::SeqCst);
        match scheduler::spawn(Arc::clone(&self.shared), sleep) {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::SeqCst);
                Err(ServerError::Spawn(err))
            }
        }
    }

    /// Stop and join the scheduler thread. No-op if not running.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("scheduler thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Queue an action for a crew member. Applied at the next tick.
    pub fn send_player_action(&self, crew: CrewId, action: Action) {
        lock(&self.shared.pending).push(PendingAction { crew, action });
    }

    pub fn request_planned_task(
        &self,
        position: Vector2Int,
        tile_id: &str,
        is_build: bool,
    ) -> Result<(), ServerError> {
        let mut state = lock(&self.shared.state);
        state
            .simulation
            .station
            .request_planned_task(position, tile_id, is_build)
            .map_err(|err| {
                log::warn!("rejected planned task {} at {}: {}", tile_id, position, err);
                ServerError::from(err)
            })
    }

    pub fn request_cancel_planned_task(&self, position: Vector2Int) -> Result<PlannedTask, ServerError> {
        let mut state = lock(&self.shared.state);
        Ok(state.simulation.station.cancel_planned_task(position)?)
    }

    /// Returns whether the request took effect.
    pub fn set_game_paused(&self, paused: bool) -> bool {
        if self.mode != GameMode::Local {
            log::warn!("pause request ignored in {:?} mode", self.mode);
            return false;
        }
        let was = self.shared.paused.swap(paused, Ordering::SeqCst);
        if was != paused {
            log::info!("game {}", if paused { "paused" } else { "resumed" });
        }
        true
    }

    /// Returns the pause state after the call.
    pub fn toggle_game_paused(&self) -> bool {
        let paused = !self.is_paused();
        self.set_game_paused(paused);
        self.is_paused()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Empty a crew member's queue and drop its pending submissions.
    pub fn clear_crew_actions(&self, crew: CrewId) -> bool {
        let mut state = lock(&self.shared.state);
        lock(&self.shared.pending).retain(|p| p.crew != crew);
        let simulation = &mut state.simulation;
        match simulation.crews.get_mut(&crew) {
            Some(crew) => {
                clear_actions(crew, &mut simulation.station);
                true
            }
            None => false,
        }
    }

    /// Run one tick on the calling thread.
    pub fn step(&self) {
        let mut state = lock(&self.shared.state);
        scheduler::run_tick(&self.shared, &mut state);
    }

    /// Block until the next tick completes. Returns `false` on timeout.
    pub fn wait_for_tick(&self, timeout: Duration) -> bool {
        let state = lock(&self.shared.state);
        let start = state.simulation.tick_count();
        let (_state, result) = self
            .shared
            .ticked
            .wait_timeout_while(state, timeout, |s| s.simulation.tick_count() == start)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        !result.timed_out()
    }

    pub fn tick_count(&self) -> u64 {
        lock(&self.shared.state).simulation.tick_count()
    }

    /// Read a consistent view under the simulation lock.
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&RenderSnapshot<'_>) -> R) -> R {
        let state = lock(&self.shared.state);
        let snapshot = RenderSnapshot {
            crews: &state.simulation.crews,
            station: &state.simulation.station,
            time_since_tick: state.clock.time_since_tick(),
            tick: state.simulation.tick_count(),
        };
        f(&snapshot)
    }

    /// Owned copy of every crew member.
    pub fn crew_snapshot(&self) -> BTreeMap<CrewId, Crew> {
        lock(&self.shared.state).simulation.crews.clone()
    }

    /// Edit the simulation between ticks.
    pub fn with_simulation_mut<R>(&self, f: impl FnOnce(&mut Simulation) -> R) -> R {
        let mut state = lock(&self.shared.state);
        f(&mut state.simulation)
    }
}

impl Drop for GameServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Vector2;
    use crate::config::GameConfig;
    use crate::defs::DefinitionCatalog;

    fn server(mode: GameMode) -> (GameServer, CrewId) {
        let mut sim = Simulation::new(Arc::new(GameConfig::default()), DefinitionCatalog::builtin());
        for x in 0..5 {
            sim.station.create_tile("floor", Vector2Int::new(x, 0), None).unwrap();
        }
        let id = sim.add_crew("Nakamura", Vector2::new(0.0, 0.0));
        (GameServer::new(sim, mode), id)
    }

    #[test]
    fn test_pending_actions_apply_on_step() {
        let (server, id) = server(GameMode::Local);
        server.send_player_action(id, Action::move_to(Vector2Int::new(4, 0)));
        assert!(server.crew_snapshot()[&id].is_idle());
        server.step();
        assert_eq!(server.crew_snapshot()[&id].actions.len(), 1);
        assert_eq!(server.tick_count(), 1);
    }

    #[test]
    fn test_pause_only_in_local_mode() {
        let (local, _) = server(GameMode::Local);
        assert!(local.set_game_paused(true));
        assert!(local.is_paused());
        assert!(!local.toggle_game_paused());

        let (hosted, _) = server(GameMode::Hosted);
        assert!(!hosted.set_game_paused(true));
        assert!(!hosted.toggle_game_paused());
        assert!(!hosted.is_paused());
    }

    #[test]
    fn test_clear_crew_actions_drops_pending() {
        let (server, id) = server(GameMode::Local);
        server.send_player_action(id, Action::move_to(Vector2Int::new(4, 0)));
        server.step();
        server.send_player_action(id, Action::move_to(Vector2Int::new(2, 0)));

        assert!(server.clear_crew_actions(id));
        server.step();
        assert!(server.crew_snapshot()[&id].is_idle());
        assert!(!server.clear_crew_actions(CrewId(42)));
    }

    #[test]
    fn test_rejected_task_is_reported() {
        let (server, _) = server(GameMode::Local);
        let err = server
            .request_planned_task(Vector2Int::new(1, 0), "wall", true)
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Station(StationError::InsufficientResources { .. })
        ));
        assert!(server.request_cancel_planned_task(Vector2Int::new(1, 0)).is_err());
    }

    #[test]
    fn test_snapshot_reads_consistent_state() {
        let (server, id) = server(GameMode::Local);
        server.step();
        let (tick, crews) = server.with_snapshot(|s| (s.tick, s.crews.len()));
        assert_eq!(tick, 1);
        assert_eq!(crews, 1);
        assert!(server.with_snapshot(|s| s.crews.contains_key(&id)));
    }

    #[test]
    fn test_start_twice_fails() {
        let (mut server, _) = server(GameMode::Local);
        server.start().unwrap();
        assert!(matches!(server.start(), Err(ServerError::AlreadyRunning)));
        assert!(server.wait_for_tick(Duration::from_secs(5)));
        server.stop();
        assert!(!server.is_running());
    }
}
