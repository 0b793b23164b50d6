//! Station Headless Simulation Harness
//!
//! Builds the demo station and validates the simulation core end to end,
//! first ticking it synchronously, then on the scheduler thread.
//! Runs entirely in-process without rendering or input devices.
//!
//! Usage:
//!   cargo run -p station-simtest
//!   cargo run -p station-simtest -- --verbose
//!   RUST_LOG=debug cargo run -p station-simtest

use std::sync::Arc;
use std::time::Duration;

use station_core::engine::PendingAction;
use station_core::generation::{generate_demo_station, DemoConfig, DemoLayout};
use station_core::pathfinding::{a_star, euclidean};
use station_core::prelude::*;

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let verbose = std::env::args().any(|a| a == "--verbose");
    println!("=== Station Simulation Harness ===\n");

    let mut results = Vec::new();

    // 1. Data files
    results.extend(validate_data(verbose));

    // 2. Pathfinding across the demo station
    results.extend(validate_pathfinding(verbose));

    // 3. Power and oxygen
    results.extend(validate_power(verbose));

    // 4. Crew actions
    results.extend(validate_crew_actions(verbose));

    // 5. Scheduler thread
    results.extend(validate_scheduler(verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        log::error!("{} harness checks failed", failed);
        std::process::exit(1);
    }
}

fn demo() -> Result<(Simulation, DemoLayout), StationError> {
    let mut sim = Simulation::new(GameConfig::builtin(), DefinitionCatalog::builtin());
    let layout = generate_demo_station(&mut sim, &DemoConfig::default())?;
    Ok((sim, layout))
}

fn run_until<F>(sim: &mut Simulation, max_ticks: u32, mut done: F) -> u32
where
    F: FnMut(&Simulation) -> bool,
{
    let mut ticks = 0;
    while ticks < max_ticks && !done(sim) {
        sim.tick(Vec::new());
        ticks += 1;
    }
    ticks
}

fn total_oxygen(station: &Station) -> f32 {
    station.positions().filter_map(|p| station.oxygen_at(p)).sum()
}

fn fail(name: &str, detail: impl Into<String>) -> TestResult {
    TestResult {
        name: name.into(),
        passed: false,
        detail: detail.into(),
    }
}

// ── 1. Data files ───────────────────────────────────────────────────────

fn validate_data(verbose: bool) -> Vec<TestResult> {
    println!("--- Data Files ---");
    let mut results = Vec::new();

    let catalog = DefinitionCatalog::builtin();
    results.push(TestResult {
        name: "catalog_tiles".into(),
        passed: catalog.tile_count() >= 10,
        detail: format!("{} tile definitions", catalog.tile_count()),
    });
    results.push(TestResult {
        name: "catalog_effects".into(),
        passed: catalog.effect_of_kind(EffectKind::Fire).is_some()
            && catalog.effect_of_kind(EffectKind::Foam).is_some(),
        detail: format!("{} effect definitions", catalog.effect_count()),
    });

    let config = GameConfig::builtin();
    results.push(TestResult {
        name: "config_valid".into(),
        passed: config.validate().is_ok(),
        detail: format!("tick {:?}, move {}/s", config.tick_duration(), config.move_speed),
    });

    if verbose {
        let ids: Vec<&str> = catalog.tile_ids().collect();
        println!("  tiles: {}", ids.join(", "));
    }
    results
}

// ── 2. Pathfinding ──────────────────────────────────────────────────────

fn validate_pathfinding(verbose: bool) -> Vec<TestResult> {
    println!("--- Pathfinding ---");
    let mut results = Vec::new();
    let (sim, layout) = match demo() {
        Ok(demo) => demo,
        Err(err) => return vec![fail("demo_generation", err.to_string())],
    };
    let station = &sim.station;
    let start = Vector2Int::new(1, 5);
    let pathable = |p: Vector2Int| station.is_pathable(p);

    let through_door = a_star(start, Vector2Int::new(10, 4), euclidean, pathable);
    results.push(TestResult {
        name: "path_through_door".into(),
        passed: through_door.contains(&layout.door),
        detail: format!("{} steps via {}", through_door.len(), layout.door),
    });

    let into_wall = a_star(start, Vector2Int::new(0, 0), euclidean, pathable);
    results.push(TestResult {
        name: "path_into_wall".into(),
        passed: into_wall.is_empty(),
        detail: "wall target → empty path".into(),
    });

    let same = a_star(start, start, euclidean, pathable);
    results.push(TestResult {
        name: "path_same_cell".into(),
        passed: same.is_empty(),
        detail: "start == end → empty path".into(),
    });

    if verbose {
        let cells: Vec<String> = through_door.iter().map(|c| c.to_string()).collect();
        println!("  route: {}", cells.join(" → "));
    }
    results
}

// ── 3. Power and oxygen ─────────────────────────────────────────────────

fn validate_power(verbose: bool) -> Vec<TestResult> {
    println!("--- Power & Oxygen ---");
    let mut results = Vec::new();
    let (mut sim, layout) = match demo() {
        Ok(demo) => demo,
        Err(err) => return vec![fail("demo_generation", err.to_string())],
    };

    results.push(TestResult {
        name: "grids_separate".into(),
        passed: sim.station.power_grids().len() == 2,
        detail: format!("{} grids", sim.station.power_grids().len()),
    });

    let oxygen_before = total_oxygen(&sim.station);
    run_until(&mut sim, 20, |_| false);

    let life_support = sim
        .station
        .component::<PowerConsumer>(layout.oxygen_generator)
        .map(|c| c.active)
        .unwrap_or(false);
    results.push(TestResult {
        name: "life_support_powered".into(),
        passed: life_support,
        detail: "solar grid serves the critical consumer".into(),
    });

    let charge = sim
        .station
        .component::<Battery>(layout.battery)
        .map(|b| (b.charge, b.max_charge))
        .unwrap_or((0.0, 0.0));
    results.push(TestResult {
        name: "battery_charging".into(),
        passed: charge.0 > 250.0 && charge.0 <= charge.1,
        detail: format!("{:.1}/{:.1}", charge.0, charge.1),
    });

    let oxygen_after = total_oxygen(&sim.station);
    results.push(TestResult {
        name: "oxygen_produced".into(),
        passed: oxygen_after > oxygen_before,
        detail: format!("{:.1} → {:.1} total oxygen", oxygen_before, oxygen_after),
    });

    if verbose {
        for grid in sim.station.power_grids() {
            let stats = grid.stats();
            println!(
                "  grid {:?}: {} wires, produce {:.1}, demand {:.1}, battery {:.1}/{:.1}",
                grid.id(),
                grid.wire_count(),
                stats.total_production,
                stats.total_demand,
                stats.battery_charge,
                stats.battery_capacity
            );
        }
    }
    results
}

// ── 4. Crew actions ─────────────────────────────────────────────────────

fn validate_crew_actions(verbose: bool) -> Vec<TestResult> {
    println!("--- Crew Actions ---");
    let mut results = Vec::new();
    let (mut sim, layout) = match demo() {
        Ok(demo) => demo,
        Err(err) => return vec![fail("demo_generation", err.to_string())],
    };
    let walker = layout.crew[0];
    let firefighter = layout.crew[1];
    let builder = layout.crew[2];

    let fire = Vector2Int::new(5, 3);
    let site = Vector2Int::new(4, 4);
    let target = Vector2Int::new(10, 4);
    let _ = sim.station.add_effect("fire", fire);
    let task = sim.station.request_planned_task(site, "crate", true);
    results.push(TestResult {
        name: "task_requested".into(),
        passed: task.is_ok(),
        detail: format!("crate at {} → {:?}", site, task.map_err(|e| e.to_string())),
    });

    sim.tick(vec![
        PendingAction {
            crew: walker,
            action: Action::move_to(target),
        },
        PendingAction {
            crew: firefighter,
            action: Action::extinguish(fire),
        },
        PendingAction {
            crew: builder,
            action: Action::move_to(site),
        },
        PendingAction {
            crew: builder,
            action: Action::construct(site),
        },
    ]);
    let ticks = run_until(&mut sim, 2_000, |s| s.crews.values().all(|c| c.is_idle()));

    let walker_cell = sim.crew(walker).map(|c| c.cell());
    results.push(TestResult {
        name: "walk_through_door".into(),
        passed: walker_cell == Some(target),
        detail: format!("ended at {:?}", walker_cell),
    });
    results.push(TestResult {
        name: "fire_extinguished".into(),
        passed: sim.station.effect_at(fire, EffectKind::Fire).is_none()
            && sim.station.effect_at(fire, EffectKind::Foam).is_some(),
        detail: "fire replaced by foam".into(),
    });
    results.push(TestResult {
        name: "crate_built".into(),
        passed: sim.station.tile_of_def_at(site, "crate").is_some(),
        detail: format!("steel left: {}", sim.station.resource("steel")),
    });
    results.push(TestResult {
        name: "crew_alive".into(),
        passed: sim.crews.values().all(|c| c.alive),
        detail: format!("all idle after {} ticks", ticks),
    });

    if verbose {
        for crew in sim.crews.values() {
            println!(
                "  {} {}: health {:.1}, oxygen {:.1} at {}",
                crew.id,
                crew.name,
                crew.health,
                crew.oxygen,
                crew.cell()
            );
        }
    }
    results
}

// ── 5. Scheduler thread ─────────────────────────────────────────────────

fn validate_scheduler(verbose: bool) -> Vec<TestResult> {
    println!("--- Scheduler ---");
    let mut results = Vec::new();
    let (sim, layout) = match demo() {
        Ok(demo) => demo,
        Err(err) => return vec![fail("demo_generation", err.to_string())],
    };
    let mut server = GameServer::new(sim, GameMode::Local);
    if let Err(err) = server.start() {
        return vec![fail("scheduler_start", err.to_string())];
    }
    let wait = Duration::from_secs(2);

    let ticking = server.wait_for_tick(wait) && server.wait_for_tick(wait);
    results.push(TestResult {
        name: "scheduler_ticks".into(),
        passed: ticking,
        detail: format!("tick {}", server.tick_count()),
    });

    server.send_player_action(layout.crew[0], Action::move_to(Vector2Int::new(5, 5)));
    server.wait_for_tick(wait);
    server.wait_for_tick(wait);
    let queued = server.with_snapshot(|s| s.crews.get(&layout.crew[0]).map(|c| c.actions.len()));
    results.push(TestResult {
        name: "player_action_drained".into(),
        passed: queued.is_some(),
        detail: format!("queue after drain: {:?}", queued),
    });

    server.set_game_paused(true);
    std::thread::sleep(Duration::from_millis(30));
    let frozen = server.tick_count();
    std::thread::sleep(Duration::from_millis(150));
    let still = server.tick_count();
    results.push(TestResult {
        name: "pause_freezes".into(),
        passed: frozen == still,
        detail: format!("{} → {}", frozen, still),
    });

    server.set_game_paused(false);
    let resumed = server.wait_for_tick(wait);
    results.push(TestResult {
        name: "resume_ticks".into(),
        passed: resumed,
        detail: format!("tick {}", server.tick_count()),
    });

    server.clear_crew_actions(layout.crew[0]);
    server.stop();
    let crews = server.crew_snapshot();
    results.push(TestResult {
        name: "clear_actions".into(),
        passed: crews.get(&layout.crew[0]).is_some_and(|c| c.is_idle()),
        detail: format!("{} crew in snapshot", crews.len()),
    });

    let hosted = GameServer::new(
        Simulation::new(Arc::new(GameConfig::default()), DefinitionCatalog::builtin()),
        GameMode::Hosted,
    );
    results.push(TestResult {
        name: "hosted_pause_ignored".into(),
        passed: !hosted.set_game_paused(true) && !hosted.is_paused(),
        detail: "pause is local-only".into(),
    });

    if verbose {
        server.with_snapshot(|s| {
            println!(
                "  tick {}, {:?} into next, {} tiles",
                s.tick,
                s.time_since_tick,
                s.station.tile_count()
            );
        });
    }
    results
}
