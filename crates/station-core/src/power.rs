//! Power grids: connected wire networks and their per-tick balance.
//!
//! A grid owns a set of wire positions and, per position, the tile entities
//! whose consumer, producer or battery components are wired in. Entries are
//! plain `hecs::Entity` handles into the station world and are pruned when
//! the tile is gone. Sorted iteration caches are rebuilt when the grid's
//! version moves past the version they were built at.
//!
//! Each tick production is handed to consumers in priority order. Consumers
//! that cannot be served from production fall back to the batteries as one
//! aggregate pool, drained fullest first. Leftover production recharges the
//! batteries emptiest first and anything beyond that is lost.

use std::collections::{HashMap, HashSet, VecDeque};

use hecs::{Entity, World};
use serde::{Deserialize, Serialize};

use crate::components::{Battery, PowerConsumer, PowerPriority, PowerProducer, Vector2Int};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PowerGridId(pub u32);

/// How a wire position relates to an existing grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireConnectivity {
    NotConnectable = 0,
    AlreadyPresent = 1,
    Connectable = 2,
}

/// Aggregates from the last `update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerGridStats {
    pub total_production: f32,
    pub total_demand: f32,
    /// Production left over after consumers and battery recharge. Lost.
    pub remaining_production: f32,
    pub battery_charge: f32,
    pub battery_capacity: f32,
    pub active_consumers: usize,
    pub starved_consumers: usize,
}

type Members = HashMap<Vector2Int, Vec<Entity>>;

#[derive(Debug, Clone)]
pub struct PowerGrid {
    id: PowerGridId,
    wires: HashSet<Vector2Int>,
    consumers: Members,
    producers: Members,
    batteries: Members,
    version: u64,
    cache_version: Option<u64>,
    consumer_cache: Vec<Entity>,
    producer_cache: Vec<Entity>,
    battery_cache: Vec<Entity>,
    stats: PowerGridStats,
}

impl PowerGrid {
    pub fn new(id: PowerGridId) -> Self {
        Self {
            id,
            wires: HashSet::new(),
            consumers: HashMap::new(),
            producers: HashMap::new(),
            batteries: HashMap::new(),
            version: 0,
            cache_version: None,
            consumer_cache: Vec::new(),
            producer_cache: Vec::new(),
            battery_cache: Vec::new(),
            stats: PowerGridStats::default(),
        }
    }

    pub fn id(&self) -> PowerGridId {
        self.id
    }

    pub fn wires(&self) -> &HashSet<Vector2Int> {
        &self.wires
    }

    pub fn wire_count(&self) -> usize {
        self.wires.len()
    }

    pub fn contains_wire(&self, pos: Vector2Int) -> bool {
        self.wires.contains(&pos)
    }

    pub fn stats(&self) -> PowerGridStats {
        self.stats
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_dirty(&self) -> bool {
        self.cache_version != Some(self.version)
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    pub fn connectivity(&self, pos: Vector2Int) -> WireConnectivity {
        if self.wires.contains(&pos) {
            WireConnectivity::AlreadyPresent
        } else if pos
            .cardinal_neighbours()
            .iter()
            .any(|n| self.wires.contains(n))
        {
            WireConnectivity::Connectable
        } else {
            WireConnectivity::NotConnectable
        }
    }

    pub fn add_wire(&mut self, pos: Vector2Int) -> bool {
        let added = self.wires.insert(pos);
        if added {
            self.touch();
        }
        added
    }

    /// Remove a wire and everything attached at its position.
    pub fn remove_wire(&mut self, pos: Vector2Int) -> bool {
        if !self.wires.remove(&pos) {
            return false;
        }
        self.consumers.remove(&pos);
        self.producers.remove(&pos);
        self.batteries.remove(&pos);
        self.touch();
        true
    }

    /// Register the power components of `entity` at a wired position.
    /// Returns whether anything new was attached.
    pub fn attach(&mut self, world: &World, pos: Vector2Int, entity: Entity) -> bool {
        if !self.wires.contains(&pos) {
            return false;
        }
        let mut attached = false;
        if world.get::<&PowerConsumer>(entity).is_ok() {
            attached |= insert_member(&mut self.consumers, pos, entity);
        }
        if world.get::<&PowerProducer>(entity).is_ok() {
            attached |= insert_member(&mut self.producers, pos, entity);
        }
        if world.get::<&Battery>(entity).is_ok() {
            attached |= insert_member(&mut self.batteries, pos, entity);
        }
        if attached {
            self.touch();
        }
        attached
    }

    pub fn detach(&mut self, entity: Entity) -> bool {
        let mut removed = false;
        for members in [&mut self.consumers, &mut self.producers, &mut self.batteries] {
            for list in members.values_mut() {
                let before = list.len();
                list.retain(|e| *e != entity);
                removed |= list.len() != before;
            }
            members.retain(|_, list| !list.is_empty());
        }
        if removed {
            self.touch();
        }
        removed
    }

    pub fn has_member(&self, entity: Entity) -> bool {
        [&self.consumers, &self.producers, &self.batteries]
            .iter()
            .any(|m| m.values().any(|list| list.contains(&entity)))
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.values().map(Vec::len).sum()
    }

    pub fn producer_count(&self) -> usize {
        self.producers.values().map(Vec::len).sum()
    }

    pub fn battery_count(&self) -> usize {
        self.batteries.values().map(Vec::len).sum()
    }

    /// Move every wire and member of `other` into this grid.
    pub fn absorb(&mut self, other: PowerGrid) {
        self.wires.extend(other.wires);
        for (pos, list) in other.consumers {
            for e in list {
                insert_member(&mut self.consumers, pos, e);
            }
        }
        for (pos, list) in other.producers {
            for e in list {
                insert_member(&mut self.producers, pos, e);
            }
        }
        for (pos, list) in other.batteries {
            for e in list {
                insert_member(&mut self.batteries, pos, e);
            }
        }
        self.touch();
    }

    /// Whether the wires still form a single cardinal-connected network.
    pub fn is_connected(&self) -> bool {
        connected_components(&self.wires).len() <= 1
    }

    /// Break this grid into one grid per connected wire component.
    pub fn split(self, mut next_id: impl FnMut() -> PowerGridId) -> Vec<PowerGrid> {
        connected_components(&self.wires)
            .into_iter()
            .map(|component| {
                let mut grid = PowerGrid::new(next_id());
                grid.consumers = members_within(&self.consumers, &component);
                grid.producers = members_within(&self.producers, &component);
                grid.batteries = members_within(&self.batteries, &component);
                grid.wires = component;
                grid
            })
            .collect()
    }

    /// Prune dead entries and rebuild the sorted iteration caches.
    pub fn rebuild_caches(&mut self, world: &World) {
        prune(&mut self.consumers, |e| world.get::<&PowerConsumer>(e).is_ok());
        prune(&mut self.producers, |e| world.get::<&PowerProducer>(e).is_ok());
        prune(&mut self.batteries, |e| world.get::<&Battery>(e).is_ok());

        let mut consumers: Vec<(PowerPriority, f32, Vector2Int, Entity)> = Vec::new();
        for (&pos, list) in &self.consumers {
            for &entity in list {
                let Ok(mut consumer) = world.get::<&mut PowerConsumer>(entity) else {
                    continue;
                };
                if consumer.priority == PowerPriority::Offline {
                    consumer.active = false;
                    continue;
                }
                consumers.push((consumer.priority, consumer.consumption, pos, entity));
            }
        }
        consumers.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(b.1.total_cmp(&a.1))
                .then(a.2.cmp(&b.2))
                .then(a.3.id().cmp(&b.3.id()))
        });
        self.consumer_cache = consumers.into_iter().map(|c| c.3).collect();
        self.producer_cache = sorted_members(&self.producers);
        self.battery_cache = sorted_members(&self.batteries);
        self.cache_version = Some(self.version);
    }

    /// Balance production, consumption and storage for one tick.
    pub fn update(&mut self, world: &World, dt: f32) {
        if self.is_dirty() {
            self.rebuild_caches(world);
        }

        let mut batteries: Vec<(Entity, f32)> = self
            .battery_cache
            .iter()
            .filter_map(|&e| {
                let mut battery = world.get::<&mut Battery>(e).ok()?;
                battery.delta_charge = 0.0;
                Some((e, battery.fraction()))
            })
            .collect();
        batteries.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.id().cmp(&b.0.id())));

        let mut total_production = 0.0;
        for &e in &self.producer_cache {
            if let Ok(mut producer) = world.get::<&mut PowerProducer>(e) {
                producer.available_power = producer.production;
                total_production += producer.production;
            }
        }

        let mut remaining = total_production * dt;
        let mut total_demand = 0.0;
        let mut deferred: Vec<(Entity, f32)> = Vec::new();
        let mut active_consumers = 0;
        for &e in &self.consumer_cache {
            let Ok(mut consumer) = world.get::<&mut PowerConsumer>(e) else {
                continue;
            };
            if !consumer.powered_on {
                consumer.active = false;
                continue;
            }
            let demand = consumer.consumption * dt;
            total_demand += consumer.consumption;
            if remaining >= demand {
                remaining -= demand;
                consumer.active = true;
                active_consumers += 1;
            } else {
                deferred.push((e, demand));
            }
        }

        let available_charge: f32 = batteries
            .iter()
            .filter_map(|(e, _)| world.get::<&Battery>(*e).ok().map(|b| b.charge))
            .sum();
        let mut battery_draw = 0.0;
        let mut starved_consumers = 0;
        for &(e, demand) in &deferred {
            let Ok(mut consumer) = world.get::<&mut PowerConsumer>(e) else {
                continue;
            };
            consumer.active = battery_draw + demand <= available_charge;
            if consumer.active {
                battery_draw += demand;
                active_consumers += 1;
            } else {
                starved_consumers += 1;
            }
        }

        let mut left_to_drain = battery_draw;
        for (e, _) in &batteries {
            if left_to_drain <= 0.0 {
                break;
            }
            if let Ok(mut battery) = world.get::<&mut Battery>(*e) {
                let take = left_to_drain.min(battery.charge);
                battery.charge -= take;
                battery.delta_charge -= take;
                left_to_drain -= take;
            }
        }

        for (e, _) in batteries.iter().rev() {
            if remaining <= 0.0 {
                break;
            }
            if let Ok(mut battery) = world.get::<&mut Battery>(*e) {
                let add = remaining.min(battery.headroom());
                battery.charge += add;
                battery.delta_charge += add;
                remaining -= add;
            }
        }

        let (battery_charge, battery_capacity) = batteries
            .iter()
            .filter_map(|(e, _)| world.get::<&Battery>(*e).ok().map(|b| (b.charge, b.max_charge)))
            .fold((0.0, 0.0), |acc, (c, m)| (acc.0 + c, acc.1 + m));

        self.stats = PowerGridStats {
            total_production,
            total_demand,
            remaining_production: remaining,
            battery_charge,
            battery_capacity,
            active_consumers,
            starved_consumers,
        };
    }

    /// Consumers in service order, as of the last cache rebuild.
    pub fn consumer_order(&self) -> &[Entity] {
        &self.consumer_cache
    }
}

fn insert_member(members: &mut Members, pos: Vector2Int, entity: Entity) -> bool {
    let list = members.entry(pos).or_default();
    if list.contains(&entity) {
        false
    } else {
        list.push(entity);
        true
    }
}

fn prune(members: &mut Members, alive: impl Fn(Entity) -> bool) {
    for list in members.values_mut() {
        list.retain(|&e| alive(e));
    }
    members.retain(|_, list| !list.is_empty());
}

fn sorted_members(members: &Members) -> Vec<Entity> {
    let mut entries: Vec<(Vector2Int, Entity)> = members
        .iter()
        .flat_map(|(&pos, list)| list.iter().map(move |&e| (pos, e)))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.id().cmp(&b.1.id())));
    entries.into_iter().map(|(_, e)| e).collect()
}

fn members_within(members: &Members, wires: &HashSet<Vector2Int>) -> Members {
    members
        .iter()
        .filter(|(pos, _)| wires.contains(pos))
        .map(|(&pos, list)| (pos, list.clone()))
        .collect()
}

/// Partition wire positions into cardinal-connected components, found by
/// breadth-first search. Components are ordered by their smallest position.
pub fn connected_components(wires: &HashSet<Vector2Int>) -> Vec<HashSet<Vector2Int>> {
    let mut seeds: Vec<Vector2Int> = wires.iter().copied().collect();
    seeds.sort();

    let mut visited: HashSet<Vector2Int> = HashSet::new();
    let mut components = Vec::new();
    for seed in seeds {
        if visited.contains(&seed) {
            continue;
        }
        let mut component = HashSet::new();
        let mut queue = VecDeque::from([seed]);
        visited.insert(seed);
        while let Some(pos) = queue.pop_front() {
            component.insert(pos);
            for next in pos.cardinal_neighbours() {
                if wires.contains(&next) && visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        components.push(component);
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wired_grid(cells: &[Vector2Int]) -> PowerGrid {
        let mut grid = PowerGrid::new(PowerGridId(0));
        for &c in cells {
            grid.add_wire(c);
        }
        grid
    }

    fn spawn_attached<T: hecs::Component>(
        world: &mut World,
        grid: &mut PowerGrid,
        pos: Vector2Int,
        component: T,
    ) -> Entity {
        let e = world.spawn((component,));
        assert!(grid.attach(world, pos, e));
        e
    }

    #[test]
    fn test_conservation_with_surplus() {
        let mut world = World::new();
        let cells = [Vector2Int::new(0, 0), Vector2Int::new(1, 0), Vector2Int::new(2, 0)];
        let mut grid = wired_grid(&cells);
        spawn_attached(&mut world, &mut grid, cells[0], PowerProducer::new(10.0));
        let a = spawn_attached(&mut world, &mut grid, cells[1], PowerConsumer::new(3.0, PowerPriority::Normal));
        let b = spawn_attached(&mut world, &mut grid, cells[2], PowerConsumer::new(4.0, PowerPriority::Low));

        let dt = 0.5;
        grid.update(&world, dt);

        assert!(world.get::<&PowerConsumer>(a).unwrap().active);
        assert!(world.get::<&PowerConsumer>(b).unwrap().active);
        let expected = (10.0 - 7.0) * dt;
        assert!((grid.stats().remaining_production - expected).abs() < 1e-5);
    }

    #[test]
    fn test_priority_wins_under_shortage() {
        let mut world = World::new();
        let cells = [Vector2Int::new(0, 0), Vector2Int::new(1, 0), Vector2Int::new(2, 0), Vector2Int::new(3, 0)];
        let mut grid = wired_grid(&cells);
        spawn_attached(&mut world, &mut grid, cells[0], PowerProducer::new(12.0));
        let low = spawn_attached(&mut world, &mut grid, cells[1], PowerConsumer::new(10.0, PowerPriority::Low));
        let critical = spawn_attached(&mut world, &mut grid, cells[2], PowerConsumer::new(10.0, PowerPriority::Critical));
        spawn_attached(&mut world, &mut grid, cells[3], Battery::new(5.0, 100.0));

        grid.update(&world, 1.0);

        assert!(world.get::<&PowerConsumer>(critical).unwrap().active);
        assert!(!world.get::<&PowerConsumer>(low).unwrap().active);
        assert_eq!(grid.consumer_order()[0], critical);
    }

    #[test]
    fn test_tie_break_prefers_larger_consumer() {
        let mut world = World::new();
        let cells = [Vector2Int::new(0, 0), Vector2Int::new(1, 0)];
        let mut grid = wired_grid(&cells);
        let small = spawn_attached(&mut world, &mut grid, cells[0], PowerConsumer::new(1.0, PowerPriority::Normal));
        let big = spawn_attached(&mut world, &mut grid, cells[1], PowerConsumer::new(5.0, PowerPriority::Normal));
        grid.rebuild_caches(&world);
        assert_eq!(grid.consumer_order(), &[big, small]);
    }

    #[test]
    fn test_deferred_consumers_drain_batteries() {
        let mut world = World::new();
        let cells = [Vector2Int::new(0, 0), Vector2Int::new(1, 0), Vector2Int::new(2, 0)];
        let mut grid = wired_grid(&cells);
        let consumer = spawn_attached(&mut world, &mut grid, cells[0], PowerConsumer::new(6.0, PowerPriority::Normal));
        let full = spawn_attached(&mut world, &mut grid, cells[1], Battery::new(4.0, 4.0));
        let half = spawn_attached(&mut world, &mut grid, cells[2], Battery::new(5.0, 10.0));

        grid.update(&world, 1.0);

        assert!(world.get::<&PowerConsumer>(consumer).unwrap().active);
        // Fullest first: the full battery empties, the rest comes from the other.
        assert_eq!(world.get::<&Battery>(full).unwrap().charge, 0.0);
        assert!((world.get::<&Battery>(half).unwrap().charge - 3.0).abs() < 1e-5);
        assert!((world.get::<&Battery>(half).unwrap().delta_charge + 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_battery_round_trip_loses_excess() {
        let mut world = World::new();
        let cells = [Vector2Int::new(0, 0), Vector2Int::new(1, 0)];
        let mut grid = wired_grid(&cells);
        spawn_attached(&mut world, &mut grid, cells[0], PowerProducer::new(1000.0));
        let battery = spawn_attached(&mut world, &mut grid, cells[1], Battery::new(50.0, 100.0));

        grid.update(&world, 1.0);

        let b = world.get::<&Battery>(battery).unwrap();
        assert_eq!(b.charge, b.max_charge);
        assert!((grid.stats().remaining_production - 950.0).abs() < 1e-3);
    }

    #[test]
    fn test_recharge_emptiest_first() {
        let mut world = World::new();
        let cells = [Vector2Int::new(0, 0), Vector2Int::new(1, 0), Vector2Int::new(2, 0)];
        let mut grid = wired_grid(&cells);
        spawn_attached(&mut world, &mut grid, cells[0], PowerProducer::new(3.0));
        let empty = spawn_attached(&mut world, &mut grid, cells[1], Battery::new(0.0, 10.0));
        let mostly = spawn_attached(&mut world, &mut grid, cells[2], Battery::new(9.0, 10.0));

        grid.update(&world, 1.0);

        assert!((world.get::<&Battery>(empty).unwrap().charge - 3.0).abs() < 1e-5);
        assert!((world.get::<&Battery>(mostly).unwrap().charge - 9.0).abs() < 1e-5);
    }

    #[test]
    fn test_offline_and_switched_off_consumers() {
        let mut world = World::new();
        let cells = [Vector2Int::new(0, 0), Vector2Int::new(1, 0), Vector2Int::new(2, 0)];
        let mut grid = wired_grid(&cells);
        spawn_attached(&mut world, &mut grid, cells[0], PowerProducer::new(100.0));
        let offline = spawn_attached(&mut world, &mut grid, cells[1], PowerConsumer::new(1.0, PowerPriority::Offline));
        let switched = spawn_attached(&mut world, &mut grid, cells[2], PowerConsumer::new(1.0, PowerPriority::Normal));
        world.get::<&mut PowerConsumer>(switched).unwrap().powered_on = false;

        grid.update(&world, 1.0);

        assert!(!grid.consumer_order().contains(&offline));
        assert!(!world.get::<&PowerConsumer>(offline).unwrap().active);
        assert!(!world.get::<&PowerConsumer>(switched).unwrap().active);
    }

    #[test]
    fn test_version_drives_rebuild() {
        let mut world = World::new();
        let mut grid = wired_grid(&[Vector2Int::ZERO]);
        assert!(grid.is_dirty());
        grid.update(&world, 1.0);
        assert!(!grid.is_dirty());

        let e = world.spawn((PowerProducer::new(1.0),));
        grid.attach(&world, Vector2Int::ZERO, e);
        assert!(grid.is_dirty());
        grid.update(&world, 1.0);
        assert_eq!(grid.stats().total_production, 1.0);
    }

    #[test]
    fn test_despawned_members_are_pruned() {
        let mut world = World::new();
        let mut grid = wired_grid(&[Vector2Int::ZERO]);
        let e = spawn_attached(&mut world, &mut grid, Vector2Int::ZERO, PowerProducer::new(5.0));
        grid.update(&world, 1.0);
        world.despawn(e).unwrap();

        // Force a rebuild; the stale handle must disappear.
        grid.add_wire(Vector2Int::new(1, 0));
        grid.update(&world, 1.0);
        assert_eq!(grid.producer_count(), 0);
        assert_eq!(grid.stats().total_production, 0.0);
    }

    #[test]
    fn test_connectivity() {
        let grid = wired_grid(&[Vector2Int::new(0, 0)]);
        assert_eq!(grid.connectivity(Vector2Int::new(0, 0)), WireConnectivity::AlreadyPresent);
        assert_eq!(grid.connectivity(Vector2Int::new(1, 0)), WireConnectivity::Connectable);
        assert_eq!(grid.connectivity(Vector2Int::new(1, 1)), WireConnectivity::NotConnectable);
    }

    #[test]
    fn test_split_into_components() {
        let mut world = World::new();
        let left = [Vector2Int::new(0, 0), Vector2Int::new(1, 0)];
        let right = [Vector2Int::new(3, 0), Vector2Int::new(4, 0)];
        let mut grid = wired_grid(&left);
        for &c in &right {
            grid.add_wire(c);
        }
        let producer = spawn_attached(&mut world, &mut grid, right[1], PowerProducer::new(1.0));
        assert!(!grid.is_connected());

        let mut next = 10;
        let parts = grid.split(|| {
            next += 1;
            PowerGridId(next)
        });
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].wires(), &left.iter().copied().collect());
        assert_eq!(parts[1].wires(), &right.iter().copied().collect());
        assert!(parts[1].has_member(producer));
        assert!(!parts[0].has_member(producer));
    }
}
