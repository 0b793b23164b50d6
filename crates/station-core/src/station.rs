//! The station: root of ownership for every tile, effect, grid and task.
//!
//! Tiles are entities in a `hecs::World` owned by the station. The spatial
//! index maps each cell to its tiles ordered by ascending height bits, and
//! at most one tile may claim a given height bit of a cell. Power grids,
//! rooms and planned tasks refer to tiles by `Entity`, so every lookup
//! checks that the tile still exists.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use hecs::{Entity, EntityBuilder, World};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::*;
use crate::config::GameConfig;
use crate::defs::{CatalogError, DefinitionCatalog, EffectKind, TileDef};
use crate::power::{PowerGrid, PowerGridId, WireConnectivity};
use crate::systems;

#[derive(Debug, Error)]
pub enum StationError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("{def_id} overlaps an existing tile at {position}")]
    Overlap { def_id: String, position: Vector2Int },
    #[error("a task is already planned at {0}")]
    TaskAlreadyPlanned(Vector2Int),
    #[error("no task planned at {0}")]
    NoTask(Vector2Int),
    #[error("not enough {resource}: need {needed}, have {available}")]
    InsufficientResources {
        resource: String,
        needed: u32,
        available: u32,
    },
    #[error("no {def_id} tile at {position} to deconstruct")]
    NothingToDeconstruct { def_id: String, position: Vector2Int },
    #[error("unknown room {0:?}")]
    UnknownRoom(RoomId),
}

/// Environmental hazard or state tied to a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub def_id: String,
    pub kind: EffectKind,
    pub position: Vector2Int,
    /// Intensity in [0, 1].
    pub size: f32,
}

/// A queued build or deconstruct instruction awaiting crew labour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTask {
    pub position: Vector2Int,
    pub tile_id: String,
    pub is_build: bool,
    /// Fraction of work done, in [0, 1].
    pub progress: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskProgress {
    InProgress(f32),
    Completed,
}

#[derive(Debug, Clone, Default)]
pub struct Room {
    pub name: String,
    pub tiles: HashSet<Entity>,
}

pub struct Station {
    catalog: Arc<DefinitionCatalog>,
    pub(crate) world: World,
    tiles: HashMap<Vector2Int, Vec<Entity>>,
    pub(crate) effects: Vec<Effect>,
    pub(crate) power_grids: Vec<PowerGrid>,
    planned_tasks: Vec<PlannedTask>,
    resources: BTreeMap<String, u32>,
    rooms: BTreeMap<RoomId, Room>,
    pub(crate) rng: StdRng,
    next_grid_id: u32,
    next_room_id: u32,
}

impl Station {
    pub fn new(catalog: Arc<DefinitionCatalog>, seed: u64) -> Self {
        Self {
            catalog,
            world: World::new(),
            tiles: HashMap::new(),
            effects: Vec::new(),
            power_grids: Vec::new(),
            planned_tasks: Vec::new(),
            resources: BTreeMap::new(),
            rooms: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
            next_grid_id: 0,
            next_room_id: 0,
        }
    }

    pub fn catalog(&self) -> &Arc<DefinitionCatalog> {
        &self.catalog
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    // ── Tiles ───────────────────────────────────────────────────────────

    /// Instantiate a tile from its definition at `position`.
    pub fn create_tile(
        &mut self,
        def_id: &str,
        position: Vector2Int,
        room: Option<RoomId>,
    ) -> Result<Entity, StationError> {
        let catalog = Arc::clone(&self.catalog);
        let def = catalog.tile(def_id)?;
        if let Some(room) = room {
            if !self.rooms.contains_key(&room) {
                return Err(StationError::UnknownRoom(room));
            }
        }
        if self.occupied_height(position).intersects(def.height) {
            return Err(StationError::Overlap {
                def_id: def_id.to_string(),
                position,
            });
        }

        let entity = self.world.spawn(build_tile(def, position, room).build());

        let world = &self.world;
        let list = self.tiles.entry(position).or_default();
        let index = list
            .iter()
            .position(|&e| height_bits(world, e) > def.height.bits())
            .unwrap_or(list.len());
        list.insert(index, entity);

        if let Some(room) = room.and_then(|r| self.rooms.get_mut(&r)) {
            room.tiles.insert(entity);
        }

        if def.has(ComponentKind::PowerConnector) {
            self.connect_peers(entity, position);
            self.add_power_wire(position);
        }
        if def.has_power() {
            self.attach_power_at(position);
        }
        self.refresh_sprites_around(position);

        log::debug!("created {} at {}", def_id, position);
        Ok(entity)
    }

    /// Remove a tile and everything that refers to it.
    pub fn delete_tile(&mut self, entity: Entity) -> bool {
        let Some(info) = self.tile_info(entity) else {
            return false;
        };
        let position = info.position;

        let peers = self
            .world
            .get::<&PowerConnector>(entity)
            .map(|c| c.connections.clone())
            .ok();
        let had_connector = peers.is_some();
        for peer in peers.unwrap_or_default() {
            if let Ok(mut connector) = self.world.get::<&mut PowerConnector>(peer) {
                connector.disconnect(entity);
            }
        }
        for grid in &mut self.power_grids {
            grid.detach(entity);
        }

        if let Some(list) = self.tiles.get_mut(&position) {
            list.retain(|&e| e != entity);
            if list.is_empty() {
                self.tiles.remove(&position);
            }
        }
        if let Some(room) = info.room.and_then(|r| self.rooms.get_mut(&r)) {
            room.tiles.remove(&entity);
        }
        if self.world.despawn(entity).is_err() {
            log::warn!("tile {:?} despawned twice", entity);
        }

        if had_connector && !self.has_connector_at(position) {
            self.remove_power_wire(position);
        }
        self.refresh_sprites_around(position);

        log::debug!("deleted {} at {}", info.def_id, position);
        true
    }

    pub fn tiles_at(&self, position: Vector2Int) -> &[Entity] {
        self.tiles.get(&position).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tile occupying any of the given height bits at `position`.
    pub fn tile_at(&self, position: Vector2Int, height: TileHeight) -> Option<Entity> {
        self.tiles_at(position)
            .iter()
            .copied()
            .find(|&e| self.height_of(e).intersects(height))
    }

    pub fn floor_tile_at(&self, position: Vector2Int) -> Option<Entity> {
        self.tile_at(position, TileHeight::FLOOR)
    }

    pub fn tile_of_def_at(&self, position: Vector2Int, def_id: &str) -> Option<Entity> {
        self.tiles_at(position).iter().copied().find(|&e| {
            self.world
                .get::<&TileInfo>(e)
                .map(|i| i.def_id == def_id)
                .unwrap_or(false)
        })
    }

    pub fn occupied_height(&self, position: Vector2Int) -> TileHeight {
        self.tiles_at(position)
            .iter()
            .fold(TileHeight::empty(), |acc, &e| acc | self.height_of(e))
    }

    fn height_of(&self, entity: Entity) -> TileHeight {
        self.world
            .get::<&TileInfo>(entity)
            .map(|i| i.height)
            .unwrap_or(TileHeight::empty())
    }

    pub fn tile_info(&self, entity: Entity) -> Option<TileInfo> {
        self.world.get::<&TileInfo>(entity).ok().map(|i| (*i).clone())
    }

    pub fn contains_tile(&self, entity: Entity) -> bool {
        self.world.contains(entity)
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.values().map(Vec::len).sum()
    }

    pub fn positions(&self) -> impl Iterator<Item = Vector2Int> + '_ {
        self.tiles.keys().copied()
    }

    pub fn component<T: hecs::Component>(&self, entity: Entity) -> Option<hecs::Ref<'_, T>> {
        self.world.get::<&T>(entity).ok()
    }

    pub fn component_mut<T: hecs::Component>(
        &mut self,
        entity: Entity,
    ) -> Option<hecs::RefMut<'_, T>> {
        self.world.get::<&mut T>(entity).ok()
    }

    pub fn has_component(&self, entity: Entity, kind: ComponentKind) -> bool {
        let w = &self.world;
        match kind {
            ComponentKind::Walkable => w.get::<&Walkable>(entity).is_ok(),
            ComponentKind::Solid => w.get::<&Solid>(entity).is_ok(),
            ComponentKind::PowerConnector => w.get::<&PowerConnector>(entity).is_ok(),
            ComponentKind::Battery => w.get::<&Battery>(entity).is_ok(),
            ComponentKind::PowerConsumer => w.get::<&PowerConsumer>(entity).is_ok(),
            ComponentKind::PowerProducer => w.get::<&PowerProducer>(entity).is_ok(),
            ComponentKind::SolarPanel => w.get::<&SolarPanel>(entity).is_ok(),
            ComponentKind::Oxygen => w.get::<&Oxygen>(entity).is_ok(),
            ComponentKind::OxygenProducer => w.get::<&OxygenProducer>(entity).is_ok(),
            ComponentKind::Decorative => w.get::<&Decorative>(entity).is_ok(),
            ComponentKind::Door => w.get::<&Door>(entity).is_ok(),
            ComponentKind::Durability => w.get::<&Durability>(entity).is_ok(),
            ComponentKind::Rotatable => w.get::<&Rotatable>(entity).is_ok(),
            ComponentKind::Structure => w.get::<&Structure>(entity).is_ok(),
        }
    }

    fn any_at(&self, position: Vector2Int, kind: ComponentKind) -> bool {
        self.tiles_at(position)
            .iter()
            .any(|&e| self.has_component(e, kind))
    }

    /// Walkable, and either not solid or passable through a door.
    pub fn is_pathable(&self, position: Vector2Int) -> bool {
        self.any_at(position, ComponentKind::Walkable)
            && (!self.any_at(position, ComponentKind::Solid)
                || self.any_at(position, ComponentKind::Door))
    }

    pub fn door_at(&self, position: Vector2Int) -> Option<Entity> {
        self.tiles_at(position)
            .iter()
            .copied()
            .find(|&e| self.world.get::<&Door>(e).is_ok())
    }

    pub fn oxygen_at(&self, position: Vector2Int) -> Option<f32> {
        self.tiles_at(position)
            .iter()
            .find_map(|&e| self.world.get::<&Oxygen>(e).ok().map(|o| o.level))
    }

    pub fn set_consumer_powered(&mut self, entity: Entity, on: bool) -> bool {
        match self.world.get::<&mut PowerConsumer>(entity) {
            Ok(mut consumer) => {
                consumer.powered_on = on;
                true
            }
            Err(_) => false,
        }
    }

    fn refresh_sprites_around(&mut self, position: Vector2Int) {
        let mut cells = vec![position];
        cells.extend(position.cardinal_neighbours());
        for cell in cells {
            let entities: Vec<Entity> = self.tiles_at(cell).to_vec();
            for entity in entities {
                if self.world.get::<&SpriteVariant>(entity).is_err() {
                    continue;
                }
                let Some(info) = self.tile_info(entity) else {
                    continue;
                };
                let mut mask = 0u8;
                for (bit, n) in cell.cardinal_neighbours().iter().enumerate() {
                    if self.tile_of_def_at(*n, &info.def_id).is_some() {
                        mask |= 1 << bit;
                    }
                }
                if let Ok(mut variant) = self.world.get::<&mut SpriteVariant>(entity) {
                    variant.0 = mask;
                }
            }
        }
    }

    // ── Power ───────────────────────────────────────────────────────────

    fn has_connector_at(&self, position: Vector2Int) -> bool {
        self.any_at(position, ComponentKind::PowerConnector)
    }

    fn connect_peers(&mut self, entity: Entity, position: Vector2Int) {
        let peers: Vec<Entity> = position
            .cardinal_neighbours()
            .iter()
            .flat_map(|n| self.tiles_at(*n).to_vec())
            .filter(|&e| self.world.get::<&PowerConnector>(e).is_ok())
            .collect();
        for peer in peers {
            if let Ok(mut connector) = self.world.get::<&mut PowerConnector>(peer) {
                connector.connect(entity);
            }
            if let Ok(mut connector) = self.world.get::<&mut PowerConnector>(entity) {
                connector.connect(peer);
            }
        }
    }

    fn allocate_grid_id(next: &mut u32) -> PowerGridId {
        let id = PowerGridId(*next);
        *next += 1;
        id
    }

    /// Lay a wire. Extends, merges or creates grids as needed. Returns
    /// `false` if a wire already exists at `position`.
    pub fn add_power_wire(&mut self, position: Vector2Int) -> bool {
        let mut connectable = Vec::new();
        for (index, grid) in self.power_grids.iter().enumerate() {
            match grid.connectivity(position) {
                WireConnectivity::AlreadyPresent => return false,
                WireConnectivity::Connectable => connectable.push(index),
                WireConnectivity::NotConnectable => {}
            }
        }

        let index = match connectable.split_first() {
            None => {
                let id = Self::allocate_grid_id(&mut self.next_grid_id);
                self.power_grids.push(PowerGrid::new(id));
                self.power_grids.len() - 1
            }
            Some((&first, rest)) => {
                for &other in rest.iter().rev() {
                    let absorbed = self.power_grids.remove(other);
                    log::info!(
                        "merging power grid {:?} into {:?}",
                        absorbed.id(),
                        self.power_grids[first].id()
                    );
                    self.power_grids[first].absorb(absorbed);
                }
                first
            }
        };
        self.power_grids[index].add_wire(position);
        self.attach_power_at(position);
        true
    }

    /// Remove a wire, splitting its grid if the network falls apart.
    pub fn remove_power_wire(&mut self, position: Vector2Int) -> bool {
        let Some(index) = self
            .power_grids
            .iter()
            .position(|g| g.contains_wire(position))
        else {
            return false;
        };
        let mut grid = self.power_grids.remove(index);
        grid.remove_wire(position);

        if grid.wire_count() == 0 {
            log::info!("power grid {:?} removed", grid.id());
        } else if grid.is_connected() {
            self.power_grids.insert(index, grid);
        } else {
            let original = grid.id();
            let next = &mut self.next_grid_id;
            let parts = grid.split(|| Self::allocate_grid_id(next));
            log::info!("power grid {:?} split into {} grids", original, parts.len());
            self.power_grids.extend(parts);
        }
        true
    }

    fn attach_power_at(&mut self, position: Vector2Int) {
        let Some(grid) = self
            .power_grids
            .iter_mut()
            .find(|g| g.contains_wire(position))
        else {
            return;
        };
        if let Some(list) = self.tiles.get(&position) {
            for &entity in list {
                grid.attach(&self.world, position, entity);
            }
        }
    }

    pub fn power_grids(&self) -> &[PowerGrid] {
        &self.power_grids
    }

    pub fn grid_at(&self, position: Vector2Int) -> Option<&PowerGrid> {
        self.power_grids.iter().find(|g| g.contains_wire(position))
    }

    // ── Rooms ───────────────────────────────────────────────────────────

    pub fn create_room(&mut self, name: impl Into<String>) -> RoomId {
        let id = RoomId(self.next_room_id);
        self.next_room_id += 1;
        self.rooms.insert(
            id,
            Room {
                name: name.into(),
                tiles: HashSet::new(),
            },
        );
        id
    }

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    // ── Resources ───────────────────────────────────────────────────────

    pub fn resources(&self) -> &BTreeMap<String, u32> {
        &self.resources
    }

    pub fn resource(&self, id: &str) -> u32 {
        self.resources.get(id).copied().unwrap_or(0)
    }

    pub fn add_resource(&mut self, id: impl Into<String>, amount: u32) {
        *self.resources.entry(id.into()).or_insert(0) += amount;
    }

    fn try_spend(&mut self, cost: &BTreeMap<String, u32>) -> Result<(), StationError> {
        for (resource, &needed) in cost {
            let available = self.resource(resource);
            if available < needed {
                return Err(StationError::InsufficientResources {
                    resource: resource.clone(),
                    needed,
                    available,
                });
            }
        }
        for (resource, &needed) in cost {
            if let Some(stock) = self.resources.get_mut(resource) {
                *stock -= needed;
            }
        }
        Ok(())
    }

    fn refund(&mut self, cost: &BTreeMap<String, u32>) {
        for (resource, &amount) in cost {
            self.add_resource(resource.clone(), amount);
        }
    }

    // ── Effects ─────────────────────────────────────────────────────────

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Place an effect. An existing effect of the same kind on the cell
    /// keeps the larger of the two sizes.
    pub fn add_effect(&mut self, def_id: &str, position: Vector2Int) -> Result<(), StationError> {
        let def = self.catalog.effect(def_id)?;
        let (kind, size) = (def.kind, def.initial_size.clamp(0.0, 1.0));
        self.place_effect(def_id.to_string(), kind, position, size);
        Ok(())
    }

    pub(crate) fn place_effect(
        &mut self,
        def_id: String,
        kind: EffectKind,
        position: Vector2Int,
        size: f32,
    ) {
        if let Some(existing) = self
            .effects
            .iter_mut()
            .find(|e| e.kind == kind && e.position == position)
        {
            existing.size = existing.size.max(size);
            return;
        }
        self.effects.push(Effect {
            def_id,
            kind,
            position,
            size,
        });
    }

    pub fn effect_at(&self, position: Vector2Int, kind: EffectKind) -> Option<&Effect> {
        self.effects
            .iter()
            .find(|e| e.kind == kind && e.position == position)
    }

    pub fn remove_effect(&mut self, position: Vector2Int, kind: EffectKind) -> Option<Effect> {
        let index = self
            .effects
            .iter()
            .position(|e| e.kind == kind && e.position == position)?;
        Some(self.effects.remove(index))
    }

    // ── Planned tasks ───────────────────────────────────────────────────

    pub fn planned_tasks(&self) -> &[PlannedTask] {
        &self.planned_tasks
    }

    pub fn planned_task_at(&self, position: Vector2Int) -> Option<&PlannedTask> {
        self.planned_tasks.iter().find(|t| t.position == position)
    }

    /// Queue a build or deconstruct. Builds pay their cost up front.
    pub fn request_planned_task(
        &mut self,
        position: Vector2Int,
        tile_id: &str,
        is_build: bool,
    ) -> Result<(), StationError> {
        if self.planned_task_at(position).is_some() {
            return Err(StationError::TaskAlreadyPlanned(position));
        }
        let catalog = Arc::clone(&self.catalog);
        let def = catalog.tile(tile_id)?;
        if is_build {
            if self.occupied_height(position).intersects(def.height) {
                return Err(StationError::Overlap {
                    def_id: tile_id.to_string(),
                    position,
                });
            }
            self.try_spend(&def.build_cost)?;
        } else if self.tile_of_def_at(position, tile_id).is_none() {
            return Err(StationError::NothingToDeconstruct {
                def_id: tile_id.to_string(),
                position,
            });
        }

        self.planned_tasks.push(PlannedTask {
            position,
            tile_id: tile_id.to_string(),
            is_build,
            progress: 0.0,
        });
        Ok(())
    }

    /// Drop a task. Cancelled builds are refunded.
    pub fn cancel_planned_task(&mut self, position: Vector2Int) -> Result<PlannedTask, StationError> {
        let index = self
            .planned_tasks
            .iter()
            .position(|t| t.position == position)
            .ok_or(StationError::NoTask(position))?;
        let task = self.planned_tasks.remove(index);
        if task.is_build {
            if let Ok(def) = Arc::clone(&self.catalog).tile(&task.tile_id) {
                self.refund(&def.build_cost);
            }
        }
        Ok(task)
    }

    /// Add work to the task at `position`, completing it at 1.0.
    pub fn progress_planned_task(
        &mut self,
        position: Vector2Int,
        amount: f32,
    ) -> Result<TaskProgress, StationError> {
        let task = self
            .planned_tasks
            .iter_mut()
            .find(|t| t.position == position)
            .ok_or(StationError::NoTask(position))?;
        task.progress = (task.progress + amount).min(1.0);
        if task.progress < 1.0 {
            return Ok(TaskProgress::InProgress(task.progress));
        }
        self.complete_planned_task(position)?;
        Ok(TaskProgress::Completed)
    }

    /// Materialize or remove the task's tile and drop the task.
    pub fn complete_planned_task(&mut self, position: Vector2Int) -> Result<(), StationError> {
        let index = self
            .planned_tasks
            .iter()
            .position(|t| t.position == position)
            .ok_or(StationError::NoTask(position))?;
        let task = self.planned_tasks.remove(index);
        let catalog = Arc::clone(&self.catalog);
        let def = catalog.tile(&task.tile_id)?;

        if task.is_build {
            if let Err(err) = self.create_tile(&task.tile_id, position, None) {
                self.refund(&def.build_cost);
                return Err(err);
            }
        } else {
            let entity = self.tile_of_def_at(position, &task.tile_id).ok_or_else(|| {
                StationError::NothingToDeconstruct {
                    def_id: task.tile_id.clone(),
                    position,
                }
            })?;
            self.delete_tile(entity);
            self.refund(&def.build_cost);
        }
        log::info!(
            "{} of {} at {} completed",
            if task.is_build { "build" } else { "deconstruct" },
            task.tile_id,
            position
        );
        Ok(())
    }

    // ── Per-tick updates ────────────────────────────────────────────────

    /// Fire spread, growth and decay.
    pub fn update_effects(&mut self, config: &GameConfig, dt: f32) {
        systems::update_effects(self, config, dt);
    }

    /// Doors, power, then oxygen.
    pub fn update_tiles(&mut self, config: &GameConfig, dt: f32) {
        systems::update_doors(&self.world, config, dt);
        systems::update_solar_panels(&self.world, config);
        for grid in &mut self.power_grids {
            grid.update(&self.world, dt);
        }
        systems::produce_oxygen(self, config, dt);
        systems::diffuse_oxygen(self, config, dt);
    }
}

fn build_tile(def: &TileDef, position: Vector2Int, room: Option<RoomId>) -> EntityBuilder {
    let mut builder = EntityBuilder::new();
    builder.add(TileInfo {
        def_id: def.id.clone(),
        position,
        height: def.height,
        room,
    });
    for component in &def.components {
        component.instantiate(&mut builder);
    }
    if def.is_connected_sprite() {
        builder.add(SpriteVariant::default());
    }
    builder
}

fn height_bits(world: &World, entity: Entity) -> u8 {
    world
        .get::<&TileInfo>(entity)
        .map(|i| i.height.bits())
        .unwrap_or(0)
}
