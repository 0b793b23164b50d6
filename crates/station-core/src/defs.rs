//! Static definition catalog: tile and effect definitions keyed by id.
//!
//! Definitions are loaded once before the simulation starts and shared
//! read-only as `Arc<DefinitionCatalog>`. A tile definition carries a
//! template component set; instantiating a tile spawns fresh copies of
//! those components onto a new entity.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hecs::EntityBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::*;

const BUILTIN_CATALOG: &str = include_str!("../../../data/catalog.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse definition catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read definition catalog from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("duplicate definition id {id}")]
    Duplicate { id: String },
    #[error("tile definition {id} lists component {kind:?} more than once")]
    DuplicateComponent { id: String, kind: ComponentKind },
    #[error("tile definition {id} occupies no height layer")]
    EmptyHeight { id: String },
    #[error("unknown tile definition {0}")]
    UnknownTile(String),
    #[error("unknown effect definition {0}")]
    UnknownEffect(String),
}

/// Template for one capability component of a tile definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentDef {
    Walkable,
    Solid,
    PowerConnector {
        #[serde(default = "default_io")]
        io: PowerIo,
    },
    Battery {
        max_charge: f32,
        #[serde(default)]
        charge: f32,
    },
    PowerConsumer {
        consumption: f32,
        #[serde(default)]
        priority: PowerPriority,
    },
    PowerProducer {
        production: f32,
    },
    SolarPanel {
        output: f32,
    },
    Oxygen {
        #[serde(default)]
        level: f32,
    },
    OxygenProducer {
        rate: f32,
    },
    Decorative {
        #[serde(default)]
        parts: Vec<DecorativePart>,
    },
    Door {
        #[serde(default)]
        open: bool,
    },
    Durability {
        max_hitpoints: f32,
    },
    Rotatable {
        #[serde(default)]
        rotation: Rotation,
    },
    Structure,
}

fn default_io() -> PowerIo {
    PowerIo::INPUT | PowerIo::OUTPUT
}

impl ComponentDef {
    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentDef::Walkable => ComponentKind::Walkable,
            ComponentDef::Solid => ComponentKind::Solid,
            ComponentDef::PowerConnector { .. } => ComponentKind::PowerConnector,
            ComponentDef::Battery { .. } => ComponentKind::Battery,
            ComponentDef::PowerConsumer { .. } => ComponentKind::PowerConsumer,
            ComponentDef::PowerProducer { .. } => ComponentKind::PowerProducer,
            ComponentDef::SolarPanel { .. } => ComponentKind::SolarPanel,
            ComponentDef::Oxygen { .. } => ComponentKind::Oxygen,
            ComponentDef::OxygenProducer { .. } => ComponentKind::OxygenProducer,
            ComponentDef::Decorative { .. } => ComponentKind::Decorative,
            ComponentDef::Door { .. } => ComponentKind::Door,
            ComponentDef::Durability { .. } => ComponentKind::Durability,
            ComponentDef::Rotatable { .. } => ComponentKind::Rotatable,
            ComponentDef::Structure => ComponentKind::Structure,
        }
    }

    /// Add a fresh instance of this component to an entity under construction.
    pub fn instantiate(&self, builder: &mut EntityBuilder) {
        match self {
            ComponentDef::Walkable => {
                builder.add(Walkable);
            }
            ComponentDef::Solid => {
                builder.add(Solid);
            }
            ComponentDef::PowerConnector { io } => {
                builder.add(PowerConnector::new(*io));
            }
            ComponentDef::Battery { max_charge, charge } => {
                builder.add(Battery::new(*charge, *max_charge));
            }
            ComponentDef::PowerConsumer {
                consumption,
                priority,
            } => {
                builder.add(PowerConsumer::new(*consumption, *priority));
            }
            ComponentDef::PowerProducer { production } => {
                builder.add(PowerProducer::new(*production));
            }
            ComponentDef::SolarPanel { output } => {
                builder.add(SolarPanel { output: *output });
                builder.add(PowerProducer::new(0.0));
            }
            ComponentDef::Oxygen { level } => {
                builder.add(Oxygen { level: *level });
            }
            ComponentDef::OxygenProducer { rate } => {
                builder.add(OxygenProducer { rate: *rate });
            }
            ComponentDef::Decorative { parts } => {
                builder.add(Decorative {
                    parts: parts.clone(),
                });
            }
            ComponentDef::Door { open } => {
                builder.add(Door::new(*open));
            }
            ComponentDef::Durability { max_hitpoints } => {
                builder.add(Durability::new(*max_hitpoints));
            }
            ComponentDef::Rotatable { rotation } => {
                builder.add(Rotatable {
                    rotation: *rotation,
                });
            }
            ComponentDef::Structure => {
                builder.add(Structure);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileCategory {
    #[default]
    Floor,
    Wall,
    Door,
    Power,
    LifeSupport,
    Furniture,
    Decoration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpriteRule {
    Single { sprite: String },
    /// Sprite picked by the cardinal mask of same-definition neighbours.
    Connected { sheet: String },
}

impl Default for SpriteRule {
    fn default() -> Self {
        SpriteRule::Single {
            sprite: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileDef {
    pub id: String,
    pub height: TileHeight,
    #[serde(default)]
    pub category: TileCategory,
    #[serde(default)]
    pub components: Vec<ComponentDef>,
    #[serde(default)]
    pub sprite: SpriteRule,
    #[serde(default)]
    pub build_cost: BTreeMap<String, u32>,
}

impl TileDef {
    pub fn has(&self, kind: ComponentKind) -> bool {
        self.components.iter().any(|c| c.kind() == kind)
    }

    pub fn has_power(&self) -> bool {
        self.components.iter().any(|c| c.kind().is_power())
    }

    pub fn is_connected_sprite(&self) -> bool {
        matches!(self.sprite, SpriteRule::Connected { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Fire,
    Foam,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectDef {
    pub id: String,
    pub kind: EffectKind,
    #[serde(default = "default_effect_size")]
    pub initial_size: f32,
}

fn default_effect_size() -> f32 {
    1.0
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CatalogFile {
    tiles: Vec<TileDef>,
    effects: Vec<EffectDef>,
}

#[derive(Debug, Clone, Default)]
pub struct DefinitionCatalog {
    tiles: HashMap<String, TileDef>,
    effects: HashMap<String, EffectDef>,
}

impl DefinitionCatalog {
    /// Catalog embedded in the crate. Malformed embedded data is a build
    /// defect, so this panics rather than run with missing definitions.
    pub fn builtin() -> Arc<Self> {
        Self::from_json_str(BUILTIN_CATALOG)
            .map(Arc::new)
            .expect("builtin definition catalog should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::from_defs(file.tiles, file.effects)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_defs(tiles: Vec<TileDef>, effects: Vec<EffectDef>) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for def in tiles {
            catalog.insert_tile(def)?;
        }
        for def in effects {
            if catalog.effects.contains_key(&def.id) {
                return Err(CatalogError::Duplicate { id: def.id });
            }
            catalog.effects.insert(def.id.clone(), def);
        }
        Ok(catalog)
    }

    fn insert_tile(&mut self, def: TileDef) -> Result<(), CatalogError> {
        if self.tiles.contains_key(&def.id) {
            return Err(CatalogError::Duplicate { id: def.id });
        }
        if def.height.is_empty() {
            return Err(CatalogError::EmptyHeight { id: def.id });
        }
        let mut seen = HashSet::new();
        for component in &def.components {
            let mut kinds = vec![component.kind()];
            // Solar panels bring their own producer.
            if component.kind() == ComponentKind::SolarPanel {
                kinds.push(ComponentKind::PowerProducer);
            }
            for kind in kinds {
                if !seen.insert(kind) {
                    return Err(CatalogError::DuplicateComponent {
                        id: def.id.clone(),
                        kind,
                    });
                }
            }
        }
        self.tiles.insert(def.id.clone(), def);
        Ok(())
    }

    pub fn tile(&self, id: &str) -> Result<&TileDef, CatalogError> {
        self.tiles
            .get(id)
            .ok_or_else(|| CatalogError::UnknownTile(id.to_string()))
    }

    pub fn effect(&self, id: &str) -> Result<&EffectDef, CatalogError> {
        self.effects
            .get(id)
            .ok_or_else(|| CatalogError::UnknownEffect(id.to_string()))
    }

    /// First effect definition of the given kind, by id order.
    pub fn effect_of_kind(&self, kind: EffectKind) -> Option<&EffectDef> {
        let mut defs: Vec<&EffectDef> = self.effects.values().filter(|d| d.kind == kind).collect();
        defs.sort_by(|a, b| a.id.cmp(&b.id));
        defs.into_iter().next()
    }

    pub fn tile_ids(&self) -> impl Iterator<Item = &str> {
        self.tiles.keys().map(String::as_str)
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }
}
