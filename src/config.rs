//! Runtime configuration, loaded from TOML.
//!
//! Every field has a default matching the supported game revision, so an
//! empty file (or no file at all) is a valid configuration.

use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub layout: Layout,
    pub explore: ExploreConfig,
    pub pathfinder: PathfinderConfig,
    pub metafinder: MetafinderConfig,
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let source = fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

/// Addresses of game structures in the emulated address space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// Pointer to the first save block (flags, variables, bag)
    pub save_block1_ptr: u32,
    /// Pointer to the second save block (player name, gender, key)
    pub save_block2_ptr: u32,
    pub flags_offset: u32,
    pub vars_offset: u32,
    pub money_offset: u32,
    /// Offset of the XOR key inside save block 2
    pub encryption_key_offset: u32,
    /// Pocket descriptors (items pointer, capacity)
    pub bag_pocket_table: u32,
    pub bag_pocket_count: u32,
    pub player_gender_offset: u32,
    pub std_scripts_table: u32,
    pub std_scripts_count: u8,
    pub multichoice_table: u32,
    pub multichoice_count: u8,
    pub map_banks_table: u32,
    /// Region-name pointer table, indexed by a map's label id
    pub map_names_table: u32,
    pub ow_objects: u32,
    pub ow_object_count: u32,
    pub player_state: u32,
    pub party_count: u32,
    /// First party member, 100 bytes each
    pub party_data: u32,
    pub move_names: u32,
    pub move_name_len: u32,
    pub move_count: u32,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            save_block1_ptr: 0x0300_5008,
            save_block2_ptr: 0x0300_500C,
            flags_offset: 0xEE0,
            vars_offset: 0x1000,
            money_offset: 0x290,
            encryption_key_offset: 0xF20,
            bag_pocket_table: 0x0203_988C,
            bag_pocket_count: 5,
            player_gender_offset: 0x08,
            std_scripts_table: 0x0816_0450,
            std_scripts_count: 10,
            multichoice_table: 0x083E_04B0,
            multichoice_count: 0x40,
            map_banks_table: 0x0835_26A8,
            map_names_table: 0x083F_1CAC,
            ow_objects: 0x0203_6E38,
            ow_object_count: 16,
            player_state: 0x0203_707A,
            party_count: 0x0202_4029,
            party_data: 0x0202_4284,
            move_names: 0x0824_7094,
            move_name_len: 13,
            move_count: 355,
        }
    }
}

/// Budgets for symbolic exploration and replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExploreConfig {
    /// Instructions interpreted per explore/execute call, over all contexts
    pub max_steps: usize,
    /// Open contexts allowed at once
    pub max_contexts: usize,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        ExploreConfig {
            max_steps: 200_000,
            max_contexts: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfinderConfig {
    pub walk_cost: f32,
    /// Cost of stepping into tall grass
    pub grass_cost: f32,
    /// Node expansions before a search gives up
    pub max_expansions: usize,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        PathfinderConfig {
            walk_cost: 1.0,
            grass_cost: 10.0,
            max_expansions: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetafinderConfig {
    /// Meta-path candidates dequeued before a search gives up
    pub max_candidates: usize,
}

impl Default for MetafinderConfig {
    fn default() -> Self {
        MetafinderConfig {
            max_candidates: 20_000,
        }
    }
}
