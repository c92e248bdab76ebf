//! Tunable combat constants

use crate::ConfigError;
use dice_core::PoolLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// All tunable rules, usually loaded from `rules.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub dice: DiceConstants,
    #[serde(default)]
    pub budgets: BudgetConstants,
    #[serde(default)]
    pub shop: ShopConstants,
}

impl RulesConfig {
    /// Load rules from a TOML file
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            error: e,
            path: Some(path.to_path_buf()),
        })?;
        let rules: RulesConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            error: e,
            path: Some(path.to_path_buf()),
        })?;
        rules.validate().map_err(|message| ConfigError::Validation {
            message,
            path: Some(path.to_path_buf()),
        })?;
        Ok(rules)
    }

    /// Parse rules from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let rules: RulesConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            error: e,
            path: None,
        })?;
        rules.validate().map_err(|message| ConfigError::Validation {
            message,
            path: None,
        })?;
        Ok(rules)
    }

    fn validate(&self) -> Result<(), String> {
        if self.dice.max_pool == 0 {
            return Err("dice.max_pool must be at least 1".to_string());
        }
        if self.dice.max_keep == 0 {
            return Err("dice.max_keep must be at least 1".to_string());
        }
        if self.shop.movement_increment_meters == 0 {
            return Err("shop.movement_increment_meters must be at least 1".to_string());
        }
        Ok(())
    }

    /// Limits for the dice engine
    pub fn pool_limits(&self) -> PoolLimits {
        PoolLimits {
            max_pool: self.dice.max_pool,
            max_keep: self.dice.max_keep,
            raise_step: self.dice.raise_step,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceConstants {
    /// Largest pool that will be rolled
    #[serde(default = "default_max_pool")]
    pub max_pool: u32,
    /// Most dice that may be kept
    #[serde(default = "default_max_keep")]
    pub max_keep: u32,
    /// Target number increase per declared raise
    #[serde(default = "default_raise_step")]
    pub raise_step: i32,
}

impl Default for DiceConstants {
    fn default() -> Self {
        DiceConstants {
            max_pool: default_max_pool(),
            max_keep: default_max_keep(),
            raise_step: default_raise_step(),
        }
    }
}

fn default_max_pool() -> u32 {
    40
}
fn default_max_keep() -> u32 {
    8
}
fn default_raise_step() -> i32 {
    4
}

/// Per-round action totals before any bonus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetConstants {
    #[serde(default = "default_action_total")]
    pub movement: u32,
    #[serde(default = "default_action_total")]
    pub attack: u32,
    #[serde(default = "default_action_total")]
    pub reaction: u32,
}

impl Default for BudgetConstants {
    fn default() -> Self {
        BudgetConstants {
            movement: default_action_total(),
            attack: default_action_total(),
            reaction: default_action_total(),
        }
    }
}

fn default_action_total() -> u32 {
    1
}

/// Initiative shop price list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopConstants {
    /// Initiative spent per movement increment
    #[serde(default = "default_movement_cost")]
    pub movement_cost: u32,
    /// Distance granted per movement increment
    #[serde(default = "default_movement_increment")]
    pub movement_increment_meters: u32,
    #[serde(default = "default_swap_cost")]
    pub swap_cost: u32,
    #[serde(default = "default_extra_attack_cost")]
    pub extra_attack_cost: u32,
}

impl Default for ShopConstants {
    fn default() -> Self {
        ShopConstants {
            movement_cost: default_movement_cost(),
            movement_increment_meters: default_movement_increment(),
            swap_cost: default_swap_cost(),
            extra_attack_cost: default_extra_attack_cost(),
        }
    }
}

fn default_movement_cost() -> u32 {
    3
}
fn default_movement_increment() -> u32 {
    2
}
fn default_swap_cost() -> u32 {
    5
}
fn default_extra_attack_cost() -> u32 {
    10
}
