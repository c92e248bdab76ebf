//! rules_core - Tunable combat rules and the stone ability catalog
//!
//! Both are plain TOML. Nothing here is global: load a [`RulesConfig`] and an
//! [`AbilityCatalog`] once and hand them to whatever runs the combat.

mod ability;
mod catalog;
mod constants;

pub use ability::{AbilityDef, Attribute, StoneEffect};
pub use catalog::AbilityCatalog;
pub use constants::{BudgetConstants, DiceConstants, RulesConfig, ShopConstants};

use std::path::PathBuf;
use thiserror::Error;

/// Error loading rules or ability configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading '{path:?}': {error}")]
    Io {
        error: std::io::Error,
        path: Option<PathBuf>,
    },
    #[error("Parse error in '{path:?}': {error}")]
    Parse {
        error: toml::de::Error,
        path: Option<PathBuf>,
    },
    #[error("Validation error in '{path:?}': {message}")]
    Validation {
        message: String,
        path: Option<PathBuf>,
    },
}

/// Error resolving an ability against the catalog
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbilityError {
    #[error("Unknown ability: {0}")]
    UnknownAbility(String),
    #[error("Ability '{ability}' cannot be paid with {attribute} stones")]
    AttributeNotAllowed {
        ability: String,
        attribute: Attribute,
    },
}
