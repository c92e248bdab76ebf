//! Prelude module for convenient imports
//!
//! ```rust
//! use combat_core::prelude::*;
//! ```

// Session
pub use crate::error::{CombatError, CombatResult};
pub use crate::session::CombatSession;
pub use crate::types::{ActionCategory, ActorId, Participant};

// Economy state
pub use crate::round::{Budget, RoundState};
pub use crate::shop::{ShopPhase, ShopRecord, ShopStatus, ShopToggle};
pub use crate::stones::{RegenOutcome, StonePool};

// Ports
pub use crate::ports::{Broadcaster, CharacterSource, ChoicePort, ChoiceResult, StaticCharacters};
pub use crate::store::{ActorState, MemoryStore, StateStore};

// Re-exports from the dice and rules crates
pub use dice_core::{roll_pool, RollOptions, RollResult, SeededFaces};
pub use rules_core::{AbilityCatalog, Attribute, RulesConfig, StoneEffect};
