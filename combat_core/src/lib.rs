//! combat_core - Round, stone and initiative economy for Roll & Keep combat
//!
//! This library provides:
//! - CombatSession: the per-combat context every operation runs against
//! - Round state: per-round movement/attack/reaction budgets
//! - Stone economy: per-attribute stones with doubling in-turn prices
//! - Initiative shop: trading rolled initiative for bonuses once per round
//! - Lifecycle: combat start, turn change, round change, combat end
//!
//! Persistence, prompts, broadcasts and character values are ports
//! ([`StateStore`], [`ChoicePort`], [`Broadcaster`], [`CharacterSource`]).
//!
//! # Quick Start
//!
//! ```rust
//! use combat_core::prelude::*;
//! use std::sync::Arc;
//!
//! # tokio_test_block(async {
//! let store = Arc::new(MemoryStore::new());
//! store.insert("kaede", ActorState::new().with_pool("fire", StonePool::new(5)));
//!
//! let session = CombatSession::new(vec![Participant::player("kaede")], store);
//! let kaede = ActorId::from("kaede");
//!
//! session.on_combat_start().await.unwrap();
//! session.spend_action(&kaede, ActionCategory::Attack).await.unwrap();
//! assert!(session.spend_action(&kaede, ActionCategory::Attack).await.is_err());
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod error;
pub mod lifecycle;
pub mod ports;
pub mod prelude;
pub mod round;
pub mod session;
pub mod shop;
pub mod stones;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

// Core API
pub use error::{CombatError, CombatResult, ErrorSeverity, PromptError, StoreError};
pub use session::CombatSession;
pub use types::{ActionCategory, ActorId, Participant};

// Components
pub use lifecycle::RoundReport;
pub use round::{Budget, RoundState, StoneBonus};
pub use shop::{
    ShopDraft, ShopPhase, ShopPurchase, ShopRecord, ShopSelection, ShopStatus, ShopToggle,
};
pub use stones::{stone_cost, RegenOutcome, StonePool, StoneSpend, StoneUsageLedger, UsageEntry};

// Ports
pub use ports::{
    Broadcaster, CharacterSource, ChoiceContext, ChoiceKind, ChoicePort, ChoiceResult, CombatEvent,
    LogBroadcaster, NoChoices, StaticCharacters,
};
pub use store::{ActorState, CombatClock, MemoryStore, StateStore, StateUpdate};

// Re-export commonly needed types from the lower crates
pub use dice_core::{FaceSource, RollOptions, RollResult};
pub use rules_core::{AbilityCatalog, Attribute, RulesConfig, StoneEffect};
