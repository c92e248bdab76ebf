//! Persistence port
//!
//! Everything the economy remembers about an actor lives in one [`ActorState`].
//! Operations read it whole and write back a [`StateUpdate`] holding only the
//! fields they changed, in a single call, so a failed write commits nothing.

use crate::error::StoreError;
use crate::round::RoundState;
use crate::shop::ShopRecord;
use crate::stones::{StonePool, StoneUsageLedger};
use crate::types::ActorId;
use async_trait::async_trait;
use rules_core::{Attribute, BudgetConstants};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

/// Clock position of a combat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatClock {
    pub round: u32,
    pub turn: u32,
}

impl Default for CombatClock {
    fn default() -> Self {
        CombatClock { round: 1, turn: 1 }
    }
}

/// Persisted economy state of one actor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorState {
    #[serde(default)]
    pub round_state: Option<RoundState>,
    #[serde(default)]
    pub stones: BTreeMap<Attribute, StonePool>,
    #[serde(default)]
    pub ledger: StoneUsageLedger,
    #[serde(default)]
    pub shop: Option<ShopRecord>,
    #[serde(default)]
    pub initiative: Option<i32>,
}

impl ActorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a stone pool
    pub fn with_pool(mut self, attribute: impl Into<Attribute>, pool: StonePool) -> Self {
        self.stones.insert(attribute.into(), pool);
        self
    }

    /// The stored round state if it belongs to `clock.round`, otherwise a fresh default
    pub fn round_state_for(&self, clock: CombatClock, budgets: &BudgetConstants) -> RoundState {
        match &self.round_state {
            Some(state) if state.round == clock.round => state.clone(),
            _ => RoundState::new(clock.round, clock.turn, budgets),
        }
    }

    /// The shop record for `round`, if one was resolved
    pub fn shop_for(&self, round: u32) -> Option<&ShopRecord> {
        self.shop.as_ref().filter(|record| record.round() == round)
    }
}

/// Partial update to an [`ActorState`]; `None` fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    round_state: Option<Option<RoundState>>,
    stones: Option<BTreeMap<Attribute, StonePool>>,
    ledger: Option<StoneUsageLedger>,
    shop: Option<Option<ShopRecord>>,
    initiative: Option<Option<i32>>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// An update that writes every field of `state` back
    pub fn restore(state: ActorState) -> Self {
        StateUpdate {
            round_state: Some(state.round_state),
            stones: Some(state.stones),
            ledger: Some(state.ledger),
            shop: Some(state.shop),
            initiative: Some(state.initiative),
        }
    }

    pub fn round_state(mut self, state: RoundState) -> Self {
        self.round_state = Some(Some(state));
        self
    }

    pub fn clear_round_state(mut self) -> Self {
        self.round_state = Some(None);
        self
    }

    pub fn stones(mut self, stones: BTreeMap<Attribute, StonePool>) -> Self {
        self.stones = Some(stones);
        self
    }

    pub fn ledger(mut self, ledger: StoneUsageLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn shop(mut self, record: Option<ShopRecord>) -> Self {
        self.shop = Some(record);
        self
    }

    pub fn initiative(mut self, initiative: Option<i32>) -> Self {
        self.initiative = Some(initiative);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Write the set fields into `state`
    pub fn apply_to(self, state: &mut ActorState) {
        if let Some(round_state) = self.round_state {
            state.round_state = round_state;
        }
        if let Some(stones) = self.stones {
            state.stones = stones;
        }
        if let Some(ledger) = self.ledger {
            state.ledger = ledger;
        }
        if let Some(shop) = self.shop {
            state.shop = shop;
        }
        if let Some(initiative) = self.initiative {
            state.initiative = initiative;
        }
    }
}

/// Where actor state is read from and written to
///
/// A `set_state` either applies the whole update or returns an error
/// having applied none of it.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_state(&self, actor: &ActorId) -> Result<ActorState, StoreError>;

    async fn set_state(&self, actor: &ActorId, update: StateUpdate) -> Result<(), StoreError>;
}

/// In-process store, also used to exercise write failures in tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    states: Mutex<HashMap<ActorId, ActorState>>,
    failing_writes: Mutex<u32>,
    failing_actors: Mutex<BTreeSet<ActorId>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actor with its starting state
    pub fn insert(&self, actor: impl Into<ActorId>, state: ActorState) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(actor.into(), state);
    }

    /// Copy of the stored state
    pub fn snapshot(&self, actor: &ActorId) -> Option<ActorState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(actor)
            .cloned()
    }

    /// Make the next `count` writes fail without applying anything
    pub fn fail_next_writes(&self, count: u32) {
        let mut failing = self
            .failing_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *failing = count;
    }

    /// Make every write to `actor` fail until [`MemoryStore::clear_write_failures`]
    pub fn fail_writes_for(&self, actor: impl Into<ActorId>) {
        self.failing_actors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(actor.into());
    }

    pub fn clear_write_failures(&self) {
        self.failing_actors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.fail_next_writes(0);
    }

    fn write_fails(&self, actor: &ActorId) -> bool {
        let mut failing = self
            .failing_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *failing > 0 {
            *failing -= 1;
            return true;
        }
        self.failing_actors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(actor)
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_state(&self, actor: &ActorId) -> Result<ActorState, StoreError> {
        self.snapshot(actor)
            .ok_or_else(|| StoreError::UnknownActor(actor.clone()))
    }

    async fn set_state(&self, actor: &ActorId, update: StateUpdate) -> Result<(), StoreError> {
        if self.write_fails(actor) {
            return Err(StoreError::Write(format!("injected failure for {actor}")));
        }

        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states
            .get_mut(actor)
            .ok_or_else(|| StoreError::UnknownActor(actor.clone()))?;
        update.apply_to(state);
        Ok(())
    }
}
