//! Stone economy
//!
//! Stones are a per-attribute resource. Using the same ability again in the
//! same turn doubles its price: 1, 2, 4, 8... The usage ledger is keyed by
//! (attribute, ability, round, turn), so prices start over every turn.

use crate::error::{CombatError, CombatResult, PromptError};
use crate::ports::{ChoiceContext, ChoiceKind, ChoiceResult, CombatEvent};
use crate::round::RoundState;
use crate::session::CombatSession;
use crate::store::StateUpdate;
use crate::types::ActorId;
use rules_core::{Attribute, StoneEffect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Price of the next use after `uses` uses this turn
pub fn stone_cost(uses: u32) -> u64 {
    1u64.checked_shl(uses).unwrap_or(u64::MAX)
}

/// Stones of one attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StonePool {
    pub current: u32,
    pub max: u32,
    /// Stones reserved by ongoing effects
    #[serde(default)]
    pub sustained: u32,
}

impl StonePool {
    /// A full pool
    pub fn new(max: u32) -> Self {
        StonePool {
            current: max,
            max,
            sustained: 0,
        }
    }

    /// Highest value `current` may reach
    pub fn ceiling(&self) -> u32 {
        self.max.saturating_sub(self.sustained)
    }

    pub fn headroom(&self) -> u32 {
        self.ceiling().saturating_sub(self.current)
    }

    pub fn can_afford(&self, cost: u64) -> bool {
        u64::from(self.current) >= cost
    }

    /// Deduct `cost`; false (and no change) if the pool can't cover it
    pub fn spend(&mut self, cost: u64) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        // cost <= current, so it fits in u32
        self.current -= cost as u32;
        true
    }

    /// Add up to `points` without passing the ceiling; returns how many were added
    pub fn regenerate(&mut self, points: u32) -> u32 {
        let gained = points.min(self.headroom());
        self.current += gained;
        gained
    }

    pub fn restore(&mut self) {
        self.current = self.ceiling();
    }

    pub fn set_sustained(&mut self, sustained: u32) {
        self.sustained = sustained.min(self.max);
        self.current = self.current.min(self.ceiling());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub attribute: Attribute,
    pub ability: String,
    pub round: u32,
    pub turn: u32,
    pub count: u32,
}

impl UsageEntry {
    fn matches(&self, attribute: &Attribute, ability: &str, round: u32, turn: u32) -> bool {
        self.round == round
            && self.turn == turn
            && self.ability == ability
            && &self.attribute == attribute
    }
}

/// Per-turn ability use counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoneUsageLedger {
    entries: Vec<UsageEntry>,
}

impl StoneUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uses(&self, attribute: &Attribute, ability: &str, round: u32, turn: u32) -> u32 {
        self.entries
            .iter()
            .find(|e| e.matches(attribute, ability, round, turn))
            .map_or(0, |e| e.count)
    }

    /// Count one more use; returns the new count
    pub fn record(&mut self, attribute: &Attribute, ability: &str, round: u32, turn: u32) -> u32 {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.matches(attribute, ability, round, turn))
        {
            entry.count += 1;
            return entry.count;
        }

        self.entries.push(UsageEntry {
            attribute: attribute.clone(),
            ability: ability.to_string(),
            round,
            turn,
            count: 1,
        });
        1
    }

    /// Drop entries of one (round, turn); others are kept
    pub fn purge_turn(&mut self, round: u32, turn: u32) {
        self.entries
            .retain(|e| !(e.round == round && e.turn == turn));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[UsageEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of a successful stone spend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoneSpend {
    pub attribute: Attribute,
    pub ability: String,
    pub cost: u64,
    /// Uses of this ability this turn, including this one
    pub uses: u32,
    pub pool: StonePool,
    pub round_state: RoundState,
}

/// Outcome of end-of-round regeneration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegenOutcome {
    /// Points actually added, per attribute
    Regenerated(BTreeMap<Attribute, u32>),
    Declined,
    /// No points to spend or every pool already at its ceiling
    NothingToRegenerate,
}

impl CombatSession {
    /// Price of the next use of `ability_id` with `attribute` stones this turn
    pub async fn next_stone_cost(
        &self,
        actor: &ActorId,
        attribute: &Attribute,
        ability_id: &str,
    ) -> CombatResult<u64> {
        self.participant(actor)?;
        let clock = self.clock().await;
        let ledger = self.load(actor).await?.ledger;
        Ok(stone_cost(ledger.uses(attribute, ability_id, clock.round, clock.turn)))
    }

    /// Pay for an ability with stones and apply `effect` to the round state
    ///
    /// The affordability check runs against state re-read under the actor
    /// lock. Effect, deduction and usage count are written in one update.
    pub async fn spend_ability(
        &self,
        actor: &ActorId,
        attribute: &Attribute,
        ability_id: &str,
        effect: &StoneEffect,
    ) -> CombatResult<StoneSpend> {
        self.participant(actor)?;
        self.catalog().resolve(ability_id, attribute)?;

        let clock = self.clock.read().await;
        let _guard = self.lock_actor(actor).await;
        let state = self.load(actor).await?;

        // Step 1: price from this turn's usage
        let uses = state
            .ledger
            .uses(attribute, ability_id, clock.round, clock.turn);
        let cost = stone_cost(uses);

        // Step 2: affordability
        let mut pool = *state
            .stones
            .get(attribute)
            .ok_or_else(|| CombatError::UnknownPool {
                actor: actor.clone(),
                attribute: attribute.clone(),
            })?;
        if !pool.spend(cost) {
            debug!(
                actor = %actor,
                %attribute,
                ability = ability_id,
                cost,
                available = pool.current,
                "insufficient stones"
            );
            return Err(CombatError::InsufficientStones {
                attribute: attribute.clone(),
                cost,
                available: pool.current,
            });
        }

        // Step 3: effect, deduction and ledger together
        let mut round_state = state.round_state_for(*clock, &self.rules().budgets);
        round_state.apply_stone_effect(effect);

        let mut stones = state.stones.clone();
        stones.insert(attribute.clone(), pool);

        let mut ledger = state.ledger.clone();
        let uses = ledger.record(attribute, ability_id, clock.round, clock.turn);

        self.save(
            actor,
            StateUpdate::new()
                .round_state(round_state.clone())
                .stones(stones)
                .ledger(ledger),
        )
        .await?;

        info!(
            actor = %actor,
            %attribute,
            ability = ability_id,
            cost,
            remaining = pool.current,
            round = clock.round,
            turn = clock.turn,
            "spent stones"
        );
        Ok(StoneSpend {
            attribute: attribute.clone(),
            ability: ability_id.to_string(),
            cost,
            uses,
            pool,
            round_state,
        })
    }

    /// [`CombatSession::spend_ability`] with the effect defined in the catalog
    pub async fn spend_catalog_ability(
        &self,
        actor: &ActorId,
        attribute: &Attribute,
        ability_id: &str,
    ) -> CombatResult<StoneSpend> {
        let effect = self
            .catalog()
            .resolve(ability_id, attribute)?
            .effect
            .clone();
        self.spend_ability(actor, attribute, ability_id, &effect)
            .await
    }

    /// Reserve `sustained` stones of a pool for an ongoing effect
    pub async fn set_sustained(
        &self,
        actor: &ActorId,
        attribute: &Attribute,
        sustained: u32,
    ) -> CombatResult<StonePool> {
        self.participant(actor)?;
        let _guard = self.lock_actor(actor).await;
        let state = self.load(actor).await?;

        let mut stones = state.stones.clone();
        let pool = stones
            .get_mut(attribute)
            .ok_or_else(|| CombatError::UnknownPool {
                actor: actor.clone(),
                attribute: attribute.clone(),
            })?;
        if sustained > pool.max {
            return Err(CombatError::InvalidAllocation(format!(
                "cannot sustain {sustained} of {} {attribute} stones",
                pool.max
            )));
        }
        pool.set_sustained(sustained);
        let pool = *pool;

        self.save(actor, StateUpdate::new().stones(stones)).await?;
        debug!(actor = %actor, %attribute, sustained, current = pool.current, "sustained stones");
        Ok(pool)
    }

    /// Ask the actor's controller to distribute `points` across their pools
    ///
    /// Each pool is capped at `max - sustained`. Declining regenerates nothing.
    pub async fn regenerate_end_of_round(
        &self,
        actor: &ActorId,
        points: u32,
    ) -> CombatResult<RegenOutcome> {
        self.participant(actor)?;
        let pools = self.load(actor).await?.stones;
        if points == 0 || pools.values().all(|pool| pool.headroom() == 0) {
            return Ok(RegenOutcome::NothingToRegenerate);
        }

        // No lock is held while the participant decides
        let context = ChoiceContext::StoneRegeneration {
            actor: actor.clone(),
            points,
            pools,
        };
        let allocation = match self
            .choices
            .prompt_choice(ChoiceKind::StoneRegeneration, context)
            .await?
        {
            None => {
                info!(actor = %actor, points, "stone regeneration declined");
                return Ok(RegenOutcome::Declined);
            }
            Some(ChoiceResult::Regeneration(allocation)) => allocation,
            Some(_) => {
                return Err(PromptError::UnexpectedAnswer(ChoiceKind::StoneRegeneration).into())
            }
        };

        let requested: u64 = allocation.values().map(|&v| u64::from(v)).sum();
        if requested > u64::from(points) {
            return Err(CombatError::InvalidAllocation(format!(
                "allocated {requested} points, only {points} available"
            )));
        }

        let _guard = self.lock_actor(actor).await;
        let state = self.load(actor).await?;
        let mut stones = state.stones.clone();
        let mut applied = BTreeMap::new();
        for (attribute, amount) in allocation {
            let pool = stones
                .get_mut(&attribute)
                .ok_or_else(|| CombatError::UnknownPool {
                    actor: actor.clone(),
                    attribute: attribute.clone(),
                })?;
            let gained = pool.regenerate(amount);
            if gained > 0 {
                applied.insert(attribute, gained);
            }
        }

        if !applied.is_empty() {
            self.save(actor, StateUpdate::new().stones(stones)).await?;
            info!(actor = %actor, ?applied, "stones regenerated");
            self.emit(CombatEvent::StonesRegenerated {
                actor: actor.clone(),
                allocation: applied.clone(),
            });
        }
        Ok(RegenOutcome::Regenerated(applied))
    }

    /// Refill every pool of every listed actor to its ceiling
    pub async fn restore_after_combat(&self, actors: &[ActorId]) -> CombatResult<()> {
        self.commit_all(actors, |actor, state| {
            debug!(actor = %actor, "restoring stones");
            Ok(StateUpdate::new().stones(restored_stones(&state.stones)))
        })
        .await
    }
}

/// Every pool refilled to its ceiling
pub(crate) fn restored_stones(
    stones: &BTreeMap<Attribute, StonePool>,
) -> BTreeMap<Attribute, StonePool> {
    let mut stones = stones.clone();
    stones.values_mut().for_each(StonePool::restore);
    stones
}
