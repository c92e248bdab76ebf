//! Round state - per-actor action budgets for the current round
//!
//! Each category (movement, attack, reaction) may be spent at most `total`
//! times. A turn change zeroes the used counts; a round change rebuilds the
//! whole state from the configured defaults.

use crate::error::{CombatError, CombatResult};
use crate::session::CombatSession;
use crate::shop::ShopPurchase;
use crate::store::{CombatClock, StateUpdate};
use crate::types::{ActionCategory, ActorId};
use rules_core::{BudgetConstants, StoneEffect};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Spend budget for one action category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub total: u32,
    pub used: u32,
}

impl Budget {
    pub fn new(total: u32) -> Self {
        Budget { total, used: 0 }
    }

    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.total
    }

    fn try_spend(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.used += 1;
        true
    }
}

/// Roll bonuses bought with stones, consumed by the next pool roll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoneBonus {
    pub bonus_dice: u32,
    pub flat_bonus: i32,
}

/// Action ledger of one actor for one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundState {
    pub round: u32,
    pub turn: u32,
    pub movement: Budget,
    pub attack: Budget,
    pub reaction: Budget,
    /// Extra movement distance granted this round
    pub move_bonus_meters: u32,
    /// Confirmed initiative shop purchase applied to this round
    #[serde(default)]
    pub shop_purchase: Option<ShopPurchase>,
    /// Unlocked by a shop purchase; spent by whoever performs the swap
    #[serde(default)]
    pub initiative_swap_available: bool,
    #[serde(default)]
    pub stone_bonus: Option<StoneBonus>,
}

impl RoundState {
    pub fn new(round: u32, turn: u32, budgets: &BudgetConstants) -> Self {
        RoundState {
            round,
            turn,
            movement: Budget::new(budgets.movement),
            attack: Budget::new(budgets.attack),
            reaction: Budget::new(budgets.reaction),
            move_bonus_meters: 0,
            shop_purchase: None,
            initiative_swap_available: false,
            stone_bonus: None,
        }
    }

    pub fn budget(&self, category: ActionCategory) -> &Budget {
        match category {
            ActionCategory::Movement => &self.movement,
            ActionCategory::Attack => &self.attack,
            ActionCategory::Reaction => &self.reaction,
        }
    }

    fn budget_mut(&mut self, category: ActionCategory) -> &mut Budget {
        match category {
            ActionCategory::Movement => &mut self.movement,
            ActionCategory::Attack => &mut self.attack,
            ActionCategory::Reaction => &mut self.reaction,
        }
    }

    /// Use one action of `category`; false (and no change) when none remain
    pub fn spend(&mut self, category: ActionCategory) -> bool {
        self.budget_mut(category).try_spend()
    }

    /// Movement bonuses are meters of distance, attack/reaction bonuses raise the total
    pub fn apply_bonus(&mut self, category: ActionCategory, amount: u32) {
        match category {
            ActionCategory::Movement => {
                self.move_bonus_meters = self.move_bonus_meters.saturating_add(amount);
            }
            ActionCategory::Attack | ActionCategory::Reaction => {
                let budget = self.budget_mut(category);
                budget.total = budget.total.saturating_add(amount);
            }
        }
    }

    /// Zero every used count, keeping totals and bonuses
    pub fn reset_turn(&mut self, turn: u32) {
        self.turn = turn;
        for category in ActionCategory::all() {
            self.budget_mut(*category).used = 0;
        }
    }

    pub fn apply_shop_purchase(&mut self, purchase: &ShopPurchase, increment_meters: u32) {
        self.apply_bonus(
            ActionCategory::Movement,
            purchase.extra_movement.saturating_mul(increment_meters),
        );
        if purchase.extra_attack {
            self.apply_bonus(ActionCategory::Attack, 1);
        }
        self.initiative_swap_available |= purchase.initiative_swap;
        self.shop_purchase = Some(*purchase);
    }

    pub fn apply_stone_effect(&mut self, effect: &StoneEffect) {
        match effect {
            StoneEffect::ExtraAttack { amount } => {
                self.apply_bonus(ActionCategory::Attack, *amount)
            }
            StoneEffect::ExtraReaction { amount } => {
                self.apply_bonus(ActionCategory::Reaction, *amount)
            }
            StoneEffect::ExtraMovement { meters } => {
                self.apply_bonus(ActionCategory::Movement, *meters)
            }
            StoneEffect::BonusDice { amount } => {
                let bonus = self.stone_bonus.get_or_insert_with(StoneBonus::default);
                bonus.bonus_dice = bonus.bonus_dice.saturating_add(*amount);
            }
            StoneEffect::FlatBonus { amount } => {
                let bonus = self.stone_bonus.get_or_insert_with(StoneBonus::default);
                bonus.flat_bonus = bonus.flat_bonus.saturating_add(*amount);
            }
            StoneEffect::Narrative => {}
        }
    }

    /// Remove and return the accumulated stone roll bonus
    pub fn take_stone_bonus(&mut self) -> Option<StoneBonus> {
        self.stone_bonus.take()
    }
}

impl CombatSession {
    /// Current round state of `actor`, created fresh if the stored one is from another round
    pub async fn round_state(&self, actor: &ActorId) -> CombatResult<RoundState> {
        self.participant(actor)?;
        let clock = self.clock.read().await;
        let state = self.load(actor).await?;
        Ok(state.round_state_for(*clock, &self.rules().budgets))
    }

    /// Use one action of `category`
    pub async fn spend_action(
        &self,
        actor: &ActorId,
        category: ActionCategory,
    ) -> CombatResult<Budget> {
        let clock = self.clock.read().await;
        let state = self
            .update_round_state(actor, *clock, |state| {
                if state.spend(category) {
                    Ok(())
                } else {
                    Err(CombatError::BudgetExhausted {
                        actor: actor.clone(),
                        category,
                    })
                }
            })
            .await?;

        let budget = *state.budget(category);
        debug!(actor = %actor, %category, used = budget.used, total = budget.total, "spent action");
        Ok(budget)
    }

    /// Grant extra budget from an external effect
    pub async fn apply_bonus(
        &self,
        actor: &ActorId,
        category: ActionCategory,
        amount: u32,
    ) -> CombatResult<RoundState> {
        let clock = self.clock.read().await;
        self.update_round_state(actor, *clock, |state| {
            state.apply_bonus(category, amount);
            Ok(())
        })
        .await
    }

    /// Use up the initiative swap unlocked by the shop; false if none was available
    pub async fn consume_initiative_swap(&self, actor: &ActorId) -> CombatResult<bool> {
        let clock = self.clock.read().await;
        let mut available = false;
        self.update_round_state(actor, *clock, |state| {
            available = std::mem::take(&mut state.initiative_swap_available);
            Ok(())
        })
        .await?;
        Ok(available)
    }

    /// Zero all used counts of `actor` for the current turn
    pub async fn reset_turn(&self, actor: &ActorId) -> CombatResult<RoundState> {
        let clock = self.clock.read().await;
        self.reset_turn_at(actor, *clock).await
    }

    /// Replace the round state of `actor` with a fresh default for the current round
    pub async fn reset_round(&self, actor: &ActorId) -> CombatResult<RoundState> {
        let clock = self.clock.read().await;
        self.reset_round_at(actor, *clock).await
    }

    pub(crate) async fn reset_turn_at(
        &self,
        actor: &ActorId,
        clock: CombatClock,
    ) -> CombatResult<RoundState> {
        self.update_round_state(actor, clock, |state| {
            state.reset_turn(clock.turn);
            Ok(())
        })
        .await
    }

    /// Fresh default state, then any shop purchase confirmed for this round
    pub(crate) async fn reset_round_at(
        &self,
        actor: &ActorId,
        clock: CombatClock,
    ) -> CombatResult<RoundState> {
        let participant = self.participant(actor)?;
        let _guard = self.lock_actor(actor).await;
        let state = self.load(actor).await?;

        let round_state = self.fresh_round_state(participant, &state, clock);
        self.save(actor, StateUpdate::new().round_state(round_state.clone()))
            .await?;
        info!(actor = %actor, round = clock.round, "round state reset");
        Ok(round_state)
    }

    /// Read, mutate and write back the round state under the actor lock
    ///
    /// Nothing is written when `mutate` fails.
    pub(crate) async fn update_round_state(
        &self,
        actor: &ActorId,
        clock: CombatClock,
        mutate: impl FnOnce(&mut RoundState) -> CombatResult<()>,
    ) -> CombatResult<RoundState> {
        self.participant(actor)?;
        let _guard = self.lock_actor(actor).await;
        let state = self.load(actor).await?;

        let mut round_state = state.round_state_for(clock, &self.rules().budgets);
        mutate(&mut round_state)?;

        self.save(actor, StateUpdate::new().round_state(round_state.clone()))
            .await?;
        Ok(round_state)
    }
}
