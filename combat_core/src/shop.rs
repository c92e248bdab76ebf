//! Initiative shop
//!
//! Once per round a player-controlled combatant may trade rolled initiative
//! for movement, an extra attack or the right to swap initiative. Whatever
//! is left over becomes their turn-order value.
//!
//! Per (combatant, round): Unopened -> Drafting -> Confirmed, or
//! Unopened/Drafting -> Skipped. Cancelling a draft goes back to Unopened.

use crate::error::{CombatError, CombatResult, PromptError};
use crate::ports::{ChoiceContext, ChoiceKind, ChoiceResult, CombatEvent};
use crate::session::CombatSession;
use crate::store::StateUpdate;
use crate::types::ActorId;
use dice_core::RollResult;
use rules_core::ShopConstants;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What a combatant bought for one round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopPurchase {
    pub round: u32,
    /// Number of movement increments
    pub extra_movement: u32,
    pub initiative_swap: bool,
    pub extra_attack: bool,
}

impl ShopPurchase {
    pub fn empty(round: u32) -> Self {
        ShopPurchase {
            round,
            ..Default::default()
        }
    }

    /// Total initiative spent
    pub fn cost(&self, prices: &ShopConstants) -> u32 {
        let mut cost = self.extra_movement.saturating_mul(prices.movement_cost);
        if self.initiative_swap {
            cost = cost.saturating_add(prices.swap_cost);
        }
        if self.extra_attack {
            cost = cost.saturating_add(prices.extra_attack_cost);
        }
        cost
    }

    pub fn is_empty(&self) -> bool {
        self.extra_movement == 0 && !self.initiative_swap && !self.extra_attack
    }
}

/// A selection as returned by the choice port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopSelection {
    pub extra_movement: u32,
    pub initiative_swap: bool,
    pub extra_attack: bool,
}

impl ShopSelection {
    fn into_purchase(self, round: u32) -> ShopPurchase {
        ShopPurchase {
            round,
            extra_movement: self.extra_movement,
            initiative_swap: self.initiative_swap,
            extra_attack: self.extra_attack,
        }
    }
}

/// One-shot purchases that can be switched on and off while drafting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShopToggle {
    InitiativeSwap,
    ExtraAttack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShopPhase {
    Unopened,
    Drafting,
    Confirmed,
    Skipped,
}

/// An open, unconfirmed shop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopDraft {
    pub round: u32,
    pub total_initiative: i32,
    pub purchase: ShopPurchase,
}

impl ShopDraft {
    fn new(round: u32, total_initiative: i32) -> Self {
        ShopDraft {
            round,
            total_initiative,
            purchase: ShopPurchase::empty(round),
        }
    }

    /// Initiative available to spend
    pub fn budget(&self) -> u32 {
        u32::try_from(self.total_initiative).unwrap_or(0)
    }

    pub fn cost(&self, prices: &ShopConstants) -> u32 {
        self.purchase.cost(prices)
    }

    pub fn remaining(&self, prices: &ShopConstants) -> u32 {
        self.budget().saturating_sub(self.cost(prices))
    }
}

/// Terminal shop outcome for one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ShopRecord {
    Confirmed {
        purchase: ShopPurchase,
        total_initiative: i32,
        turn_order_value: i32,
    },
    Skipped {
        round: u32,
        total_initiative: i32,
    },
}

impl ShopRecord {
    pub fn round(&self) -> u32 {
        match self {
            ShopRecord::Confirmed { purchase, .. } => purchase.round,
            ShopRecord::Skipped { round, .. } => *round,
        }
    }

    pub fn purchase(&self) -> Option<&ShopPurchase> {
        match self {
            ShopRecord::Confirmed { purchase, .. } => Some(purchase),
            ShopRecord::Skipped { .. } => None,
        }
    }

    pub fn total_initiative(&self) -> i32 {
        match self {
            ShopRecord::Confirmed {
                total_initiative, ..
            }
            | ShopRecord::Skipped {
                total_initiative, ..
            } => *total_initiative,
        }
    }

    /// Initiative left after purchases
    pub fn turn_order_value(&self) -> i32 {
        match self {
            ShopRecord::Confirmed {
                turn_order_value, ..
            } => *turn_order_value,
            ShopRecord::Skipped {
                total_initiative, ..
            } => *total_initiative,
        }
    }

    pub fn phase(&self) -> ShopPhase {
        match self {
            ShopRecord::Confirmed { .. } => ShopPhase::Confirmed,
            ShopRecord::Skipped { .. } => ShopPhase::Skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShopStatus {
    Drafting(ShopDraft),
    /// Already confirmed or skipped this round
    Resolved(ShopRecord),
}

impl CombatSession {
    /// Open the shop for this round with the rolled initiative as budget
    ///
    /// Re-opening returns the open draft or the existing record unchanged.
    pub async fn open_shop(&self, actor: &ActorId, roll: &RollResult) -> CombatResult<ShopStatus> {
        self.require_player(actor)?;
        let clock = self.clock().await;
        let state = self.load(actor).await?;
        if let Some(record) = state.shop_for(clock.round) {
            return Ok(ShopStatus::Resolved(record.clone()));
        }

        let mut drafts = self.drafts();
        let draft = drafts
            .entry(actor.clone())
            .and_modify(|draft| {
                if draft.round != clock.round {
                    *draft = ShopDraft::new(clock.round, roll.total());
                }
            })
            .or_insert_with(|| ShopDraft::new(clock.round, roll.total()))
            .clone();
        debug!(actor = %actor, round = clock.round, budget = draft.budget(), "shop opened");
        Ok(ShopStatus::Drafting(draft))
    }

    /// Buy one more movement increment
    pub async fn shop_add_movement(&self, actor: &ActorId) -> CombatResult<ShopDraft> {
        self.edit_draft(actor, |purchase| {
            purchase.extra_movement += 1;
            Ok(())
        })
        .await
    }

    /// Give back one movement increment
    pub async fn shop_remove_movement(&self, actor: &ActorId) -> CombatResult<ShopDraft> {
        self.edit_draft(actor, |purchase| {
            if purchase.extra_movement == 0 {
                return Err(CombatError::NothingToRemove);
            }
            purchase.extra_movement -= 1;
            Ok(())
        })
        .await
    }

    /// Switch a one-shot purchase on or off
    pub async fn shop_toggle(
        &self,
        actor: &ActorId,
        toggle: ShopToggle,
    ) -> CombatResult<ShopDraft> {
        self.edit_draft(actor, |purchase| {
            match toggle {
                ShopToggle::InitiativeSwap => purchase.initiative_swap = !purchase.initiative_swap,
                ShopToggle::ExtraAttack => purchase.extra_attack = !purchase.extra_attack,
            }
            Ok(())
        })
        .await
    }

    /// Drop the draft; nothing is recorded and the shop can be opened again
    pub fn cancel_shop(&self, actor: &ActorId) -> bool {
        let cancelled = self.drafts().remove(actor).is_some();
        if cancelled {
            debug!(actor = %actor, "shop draft cancelled");
        }
        cancelled
    }

    pub async fn shop_phase(&self, actor: &ActorId) -> CombatResult<ShopPhase> {
        self.participant(actor)?;
        let clock = self.clock().await;
        let state = self.load(actor).await?;
        if let Some(record) = state.shop_for(clock.round) {
            return Ok(record.phase());
        }
        let drafting = self
            .drafts()
            .get(actor)
            .is_some_and(|draft| draft.round == clock.round);
        Ok(if drafting {
            ShopPhase::Drafting
        } else {
            ShopPhase::Unopened
        })
    }

    /// Commit the draft: pay for it, apply it to the round and set turn order
    pub async fn confirm_shop(&self, actor: &ActorId) -> CombatResult<ShopRecord> {
        self.require_player(actor)?;
        let clock = self.clock.read().await;
        let draft = self
            .current_draft(actor, clock.round)
            .ok_or_else(|| CombatError::ShopNotDrafting(actor.clone()))?;

        let _guard = self.lock_actor(actor).await;
        let state = self.load(actor).await?;
        if let Some(record) = state.shop_for(clock.round) {
            self.drafts().remove(actor);
            return Ok(record.clone());
        }

        let prices = &self.rules().shop;
        let cost = draft.cost(prices);
        if cost > draft.budget() {
            return Err(CombatError::OverBudget {
                cost,
                budget: draft.budget(),
            });
        }

        let turn_order_value = draft.total_initiative.saturating_sub_unsigned(cost);
        let record = ShopRecord::Confirmed {
            purchase: draft.purchase,
            total_initiative: draft.total_initiative,
            turn_order_value,
        };

        let mut round_state = state.round_state_for(*clock, &self.rules().budgets);
        round_state.apply_shop_purchase(&draft.purchase, prices.movement_increment_meters);

        self.save(
            actor,
            StateUpdate::new()
                .round_state(round_state)
                .shop(Some(record.clone()))
                .initiative(Some(turn_order_value)),
        )
        .await?;
        self.drafts().remove(actor);

        info!(actor = %actor, round = clock.round, cost, turn_order_value, "shop confirmed");
        self.emit(CombatEvent::ShopConfirmed {
            actor: actor.clone(),
            round: clock.round,
            turn_order_value,
            purchase: draft.purchase,
        });
        self.mark_shop_resolved(actor, clock.round);
        Ok(record)
    }

    /// Keep the rolled initiative and buy nothing this round
    ///
    /// With a draft open for this round, the draft's initiative is kept and
    /// `roll` is ignored.
    pub async fn skip_shop(&self, actor: &ActorId, roll: &RollResult) -> CombatResult<ShopRecord> {
        self.require_player(actor)?;
        let clock = self.clock.read().await;
        let _guard = self.lock_actor(actor).await;
        let state = self.load(actor).await?;
        if let Some(record) = state.shop_for(clock.round) {
            return Ok(record.clone());
        }

        let total_initiative = self
            .current_draft(actor, clock.round)
            .map_or_else(|| roll.total(), |draft| draft.total_initiative);
        let record = ShopRecord::Skipped {
            round: clock.round,
            total_initiative,
        };
        self.save(
            actor,
            StateUpdate::new()
                .shop(Some(record.clone()))
                .initiative(Some(total_initiative)),
        )
        .await?;
        self.drafts().remove(actor);

        info!(actor = %actor, round = clock.round, initiative = total_initiative, "shop skipped");
        self.emit(CombatEvent::ShopSkipped {
            actor: actor.clone(),
            round: clock.round,
            initiative: total_initiative,
        });
        self.mark_shop_resolved(actor, clock.round);
        Ok(record)
    }

    /// Open the shop, ask the participant what to buy and resolve it
    ///
    /// A declined prompt skips the shop. An unaffordable selection is
    /// rejected and leaves the shop unopened.
    pub async fn run_initiative_shop(
        &self,
        actor: &ActorId,
        roll: &RollResult,
    ) -> CombatResult<ShopRecord> {
        let draft = match self.open_shop(actor, roll).await? {
            ShopStatus::Resolved(record) => return Ok(record),
            ShopStatus::Drafting(draft) => draft,
        };

        let context = ChoiceContext::InitiativeShop {
            actor: actor.clone(),
            total_initiative: draft.total_initiative,
            prices: self.rules().shop.clone(),
        };
        let answer = match self
            .choices
            .prompt_choice(ChoiceKind::InitiativeShop, context)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                self.cancel_shop(actor);
                return Err(e.into());
            }
        };

        let selection = match answer {
            None => {
                self.cancel_shop(actor);
                return self.skip_shop(actor, roll).await;
            }
            Some(ChoiceResult::Shop(selection)) => selection,
            Some(_) => {
                self.cancel_shop(actor);
                return Err(PromptError::UnexpectedAnswer(ChoiceKind::InitiativeShop).into());
            }
        };

        let purchase = selection.into_purchase(draft.round);
        let cost = purchase.cost(&self.rules().shop);
        if cost > draft.budget() {
            self.cancel_shop(actor);
            return Err(CombatError::OverBudget {
                cost,
                budget: draft.budget(),
            });
        }

        if let Some(open) = self.drafts().get_mut(actor) {
            open.purchase = purchase;
        }
        self.confirm_shop(actor).await
    }

    fn require_player(&self, actor: &ActorId) -> CombatResult<()> {
        if !self.participant(actor)?.player_controlled {
            return Err(CombatError::ShopUnavailable(actor.clone()));
        }
        Ok(())
    }

    fn current_draft(&self, actor: &ActorId, round: u32) -> Option<ShopDraft> {
        self.drafts()
            .get(actor)
            .filter(|draft| draft.round == round)
            .cloned()
    }

    /// Apply `edit` to a copy of the draft and keep it only if still affordable
    async fn edit_draft(
        &self,
        actor: &ActorId,
        edit: impl FnOnce(&mut ShopPurchase) -> CombatResult<()>,
    ) -> CombatResult<ShopDraft> {
        self.require_player(actor)?;
        let clock = self.clock().await;
        let prices = &self.rules().shop;

        let mut drafts = self.drafts();
        let draft = drafts
            .get_mut(actor)
            .filter(|draft| draft.round == clock.round)
            .ok_or_else(|| CombatError::ShopNotDrafting(actor.clone()))?;

        let mut candidate = draft.purchase;
        edit(&mut candidate)?;
        let cost = candidate.cost(prices);
        if cost > draft.budget() {
            debug!(actor = %actor, cost, budget = draft.budget(), "shop purchase over budget");
            return Err(CombatError::OverBudget {
                cost,
                budget: draft.budget(),
            });
        }

        draft.purchase = candidate;
        Ok(draft.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actor, initiative_roll, Harness};
    use crate::types::ActionCategory;

    fn over_budget(cost: u32, budget: u32) -> CombatError {
        CombatError::OverBudget { cost, budget }
    }

    #[test]
    fn test_purchase_cost() {
        let prices = ShopConstants::default();
        let purchase = ShopPurchase {
            round: 1,
            extra_movement: 2,
            initiative_swap: true,
            extra_attack: true,
        };
        assert_eq!(purchase.cost(&prices), 6 + 5 + 10);
        assert!(ShopPurchase::empty(1).is_empty());
        assert_eq!(ShopPurchase::empty(1).cost(&prices), 0);
    }

    #[test]
    fn test_negative_initiative_has_no_budget() {
        let draft = ShopDraft::new(1, -3);
        assert_eq!(draft.budget(), 0);
    }

    #[tokio::test]
    async fn test_scenario_shop_within_budget() {
        let harness = Harness::new();
        let kaede = actor("kaede");
        let s = &harness.session;
        let roll = initiative_roll(20);

        assert!(matches!(
            s.open_shop(&kaede, &roll).await.unwrap(),
            ShopStatus::Drafting(_)
        ));
        for _ in 0..3 {
            s.shop_add_movement(&kaede).await.unwrap();
        }
        let draft = s
            .shop_toggle(&kaede, ShopToggle::ExtraAttack)
            .await
            .unwrap();
        assert_eq!(draft.cost(&s.rules().shop), 19);

        // 19 + 5 > 20
        let err = s
            .shop_toggle(&kaede, ShopToggle::InitiativeSwap)
            .await
            .unwrap_err();
        assert_eq!(err, over_budget(24, 20));
        let err = s.shop_add_movement(&kaede).await.unwrap_err();
        assert_eq!(err, over_budget(22, 20));

        let record = s.confirm_shop(&kaede).await.unwrap();
        assert_eq!(record.turn_order_value(), 1);

        let state = s.round_state(&kaede).await.unwrap();
        assert_eq!(state.move_bonus_meters, 6);
        assert_eq!(state.attack.total, 2);
        assert!(!state.initiative_swap_available);

        let stored = harness.store.snapshot(&kaede).unwrap();
        assert_eq!(stored.initiative, Some(1));
        assert!(harness.events.event_types().contains(&"shop_confirmed".to_string()));
    }

    #[tokio::test]
    async fn test_reopen_returns_existing_record() {
        let harness = Harness::new();
        let kaede = actor("kaede");
        let s = &harness.session;

        let record = s.skip_shop(&kaede, &initiative_roll(14)).await.unwrap();
        assert_eq!(record.turn_order_value(), 14);
        assert_eq!(s.shop_phase(&kaede).await.unwrap(), ShopPhase::Skipped);

        let status = s.open_shop(&kaede, &initiative_roll(30)).await.unwrap();
        assert_eq!(status, ShopStatus::Resolved(record.clone()));
        let again = s.skip_shop(&kaede, &initiative_roll(30)).await.unwrap();
        assert_eq!(again, record);
    }

    #[tokio::test]
    async fn test_skip_keeps_draft_initiative() {
        let harness = Harness::new();
        let kaede = actor("kaede");
        let s = &harness.session;

        s.open_shop(&kaede, &initiative_roll(15)).await.unwrap();
        s.shop_add_movement(&kaede).await.unwrap();
        let record = s.skip_shop(&kaede, &initiative_roll(30)).await.unwrap();
        assert_eq!(record.total_initiative(), 15);
        assert_eq!(record.turn_order_value(), 15);
        assert!(record.purchase().is_none());

        let stored = harness.store.snapshot(&kaede).unwrap();
        assert_eq!(stored.initiative, Some(15));
        assert_eq!(s.shop_phase(&kaede).await.unwrap(), ShopPhase::Skipped);
    }

    #[tokio::test]
    async fn test_remove_and_cancel() {
        let harness = Harness::new();
        let kaede = actor("kaede");
        let s = &harness.session;

        assert_eq!(
            s.shop_add_movement(&kaede).await.unwrap_err(),
            CombatError::ShopNotDrafting(kaede.clone())
        );

        s.open_shop(&kaede, &initiative_roll(10)).await.unwrap();
        assert_eq!(
            s.shop_remove_movement(&kaede).await.unwrap_err(),
            CombatError::NothingToRemove
        );
        s.shop_add_movement(&kaede).await.unwrap();
        let draft = s.shop_remove_movement(&kaede).await.unwrap();
        assert_eq!(draft.purchase.extra_movement, 0);

        let draft = s
            .shop_toggle(&kaede, ShopToggle::InitiativeSwap)
            .await
            .unwrap();
        assert!(draft.purchase.initiative_swap);
        assert_eq!(s.shop_phase(&kaede).await.unwrap(), ShopPhase::Drafting);

        assert!(s.cancel_shop(&kaede));
        assert_eq!(s.shop_phase(&kaede).await.unwrap(), ShopPhase::Unopened);
        assert_eq!(harness.store.snapshot(&kaede).unwrap().shop, None);
    }

    #[tokio::test]
    async fn test_npc_cannot_shop() {
        let harness = Harness::new();
        let oni = actor("oni");
        let err = harness
            .session
            .open_shop(&oni, &initiative_roll(12))
            .await
            .unwrap_err();
        assert_eq!(err, CombatError::ShopUnavailable(oni));
    }

    #[tokio::test]
    async fn test_failed_confirm_keeps_draft() {
        let harness = Harness::new();
        let kaede = actor("kaede");
        let s = &harness.session;
        s.open_shop(&kaede, &initiative_roll(12)).await.unwrap();
        s.shop_toggle(&kaede, ShopToggle::InitiativeSwap)
            .await
            .unwrap();

        harness.store.fail_next_writes(1);
        assert!(matches!(
            s.confirm_shop(&kaede).await.unwrap_err(),
            CombatError::Store(_)
        ));
        assert_eq!(s.shop_phase(&kaede).await.unwrap(), ShopPhase::Drafting);

        let record = s.confirm_shop(&kaede).await.unwrap();
        assert_eq!(record.turn_order_value(), 7);
        assert!(s.consume_initiative_swap(&kaede).await.unwrap());
        assert!(!s.consume_initiative_swap(&kaede).await.unwrap());
    }

    #[tokio::test]
    async fn test_prompted_shop() {
        let harness = Harness::new();
        let kaede = actor("kaede");
        let yuto = actor("yuto");
        let s = &harness.session;

        harness
            .choices
            .push_answer(Some(ChoiceResult::Shop(ShopSelection {
                extra_movement: 2,
                initiative_swap: false,
                extra_attack: false,
            })));
        let record = s
            .run_initiative_shop(&kaede, &initiative_roll(9))
            .await
            .unwrap();
        assert_eq!(record.turn_order_value(), 3);
        let state = s.round_state(&kaede).await.unwrap();
        assert_eq!(state.move_bonus_meters, 4);
        assert_eq!(
            *state.budget(ActionCategory::Movement),
            crate::round::Budget::new(1)
        );

        // Declining is a skip
        harness.choices.push_answer(None);
        let record = s
            .run_initiative_shop(&yuto, &initiative_roll(11))
            .await
            .unwrap();
        assert_eq!(record.phase(), ShopPhase::Skipped);
        assert_eq!(record.total_initiative(), 11);
        assert!(s.all_shops_resolved());
        assert!(harness.events.event_types().contains(&"shops_complete".to_string()));
    }

    #[tokio::test]
    async fn test_prompted_shop_over_budget() {
        let harness = Harness::new();
        let kaede = actor("kaede");
        let s = &harness.session;

        harness
            .choices
            .push_answer(Some(ChoiceResult::Shop(ShopSelection {
                extra_movement: 0,
                initiative_swap: true,
                extra_attack: true,
            })));
        let err = s
            .run_initiative_shop(&kaede, &initiative_roll(9))
            .await
            .unwrap_err();
        assert_eq!(err, over_budget(15, 9));
        assert_eq!(s.shop_phase(&kaede).await.unwrap(), ShopPhase::Unopened);
        assert_eq!(harness.store.snapshot(&kaede).unwrap().initiative, None);
    }
}
