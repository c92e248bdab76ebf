//! Lifecycle orchestration
//!
//! Combat start, turn change, round change and combat end. Transitions are
//! serialized and hold the clock for writing while actor state is advanced,
//! so no operation sees a half-advanced round or turn. Every participant's
//! write commits or none does; the clock moves only after all of them.

use crate::error::{CombatError, CombatResult};
use crate::ports::CombatEvent;
use crate::round::RoundState;
use crate::session::CombatSession;
use crate::stones::{restored_stones, RegenOutcome, StoneUsageLedger};
use crate::store::{ActorState, CombatClock, StateUpdate};
use crate::types::{ActorId, Participant};
use rules_core::Attribute;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// What happened to each player's stones at a round change
#[derive(Debug, Default)]
pub struct RoundReport {
    pub round: u32,
    pub regenerated: BTreeMap<ActorId, BTreeMap<Attribute, u32>>,
    /// Declined, or nothing to regenerate
    pub declined: Vec<ActorId>,
    /// Regeneration failed; the round change itself still happened
    pub failed: Vec<(ActorId, CombatError)>,
}

impl CombatSession {
    /// Start (or restart) combat at round 1, turn 1
    ///
    /// Shop purchases already confirmed for round 1 are applied to players.
    pub async fn on_combat_start(&self) -> CombatResult<()> {
        let _transition = self.transition.lock().await;
        let mut clock = self.clock.write().await;
        let start = CombatClock::default();

        let mut resolved = Vec::new();
        self.commit_all(&self.participant_ids(), |actor, state| {
            if state.shop_for(start.round).is_some() {
                resolved.push(actor.clone());
            }
            let round_state = self.fresh_round_state(self.participant(actor)?, state, start);
            Ok(StateUpdate::new()
                .round_state(round_state)
                .ledger(StoneUsageLedger::new()))
        })
        .await?;

        *clock = start;
        self.reset_pending_shop(&resolved);
        info!(participants = self.participants().len(), "combat started");
        self.emit(CombatEvent::RoundStarted { round: start.round });
        Ok(())
    }

    /// Advance to the next turn of the round
    ///
    /// Used counts reset; stone prices for the ending turn are forgotten.
    pub async fn on_turn_change(&self) -> CombatResult<CombatClock> {
        let _transition = self.transition.lock().await;
        let mut clock = self.clock.write().await;
        let ending = *clock;
        let next = CombatClock {
            round: ending.round,
            turn: ending.turn + 1,
        };

        self.commit_all(&self.participant_ids(), |_, state| {
            let mut round_state = state.round_state_for(next, &self.rules().budgets);
            round_state.reset_turn(next.turn);
            let mut ledger = state.ledger.clone();
            ledger.purge_turn(ending.round, ending.turn);
            Ok(StateUpdate::new().round_state(round_state).ledger(ledger))
        })
        .await?;

        *clock = next;
        info!(round = next.round, turn = next.turn, "turn started");
        self.emit(CombatEvent::TurnStarted {
            round: next.round,
            turn: next.turn,
        });
        Ok(next)
    }

    /// Advance to turn 1 of the next round
    ///
    /// Round states are rebuilt, then each player is asked to regenerate
    /// stones. The shop reopens for everyone.
    pub async fn on_round_change(&self) -> CombatResult<RoundReport> {
        let _transition = self.transition.lock().await;
        let next = {
            let mut clock = self.clock.write().await;
            let ending = *clock;
            let next = CombatClock {
                round: ending.round + 1,
                turn: 1,
            };

            self.commit_all(&self.participant_ids(), |actor, state| {
                let round_state = self.fresh_round_state(self.participant(actor)?, state, next);
                let mut ledger = state.ledger.clone();
                ledger.purge_turn(ending.round, ending.turn);
                Ok(StateUpdate::new().round_state(round_state).ledger(ledger))
            })
            .await?;

            *clock = next;
            next
        };

        self.clear_drafts();
        self.reset_pending_shop(&[]);
        info!(round = next.round, "round started");
        self.emit(CombatEvent::RoundStarted { round: next.round });

        // Prompts run without the clock held
        let mut report = RoundReport {
            round: next.round,
            ..Default::default()
        };
        for participant in self.participants().iter().filter(|p| p.player_controlled) {
            let actor = &participant.id;
            let points = self.characters.mastery_rank(actor);
            match self.regenerate_end_of_round(actor, points).await {
                Ok(RegenOutcome::Regenerated(allocation)) => {
                    report.regenerated.insert(actor.clone(), allocation);
                }
                Ok(RegenOutcome::Declined | RegenOutcome::NothingToRegenerate) => {
                    report.declined.push(actor.clone());
                }
                Err(e) => {
                    warn!(actor = %actor, error = %e, "stone regeneration failed");
                    report.failed.push((actor.clone(), e));
                }
            }
        }
        Ok(report)
    }

    /// Refill stones and drop all per-combat state
    ///
    /// Stones are restored as [`CombatSession::restore_after_combat`] does,
    /// in the same write that clears the rest.
    pub async fn on_combat_end(&self) -> CombatResult<()> {
        let _transition = self.transition.lock().await;
        let mut clock = self.clock.write().await;
        let ended = *clock;

        self.commit_all(&self.participant_ids(), |_, state| {
            Ok(StateUpdate::new()
                .stones(restored_stones(&state.stones))
                .clear_round_state()
                .ledger(StoneUsageLedger::new())
                .shop(None)
                .initiative(None))
        })
        .await?;

        *clock = CombatClock::default();
        self.clear_drafts();
        self.reset_pending_shop(&[]);
        info!(rounds = ended.round, "combat ended");
        self.emit(CombatEvent::CombatEnded { round: ended.round });
        Ok(())
    }

    /// Default round state plus, for players, the shop purchase confirmed for `clock.round`
    pub(crate) fn fresh_round_state(
        &self,
        participant: &Participant,
        state: &ActorState,
        clock: CombatClock,
    ) -> RoundState {
        let mut round_state = RoundState::new(clock.round, clock.turn, &self.rules().budgets);
        if participant.player_controlled {
            if let Some(purchase) = state.shop_for(clock.round).and_then(|r| r.purchase()) {
                let increment = self.rules().shop.movement_increment_meters;
                round_state.apply_shop_purchase(purchase, increment);
            }
        }
        round_state
    }
}
