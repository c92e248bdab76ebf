//! Combat session context
//!
//! One [`CombatSession`] per combat. It owns the participant list, the
//! rules, the collaborator ports and the clock; nothing is process-global.
//!
//! Locking order is always clock, then actor. Each actor has its own async
//! lock so read-validate-write sequences on one actor never interleave,
//! while different actors proceed independently.

use crate::error::{CombatError, CombatResult};
use crate::ports::{
    Broadcaster, CharacterSource, ChoicePort, CombatEvent, LogBroadcaster, NoChoices,
    StaticCharacters,
};
use crate::shop::ShopDraft;
use crate::store::{ActorState, CombatClock, StateStore, StateUpdate};
use crate::types::{ActorId, Participant};
use dice_core::{roll_pool_with_limits, FaceSource, RollOptions, RollResult};
use rules_core::{AbilityCatalog, RulesConfig};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

pub struct CombatSession {
    participants: Vec<Participant>,
    rules: RulesConfig,
    catalog: AbilityCatalog,
    store: Arc<dyn StateStore>,
    pub(crate) choices: Arc<dyn ChoicePort>,
    broadcaster: Arc<dyn Broadcaster>,
    pub(crate) characters: Arc<dyn CharacterSource>,
    pub(crate) clock: RwLock<CombatClock>,
    /// Serializes round/turn transitions
    pub(crate) transition: AsyncMutex<()>,
    actor_locks: Mutex<HashMap<ActorId, Arc<AsyncMutex<()>>>>,
    drafts: Mutex<HashMap<ActorId, ShopDraft>>,
    pending_shop: Mutex<BTreeSet<ActorId>>,
}

impl CombatSession {
    /// Session with default rules, an empty catalog, no prompts and log-only broadcasts
    pub fn new(participants: Vec<Participant>, store: Arc<dyn StateStore>) -> Self {
        let pending = participants
            .iter()
            .filter(|p| p.player_controlled)
            .map(|p| p.id.clone())
            .collect();

        CombatSession {
            participants,
            rules: RulesConfig::default(),
            catalog: AbilityCatalog::new(),
            store,
            choices: Arc::new(NoChoices),
            broadcaster: Arc::new(LogBroadcaster),
            characters: Arc::new(StaticCharacters::new()),
            clock: RwLock::new(CombatClock::default()),
            transition: AsyncMutex::new(()),
            actor_locks: Mutex::new(HashMap::new()),
            drafts: Mutex::new(HashMap::new()),
            pending_shop: Mutex::new(pending),
        }
    }

    pub fn with_rules(mut self, rules: RulesConfig) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_catalog(mut self, catalog: AbilityCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_choices(mut self, choices: Arc<dyn ChoicePort>) -> Self {
        self.choices = choices;
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn with_characters(mut self, characters: Arc<dyn CharacterSource>) -> Self {
        self.characters = characters;
        self
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn rules(&self) -> &RulesConfig {
        &self.rules
    }

    pub fn catalog(&self) -> &AbilityCatalog {
        &self.catalog
    }

    pub async fn clock(&self) -> CombatClock {
        *self.clock.read().await
    }

    pub fn participant(&self, actor: &ActorId) -> CombatResult<&Participant> {
        self.participants
            .iter()
            .find(|p| &p.id == actor)
            .ok_or_else(|| CombatError::UnknownActor(actor.clone()))
    }

    /// Roll a check for `actor`
    ///
    /// The wound penalty comes from the character source. Any stone bonus
    /// bought this round is consumed by this roll.
    pub async fn roll_check(
        &self,
        actor: &ActorId,
        source: &mut impl FaceSource,
        pool_size: u32,
        keep: u32,
        options: RollOptions,
    ) -> CombatResult<RollResult> {
        self.participant(actor)?;
        let wound_penalty = options
            .wound_penalty
            .saturating_add(self.characters.wound_penalty(actor));
        let mut options = options.with_wound_penalty(wound_penalty);
        let mut pool_size = pool_size;

        let clock = self.clock.read().await;
        let _guard = self.lock_actor(actor).await;
        let state = self.load(actor).await?;
        let mut round_state = state.round_state_for(*clock, &self.rules.budgets);
        if let Some(bonus) = round_state.take_stone_bonus() {
            self.save(actor, StateUpdate::new().round_state(round_state))
                .await?;
            pool_size = pool_size.saturating_add(bonus.bonus_dice);
            options.flat_bonus = options.flat_bonus.saturating_add(bonus.flat_bonus);
            debug!(
                actor = %actor,
                bonus_dice = bonus.bonus_dice,
                flat_bonus = bonus.flat_bonus,
                "stone bonus consumed"
            );
        }

        let limits = self.rules.pool_limits();
        let result = roll_pool_with_limits(source, pool_size, keep, &options, &limits);
        debug!(
            actor = %actor,
            total = result.total(),
            success = ?result.success(),
            "rolled check"
        );
        Ok(result)
    }

    /// Participants by stored initiative, highest first
    ///
    /// Ties and participants without initiative keep join order, the latter last.
    pub async fn turn_order(&self) -> CombatResult<Vec<ActorId>> {
        let _clock = self.clock.read().await;
        let mut order = Vec::with_capacity(self.participants.len());
        for participant in &self.participants {
            let state = self.load(&participant.id).await?;
            order.push((participant.id.clone(), state.initiative));
        }
        // Stable sort keeps join order for equal keys
        order.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(order.into_iter().map(|(id, _)| id).collect())
    }

    /// Player-controlled participants that still owe a shop decision this round
    pub fn pending_shop(&self) -> Vec<ActorId> {
        self.pending().iter().cloned().collect()
    }

    pub fn all_shops_resolved(&self) -> bool {
        self.pending().is_empty()
    }

    pub(crate) fn reset_pending_shop(&self, resolved: &[ActorId]) {
        let mut pending = self.pending();
        *pending = self
            .participants
            .iter()
            .filter(|p| p.player_controlled && !resolved.contains(&p.id))
            .map(|p| p.id.clone())
            .collect();
    }

    pub(crate) fn mark_shop_resolved(&self, actor: &ActorId, round: u32) {
        let complete = {
            let mut pending = self.pending();
            pending.remove(actor) && pending.is_empty()
        };
        if complete {
            info!(round, "all initiative shops resolved");
            self.emit(CombatEvent::ShopsComplete { round });
        }
    }

    pub(crate) fn clear_drafts(&self) {
        self.drafts().clear();
    }

    pub(crate) fn drafts(&self) -> MutexGuard<'_, HashMap<ActorId, ShopDraft>> {
        self.drafts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, BTreeSet<ActorId>> {
        self.pending_shop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access to one actor's state
    pub(crate) async fn lock_actor(&self, actor: &ActorId) -> OwnedMutexGuard<()> {
        let lock = self
            .actor_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(actor.clone())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    pub(crate) fn participant_ids(&self) -> Vec<ActorId> {
        self.participants.iter().map(|p| p.id.clone()).collect()
    }

    /// Write one staged update per actor, all or nothing
    ///
    /// Every actor is locked and loaded before anything is written, so a
    /// failed read commits nothing. If a write fails, actors already written
    /// get their previous state back before the error is returned.
    pub(crate) async fn commit_all<F>(&self, actors: &[ActorId], mut stage: F) -> CombatResult<()>
    where
        F: FnMut(&ActorId, &ActorState) -> CombatResult<StateUpdate>,
    {
        // Sorted, so concurrent multi-actor commits lock in the same order
        let actors: BTreeSet<&ActorId> = actors.iter().collect();
        let mut guards = Vec::with_capacity(actors.len());
        for actor in &actors {
            guards.push(self.lock_actor(actor).await);
        }

        let mut staged = Vec::with_capacity(actors.len());
        for actor in actors {
            let previous = self.load(actor).await?;
            let update = stage(actor, &previous)?;
            staged.push((actor, previous, update));
        }

        for (written, (actor, _, update)) in staged.iter().enumerate() {
            if let Err(e) = self.save(actor, update.clone()).await {
                self.roll_back(&staged[..written]).await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn roll_back(&self, written: &[(&ActorId, ActorState, StateUpdate)]) {
        for (actor, previous, _) in written.iter().rev() {
            let restore = StateUpdate::restore(previous.clone());
            match self.save(actor, restore).await {
                Ok(()) => debug!(actor = %actor, "write rolled back"),
                Err(e) => warn!(actor = %actor, error = %e, "rollback failed"),
            }
        }
    }

    pub(crate) async fn load(&self, actor: &ActorId) -> CombatResult<ActorState> {
        Ok(self.store.get_state(actor).await?)
    }

    pub(crate) async fn save(&self, actor: &ActorId, update: StateUpdate) -> CombatResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        self.store.set_state(actor, update).await.map_err(|e| {
            warn!(actor = %actor, error = %e, "state write failed");
            CombatError::from(e)
        })
    }

    pub(crate) fn emit(&self, event: CombatEvent) {
        match serde_json::to_value(&event) {
            Ok(payload) => self.broadcaster.notify(event.event_type(), payload),
            Err(e) => warn!(event = event.event_type(), error = %e, "failed to encode event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actor, initiative_roll, Harness};
    use crate::types::ActionCategory;
    use dice_core::ScriptedFaces;
    use rules_core::Attribute;

    #[tokio::test]
    async fn test_roll_check_applies_wound_penalty() {
        let harness = Harness::new();
        // yuto carries a 2-die wound penalty
        let mut faces = ScriptedFaces::new([3, 5, 2, 7]);
        let result = harness
            .session
            .roll_check(&actor("yuto"), &mut faces, 4, 2, RollOptions::new())
            .await
            .unwrap();
        assert_eq!(result.dice().len(), 2);
        assert_eq!(result.total(), 8);
    }

    #[tokio::test]
    async fn test_roll_check_consumes_stone_bonus() {
        let harness = Harness::new();
        let kaede = actor("kaede");
        let fire = Attribute::from("fire");
        harness
            .session
            .spend_catalog_ability(&kaede, &fire, "steady_hand")
            .await
            .unwrap();
        harness
            .session
            .spend_catalog_ability(&kaede, &fire, "sharpen")
            .await
            .unwrap();

        let mut faces = ScriptedFaces::new([3, 5, 2]);
        let result = harness
            .session
            .roll_check(&kaede, &mut faces, 2, 2, RollOptions::new().against(10))
            .await
            .unwrap();
        // One bonus die rolled, kept 2 of [3, 5, 2], +2 flat
        assert_eq!(result.dice().len(), 3);
        assert_eq!(result.kept(), &[5, 3]);
        assert_eq!(result.total(), 10);
        assert_eq!(result.success(), Some(true));

        let state = harness.session.round_state(&kaede).await.unwrap();
        assert!(state.stone_bonus.is_none());
    }

    #[tokio::test]
    async fn test_turn_order() {
        let harness = Harness::new();
        let s = &harness.session;
        s.skip_shop(&actor("yuto"), &initiative_roll(12))
            .await
            .unwrap();
        s.skip_shop(&actor("kaede"), &initiative_roll(12))
            .await
            .unwrap();

        // oni has no initiative yet and sorts last; kaede joined first
        let order = s.turn_order().await.unwrap();
        assert_eq!(order, vec![actor("kaede"), actor("yuto"), actor("oni")]);
    }

    #[tokio::test]
    async fn test_turn_order_waits_for_transition() {
        let harness = Harness::new();
        let s = &harness.session;
        s.skip_shop(&actor("yuto"), &initiative_roll(12))
            .await
            .unwrap();

        let clock = s.clock.write().await;
        let mut order = std::pin::pin!(s.turn_order());
        let finished = tokio::select! {
            biased;
            _ = &mut order => true,
            _ = std::future::ready(()) => false,
        };
        assert!(!finished);

        drop(clock);
        assert_eq!(order.await.unwrap()[0], actor("yuto"));
    }

    #[tokio::test]
    async fn test_commit_all_rolls_back_written_actors() {
        let harness = Harness::new();
        let s = &harness.session;
        let before = harness.store.snapshot(&actor("kaede")).unwrap();
        harness.store.fail_writes_for("yuto");

        let ids = s.participant_ids();
        let update = StateUpdate::new().initiative(Some(20));
        let err = s
            .commit_all(&ids, |_, _| Ok(update.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "COMBAT_STORE");
        assert_eq!(harness.store.snapshot(&actor("kaede")).unwrap(), before);
        let oni = harness.store.snapshot(&actor("oni")).unwrap();
        assert_eq!(oni.initiative, None);
    }

    #[tokio::test]
    async fn test_pending_shop_tracking() {
        let harness = Harness::new();
        let s = &harness.session;
        assert_eq!(s.pending_shop(), vec![actor("kaede"), actor("yuto")]);

        s.skip_shop(&actor("kaede"), &initiative_roll(8))
            .await
            .unwrap();
        assert_eq!(s.pending_shop(), vec![actor("yuto")]);
        assert!(!s.all_shops_resolved());
        assert!(!harness.events.event_types().contains(&"shops_complete".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_actor() {
        let harness = Harness::new();
        let err = harness
            .session
            .apply_bonus(&actor("ghost"), ActionCategory::Attack, 1)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "COMBAT_UNKNOWN_ACTOR");
    }
}
