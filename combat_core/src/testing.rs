//! Test fixtures: scripted prompts, recorded broadcasts and a ready session

use crate::error::{PromptError, StoreError};
use crate::ports::{
    Broadcaster, ChoiceContext, ChoiceKind, ChoicePort, ChoiceResult, StaticCharacters,
};
use crate::session::CombatSession;
use crate::stones::StonePool;
use crate::store::{ActorState, MemoryStore, StateStore, StateUpdate};
use crate::types::{ActorId, Participant};
use async_trait::async_trait;
use dice_core::{roll_pool, RollOptions, RollResult, ScriptedFaces};
use rules_core::{AbilityCatalog, AbilityDef, Attribute, StoneEffect};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Log to the test writer; filter with RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn actor(id: &str) -> ActorId {
    ActorId::from(id)
}

/// A single-die roll totalling exactly `total`
pub fn initiative_roll(total: i32) -> RollResult {
    let mut faces = ScriptedFaces::new([1]);
    let options = RollOptions::new().with_flat_bonus(total - 1);
    roll_pool(&mut faces, 1, 1, &options)
}

/// Yields before every read, so concurrent operations on one task
/// interleave between reading a state and writing it back
pub struct YieldingStore {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl StateStore for YieldingStore {
    async fn get_state(&self, actor: &ActorId) -> Result<ActorState, StoreError> {
        tokio::task::yield_now().await;
        self.inner.get_state(actor).await
    }

    async fn set_state(&self, actor: &ActorId, update: StateUpdate) -> Result<(), StoreError> {
        self.inner.set_state(actor, update).await
    }
}

/// Answers prompts from a queue; an empty queue declines
#[derive(Default)]
pub struct ScriptedChoices {
    answers: Mutex<VecDeque<Result<Option<ChoiceResult>, PromptError>>>,
    prompts: Mutex<Vec<ChoiceContext>>,
}

impl ScriptedChoices {
    pub fn push_answer(&self, answer: Option<ChoiceResult>) {
        self.answers.lock().unwrap().push_back(Ok(answer));
    }

    pub fn push_error(&self, message: &str) {
        self.answers
            .lock()
            .unwrap()
            .push_back(Err(PromptError::Failed(message.to_string())));
    }

    pub fn prompts(&self) -> Vec<ChoiceContext> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChoicePort for ScriptedChoices {
    async fn prompt_choice(
        &self,
        kind: ChoiceKind,
        context: ChoiceContext,
    ) -> Result<Option<ChoiceResult>, PromptError> {
        assert_eq!(context.kind(), kind);
        self.prompts.lock().unwrap().push(context);
        self.answers.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    events: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingBroadcaster {
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(event_type, _)| event_type.clone())
            .collect()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn notify(&self, event_type: &str, payload: serde_json::Value) {
        self.events
            .lock()
            .unwrap()
            .push((event_type.to_string(), payload));
    }
}

fn test_catalog() -> AbilityCatalog {
    AbilityCatalog::from_defs([
        AbilityDef::new("focus", StoneEffect::Narrative),
        AbilityDef::new("press_the_attack", StoneEffect::ExtraAttack { amount: 1 })
            .with_attributes([Attribute::from("fire")]),
        AbilityDef::new("steady_hand", StoneEffect::BonusDice { amount: 1 }),
        AbilityDef::new("sharpen", StoneEffect::FlatBonus { amount: 2 }),
    ])
    .unwrap()
}

/// Two players (kaede, yuto) and one NPC (oni), each with 5 fire and 3 water stones
pub struct Harness {
    pub session: CombatSession,
    pub store: Arc<MemoryStore>,
    pub choices: Arc<ScriptedChoices>,
    pub events: Arc<RecordingBroadcaster>,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        for id in ["kaede", "yuto", "oni"] {
            store.insert(
                id,
                ActorState::new()
                    .with_pool(Attribute::from("fire"), StonePool::new(5))
                    .with_pool(Attribute::from("water"), StonePool::new(3)),
            );
        }

        let choices = Arc::new(ScriptedChoices::default());
        let events = Arc::new(RecordingBroadcaster::default());
        let characters = StaticCharacters::new()
            .with_mastery_rank("kaede", 2)
            .with_mastery_rank("yuto", 1)
            .with_wound_penalty("yuto", 2);

        let session = CombatSession::new(
            vec![
                Participant::player("kaede"),
                Participant::player("yuto"),
                Participant::npc("oni"),
            ],
            Arc::new(YieldingStore {
                inner: store.clone(),
            }),
        )
        .with_catalog(test_catalog())
        .with_choices(choices.clone())
        .with_broadcaster(events.clone())
        .with_characters(Arc::new(characters));

        Harness {
            session,
            store,
            choices,
            events,
        }
    }
}
