//! Collaborator ports
//!
//! The economy never renders UI or talks to a character sheet directly.
//! Choices, broadcasts and character values come in through these traits.

use crate::error::PromptError;
use crate::shop::{ShopPurchase, ShopSelection};
use crate::stones::StonePool;
use crate::types::ActorId;
use async_trait::async_trait;
use rules_core::{Attribute, ShopConstants};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// Interactive decisions the economy asks a participant to make
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceKind {
    InitiativeShop,
    StoneRegeneration,
}

/// What the participant is shown when prompted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChoiceContext {
    InitiativeShop {
        actor: ActorId,
        total_initiative: i32,
        prices: ShopConstants,
    },
    StoneRegeneration {
        actor: ActorId,
        points: u32,
        pools: BTreeMap<Attribute, StonePool>,
    },
}

impl ChoiceContext {
    pub fn kind(&self) -> ChoiceKind {
        match self {
            ChoiceContext::InitiativeShop { .. } => ChoiceKind::InitiativeShop,
            ChoiceContext::StoneRegeneration { .. } => ChoiceKind::StoneRegeneration,
        }
    }
}

/// A participant's answer to a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceResult {
    Shop(ShopSelection),
    /// Points per attribute pool
    Regeneration(BTreeMap<Attribute, u32>),
}

/// Asks a participant to decide something
///
/// `Ok(None)` means the participant declined or cancelled. The wait is
/// unbounded; implementations decide how a participant walks away.
#[async_trait]
pub trait ChoicePort: Send + Sync {
    async fn prompt_choice(
        &self,
        kind: ChoiceKind,
        context: ChoiceContext,
    ) -> Result<Option<ChoiceResult>, PromptError>;
}

/// Declines every prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct NoChoices;

#[async_trait]
impl ChoicePort for NoChoices {
    async fn prompt_choice(
        &self,
        _kind: ChoiceKind,
        _context: ChoiceContext,
    ) -> Result<Option<ChoiceResult>, PromptError> {
        Ok(None)
    }
}

/// Fan-out of combat events to whoever is facilitating
pub trait Broadcaster: Send + Sync {
    fn notify(&self, event_type: &str, payload: serde_json::Value);
}

/// Writes events to the tracing stream
#[derive(Debug, Clone, Copy, Default)]
pub struct LogBroadcaster;

impl Broadcaster for LogBroadcaster {
    fn notify(&self, event_type: &str, payload: serde_json::Value) {
        info!(event = event_type, %payload, "combat event");
    }
}

/// Events the session broadcasts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CombatEvent {
    ShopConfirmed {
        actor: ActorId,
        round: u32,
        turn_order_value: i32,
        purchase: ShopPurchase,
    },
    ShopSkipped {
        actor: ActorId,
        round: u32,
        initiative: i32,
    },
    /// Every player-controlled participant has resolved the round's shop
    ShopsComplete { round: u32 },
    RoundStarted { round: u32 },
    TurnStarted { round: u32, turn: u32 },
    CombatEnded { round: u32 },
    StonesRegenerated {
        actor: ActorId,
        allocation: BTreeMap<Attribute, u32>,
    },
}

impl CombatEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            CombatEvent::ShopConfirmed { .. } => "shop_confirmed",
            CombatEvent::ShopSkipped { .. } => "shop_skipped",
            CombatEvent::ShopsComplete { .. } => "shops_complete",
            CombatEvent::RoundStarted { .. } => "round_started",
            CombatEvent::TurnStarted { .. } => "turn_started",
            CombatEvent::CombatEnded { .. } => "combat_ended",
            CombatEvent::StonesRegenerated { .. } => "stones_regenerated",
        }
    }
}

/// Read-only values owned by other subsystems
pub trait CharacterSource: Send + Sync {
    /// Dice removed from every pool the actor rolls
    fn wound_penalty(&self, actor: &ActorId) -> u32;

    /// Stone points the actor may regenerate at the end of a round
    fn mastery_rank(&self, actor: &ActorId) -> u32;
}

/// Fixed character values; unknown actors read as zero
#[derive(Debug, Clone, Default)]
pub struct StaticCharacters {
    wounds: HashMap<ActorId, u32>,
    mastery: HashMap<ActorId, u32>,
}

impl StaticCharacters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wound_penalty(mut self, actor: impl Into<ActorId>, penalty: u32) -> Self {
        self.wounds.insert(actor.into(), penalty);
        self
    }

    pub fn with_mastery_rank(mut self, actor: impl Into<ActorId>, rank: u32) -> Self {
        self.mastery.insert(actor.into(), rank);
        self
    }
}

impl CharacterSource for StaticCharacters {
    fn wound_penalty(&self, actor: &ActorId) -> u32 {
        self.wounds.get(actor).copied().unwrap_or(0)
    }

    fn mastery_rank(&self, actor: &ActorId) -> u32 {
        self.mastery.get(actor).copied().unwrap_or(0)
    }
}
