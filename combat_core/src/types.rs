//! Core identifiers shared across the combat economy

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an actor/combatant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        ActorId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        ActorId(s.to_string())
    }
}

impl From<String> for ActorId {
    fn from(s: String) -> Self {
        ActorId(s)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-round action categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Movement,
    Attack,
    Reaction,
}

impl ActionCategory {
    /// Get all action categories
    pub fn all() -> &'static [ActionCategory] {
        &[
            ActionCategory::Movement,
            ActionCategory::Attack,
            ActionCategory::Reaction,
        ]
    }
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionCategory::Movement => write!(f, "Movement"),
            ActionCategory::Attack => write!(f, "Attack"),
            ActionCategory::Reaction => write!(f, "Reaction"),
        }
    }
}

/// A combatant taking part in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ActorId,
    /// Player-controlled participants shop for initiative and regenerate stones
    pub player_controlled: bool,
}

impl Participant {
    pub fn player(id: impl Into<ActorId>) -> Self {
        Participant {
            id: id.into(),
            player_controlled: true,
        }
    }

    pub fn npc(id: impl Into<ActorId>) -> Self {
        Participant {
            id: id.into(),
            player_controlled: false,
        }
    }
}
