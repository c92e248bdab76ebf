use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute a stone pool belongs to (e.g. "fire", "water")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attribute(pub String);

impl Attribute {
    pub fn new(name: impl Into<String>) -> Self {
        Attribute(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Attribute {
    fn from(s: &str) -> Self {
        Attribute(s.to_string())
    }
}

impl From<String> for Attribute {
    fn from(s: String) -> Self {
        Attribute(s)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a stone ability does to the spender's round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoneEffect {
    /// Raise the attack action total
    ExtraAttack { amount: u32 },
    /// Raise the reaction action total
    ExtraReaction { amount: u32 },
    /// Add movement distance
    ExtraMovement { meters: u32 },
    /// Extra dice on the next pool roll
    BonusDice { amount: u32 },
    /// Flat bonus on the next pool roll
    FlatBonus { amount: i32 },
    /// Resolved outside the round ledger; only the cost is paid here
    Narrative,
}

impl Default for StoneEffect {
    fn default() -> Self {
        StoneEffect::Narrative
    }
}

/// A stone ability entry from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityDef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Attributes whose stones may pay for this ability; empty means any
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub effect: StoneEffect,
}

impl AbilityDef {
    pub fn new(id: impl Into<String>, effect: StoneEffect) -> Self {
        let id = id.into();
        AbilityDef {
            name: id.clone(),
            id,
            attributes: Vec::new(),
            effect,
        }
    }

    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = Attribute>) -> Self {
        self.attributes = attributes.into_iter().collect();
        self
    }

    /// Whether stones of `attribute` can pay for this ability
    pub fn allows(&self, attribute: &Attribute) -> bool {
        self.attributes.is_empty() || self.attributes.contains(attribute)
    }
}
