//! Combat errors
//!
//! Every failure is scoped to the one operation that raised it:
//! - Validation errors leave state untouched and are reported to the participant
//! - Collaborator errors (store, prompt) abort before anything is committed,
//!   so the operation can be retried

use crate::ports::ChoiceKind;
use crate::types::{ActionCategory, ActorId};
use rules_core::{AbilityError, Attribute};
use thiserror::Error;

/// How a combat error should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    /// Rejected request, nothing changed
    Validation,
    /// An external collaborator failed, nothing committed
    Collaborator,
}

/// Failure reported by the persistence port
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("No stored state for actor {0}")]
    UnknownActor(ActorId),
    #[error("Read failed: {0}")]
    Read(String),
    #[error("Write failed: {0}")]
    Write(String),
}

/// Failure reported by the choice port
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("Prompt failed: {0}")]
    Failed(String),
    #[error("Unexpected answer to {0:?} prompt")]
    UnexpectedAnswer(ChoiceKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombatError {
    #[error("{actor} has no {category} actions remaining")]
    BudgetExhausted {
        actor: ActorId,
        category: ActionCategory,
    },

    #[error("Insufficient {attribute} stones: need {cost}, have {available}")]
    InsufficientStones {
        attribute: Attribute,
        cost: u64,
        available: u32,
    },

    #[error("Unknown ability: {0}")]
    UnknownAbility(String),

    #[error("Ability '{ability}' cannot be paid with {attribute} stones")]
    AbilityNotAllowed {
        ability: String,
        attribute: Attribute,
    },

    #[error("{actor} has no {attribute} stone pool")]
    UnknownPool {
        actor: ActorId,
        attribute: Attribute,
    },

    #[error("Unknown actor: {0}")]
    UnknownActor(ActorId),

    #[error("Initiative shop is not available to {0}")]
    ShopUnavailable(ActorId),

    #[error("{0} has no open initiative shop draft")]
    ShopNotDrafting(ActorId),

    #[error("Purchase would cost {cost} initiative, only {budget} available")]
    OverBudget { cost: u32, budget: u32 },

    #[error("Nothing to remove from the draft")]
    NothingToRemove,

    #[error("Invalid stone allocation: {0}")]
    InvalidAllocation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),
}

impl CombatError {
    pub fn severity(&self) -> ErrorSeverity {
        use CombatError::*;
        match self {
            Store(StoreError::UnknownActor(_)) => ErrorSeverity::Validation,
            Store(_) | Prompt(_) => ErrorSeverity::Collaborator,
            _ => ErrorSeverity::Validation,
        }
    }

    /// Stable identifier for this error variant
    pub fn error_code(&self) -> &'static str {
        use CombatError::*;
        match self {
            BudgetExhausted { .. } => "COMBAT_BUDGET_EXHAUSTED",
            InsufficientStones { .. } => "COMBAT_INSUFFICIENT_STONES",
            UnknownAbility(_) => "COMBAT_UNKNOWN_ABILITY",
            AbilityNotAllowed { .. } => "COMBAT_ABILITY_NOT_ALLOWED",
            UnknownPool { .. } => "COMBAT_UNKNOWN_POOL",
            UnknownActor(_) => "COMBAT_UNKNOWN_ACTOR",
            ShopUnavailable(_) => "COMBAT_SHOP_UNAVAILABLE",
            ShopNotDrafting(_) => "COMBAT_SHOP_NOT_DRAFTING",
            OverBudget { .. } => "COMBAT_OVER_BUDGET",
            NothingToRemove => "COMBAT_NOTHING_TO_REMOVE",
            InvalidAllocation(_) => "COMBAT_INVALID_ALLOCATION",
            Store(_) => "COMBAT_STORE",
            Prompt(_) => "COMBAT_PROMPT",
        }
    }
}

impl From<AbilityError> for CombatError {
    fn from(e: AbilityError) -> Self {
        match e {
            AbilityError::UnknownAbility(id) => CombatError::UnknownAbility(id),
            AbilityError::AttributeNotAllowed { ability, attribute } => {
                CombatError::AbilityNotAllowed { ability, attribute }
            }
        }
    }
}

pub type CombatResult<T> = Result<T, CombatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        let exhausted = CombatError::BudgetExhausted {
            actor: ActorId::from("kaede"),
            category: ActionCategory::Attack,
        };
        assert_eq!(exhausted.severity(), ErrorSeverity::Validation);
        assert_eq!(
            exhausted.to_string(),
            "kaede has no Attack actions remaining"
        );

        let write = CombatError::from(StoreError::Write("disk full".to_string()));
        assert_eq!(write.severity(), ErrorSeverity::Collaborator);
        assert_eq!(write.error_code(), "COMBAT_STORE");

        let missing = CombatError::from(StoreError::UnknownActor(ActorId::from("ghost")));
        assert_eq!(missing.severity(), ErrorSeverity::Validation);
    }

    #[test]
    fn test_from_ability_error() {
        let err = CombatError::from(AbilityError::UnknownAbility("fireball".to_string()));
        assert_eq!(err, CombatError::UnknownAbility("fireball".to_string()));
    }
}
