//! Damage rolls - flat (non-exploding) `NdS[+F]` formulas

use crate::face::{FaceSource, DIE_FACES};
use crate::pool::PoolLimits;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Error parsing a damage formula
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("Empty damage formula")]
    Empty,
    #[error("Malformed damage formula: {0}")]
    Malformed(String),
    #[error("Unsupported die d{0} (only d8 is rolled)")]
    UnsupportedDie(u32),
}

/// A parsed damage formula: `dice`d8 plus `flat`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageFormula {
    pub dice: u32,
    pub flat: i32,
}

impl DamageFormula {
    pub fn new(dice: u32, flat: i32) -> Self {
        DamageFormula { dice, flat }
    }
}

impl FromStr for DamageFormula {
    type Err = FormulaError;

    /// Accepts `NdS`, `NdS+F`, `NdS-F`, `dS` (one die) or a bare integer literal
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(FormulaError::Empty);
        }
        let malformed = || FormulaError::Malformed(s.to_string());

        // Bare literal
        if let Ok(flat) = compact.parse::<i32>() {
            return Ok(DamageFormula::new(0, flat));
        }

        let lower = compact.to_ascii_lowercase();
        let (count, rest) = lower.split_once('d').ok_or_else(malformed)?;
        let dice = if count.is_empty() {
            1
        } else {
            count.parse::<u32>().map_err(|_| malformed())?
        };

        let split_at = rest.find(['+', '-']).unwrap_or(rest.len());
        let (sides, flat) = rest.split_at(split_at);
        let sides = sides.parse::<u32>().map_err(|_| malformed())?;
        if sides != u32::from(DIE_FACES) {
            return Err(FormulaError::UnsupportedDie(sides));
        }

        let flat = if flat.is_empty() {
            0
        } else {
            let digits = flat.trim_start_matches('+');
            digits.parse::<i32>().map_err(|_| malformed())?
        };

        Ok(DamageFormula::new(dice, flat))
    }
}

impl fmt::Display for DamageFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.dice, self.flat) {
            (0, flat) => write!(f, "{}", flat),
            (dice, 0) => write!(f, "{}d{}", dice, DIE_FACES),
            (dice, flat) if flat > 0 => write!(f, "{}d{}+{}", dice, DIE_FACES, flat),
            (dice, flat) => write!(f, "{}d{}{}", dice, DIE_FACES, flat),
        }
    }
}

/// Rolled damage: individual faces plus the flat modifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageRoll {
    pub dice: Vec<u8>,
    pub flat: i32,
    pub total: i32,
}

impl DamageRoll {
    /// Faces that came up 8
    pub fn max_faces(&self) -> usize {
        count_max_faces(&self.dice)
    }
}

/// Roll a formula with `bonus_dice` extra (or fewer, if negative) dice
///
/// Damage dice never explode. An unparseable formula is logged and rolls
/// as zero with no dice.
pub fn roll_damage(source: &mut impl FaceSource, formula: &str, bonus_dice: i32) -> DamageRoll {
    roll_damage_with_limits(source, formula, bonus_dice, &PoolLimits::default())
}

/// [`roll_damage`] with the dice count capped at `limits.max_pool`
pub fn roll_damage_with_limits(
    source: &mut impl FaceSource,
    formula: &str,
    bonus_dice: i32,
    limits: &PoolLimits,
) -> DamageRoll {
    match formula.parse::<DamageFormula>() {
        Ok(parsed) => roll_formula_with_limits(source, &parsed, bonus_dice, limits),
        Err(e) => {
            warn!(formula, error = %e, "invalid damage formula, rolling zero");
            DamageRoll::default()
        }
    }
}

/// Roll an already parsed formula
pub fn roll_formula(
    source: &mut impl FaceSource,
    formula: &DamageFormula,
    bonus_dice: i32,
) -> DamageRoll {
    roll_formula_with_limits(source, formula, bonus_dice, &PoolLimits::default())
}

/// Roll an already parsed formula, rolling at most `limits.max_pool` dice
pub fn roll_formula_with_limits(
    source: &mut impl FaceSource,
    formula: &DamageFormula,
    bonus_dice: i32,
    limits: &PoolLimits,
) -> DamageRoll {
    let requested = (i64::from(formula.dice) + i64::from(bonus_dice)).max(0);
    let count = requested.min(i64::from(limits.max_pool));
    if count < requested {
        warn!(requested, max = limits.max_pool, "damage dice clamped");
    }

    let dice: Vec<u8> = (0..count).map(|_| source.roll_face()).collect();
    let rolled: i64 = dice.iter().map(|&f| i64::from(f)).sum();
    let total = rolled.saturating_add(i64::from(formula.flat));

    DamageRoll {
        total: total.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
        flat: formula.flat,
        dice,
    }
}

/// Count faces equal to 8 in a flat roll set
pub fn count_max_faces(rolls: &[u8]) -> usize {
    rolls.iter().filter(|&&f| f == DIE_FACES).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::{ScriptedFaces, SeededFaces};

    fn parse(formula: &str) -> Result<DamageFormula, FormulaError> {
        formula.parse()
    }

    #[test]
    fn test_parse_formulas() {
        assert_eq!(parse("2d8+3"), Ok(DamageFormula::new(2, 3)));
        assert_eq!(parse("1D8 - 1"), Ok(DamageFormula::new(1, -1)));
        assert_eq!(parse("d8"), Ok(DamageFormula::new(1, 0)));
        assert_eq!(parse("4d8"), Ok(DamageFormula::new(4, 0)));
        assert_eq!(parse("5"), Ok(DamageFormula::new(0, 5)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse(""), Err(FormulaError::Empty));
        assert_eq!(parse("2d6"), Err(FormulaError::UnsupportedDie(6)));
        assert!(matches!(parse("xd8"), Err(FormulaError::Malformed(_))));
        assert!(matches!(parse("2d8+q"), Err(FormulaError::Malformed(_))));
    }

    #[test]
    fn test_display_roundtrips_shape() {
        assert_eq!(DamageFormula::new(2, 3).to_string(), "2d8+3");
        assert_eq!(DamageFormula::new(1, -2).to_string(), "1d8-2");
        assert_eq!(DamageFormula::new(0, 4).to_string(), "4");
    }

    #[test]
    fn test_roll_damage_does_not_explode() {
        let mut faces = ScriptedFaces::new([8, 3, 5]);
        let roll = roll_damage(&mut faces, "2d8+1", 0);
        assert_eq!(roll.dice, vec![8, 3]);
        assert_eq!(roll.total, 12);
        assert_eq!(faces.remaining(), 1);
    }

    #[test]
    fn test_bonus_dice() {
        let mut faces = ScriptedFaces::new([2, 2, 2]);
        let roll = roll_damage(&mut faces, "1d8", 2);
        assert_eq!(roll.dice.len(), 3);
        assert_eq!(roll.total, 6);

        let mut faces = ScriptedFaces::new([4]);
        let none = roll_damage(&mut faces, "1d8+2", -3);
        assert!(none.dice.is_empty());
        assert_eq!(none.total, 2);
    }

    #[test]
    fn test_flat_literal() {
        let mut faces = ScriptedFaces::new([]);
        let roll = roll_damage(&mut faces, "7", 0);
        assert!(roll.dice.is_empty());
        assert_eq!(roll.total, 7);
    }

    #[test]
    fn test_invalid_formula_rolls_zero() {
        let mut faces = ScriptedFaces::new([8]);
        let roll = roll_damage(&mut faces, "lots of damage", 1);
        assert_eq!(roll, DamageRoll::default());
        assert_eq!(faces.remaining(), 1);
    }

    #[test]
    fn test_count_max_faces() {
        assert_eq!(count_max_faces(&[8, 1, 8, 7]), 2);
        assert_eq!(count_max_faces(&[]), 0);

        let mut faces = ScriptedFaces::new([8, 8, 4]);
        assert_eq!(roll_damage(&mut faces, "3d8", 0).max_faces(), 2);
    }

    #[test]
    fn test_huge_formula_is_clamped() {
        let mut faces = SeededFaces::new(7);
        let roll = roll_damage(&mut faces, "270000000d8+5", 0);
        assert_eq!(roll.dice.len(), 40);
        assert!((45..=325).contains(&roll.total));

        let limits = PoolLimits {
            max_pool: 3,
            ..PoolLimits::default()
        };
        let mut faces = ScriptedFaces::new([8, 8, 8, 8]);
        let roll = roll_damage_with_limits(&mut faces, "10d8", 2, &limits);
        assert_eq!(roll.dice, vec![8, 8, 8]);
        assert_eq!(roll.total, 24);
        assert_eq!(faces.remaining(), 1);
    }
}
