//! dice_core - Roll & Keep dice engine with exploding d8
//!
//! This library provides:
//! - FaceSource: injectable randomness (live, seeded or scripted)
//! - roll_pool: roll a pool, keep the highest dice, check against a target number
//! - roll_damage: flat `NdS[+F]` damage rolls
//!
//! # Quick Start
//!
//! ```rust
//! use dice_core::{roll_pool, RollOptions, SeededFaces};
//!
//! let mut faces = SeededFaces::new(12345);
//! let options = RollOptions::new().against(15).with_raises(1);
//! let result = roll_pool(&mut faces, 5, 3, &options);
//! assert_eq!(result.kept().len(), 3);
//! assert_eq!(result.effective_target_number(), Some(19));
//! ```

pub mod damage;
pub mod face;
pub mod pool;

pub use damage::{
    count_max_faces, roll_damage, roll_damage_with_limits, roll_formula, roll_formula_with_limits,
    DamageFormula, DamageRoll, FormulaError,
};
pub use face::{FaceSource, RngFaces, ScriptedFaces, SeededFaces, DIE_FACES};
pub use pool::{
    roll_pool, roll_pool_with_limits, PoolLimits, RollDie, RollOptions, RollResult, TargetCheck,
};
