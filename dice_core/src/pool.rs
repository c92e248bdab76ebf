//! Pool rolls - Roll & Keep with exploding d8
//!
//! Resolution order for one pool:
//! 1. Roll every die, exploding on 8 (the chain continues while 8s come up)
//! 2. Advantage: reroll once any die whose first face was a 1
//! 3. Disadvantage: every exploded die except the single highest is capped at a flat 8
//! 4. Sort by total descending, ties by ascending die index
//! 5. Keep the top `keep` dice, the rest are dropped
//! 6. total = sum(kept) + flat bonus
//! 7. Against a target number: effective TN = TN + raise_step * raises

use crate::face::{FaceSource, DIE_FACES};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hard limits applied to pool rolls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolLimits {
    /// Largest pool that will be rolled
    pub max_pool: u32,
    /// Largest number of dice that can be kept
    pub max_keep: u32,
    /// Target number increase per declared raise
    pub raise_step: i32,
}

impl Default for PoolLimits {
    fn default() -> Self {
        PoolLimits {
            max_pool: 40,
            max_keep: 8,
            raise_step: 4,
        }
    }
}

/// Modifiers for a single pool roll
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollOptions {
    pub flat_bonus: i32,
    pub advantage: bool,
    pub disadvantage: bool,
    pub target_number: Option<i32>,
    pub declared_raises: u32,
    /// Dice removed from the pool before clamping (never below one die)
    pub wound_penalty: u32,
}

impl RollOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flat_bonus(mut self, flat_bonus: i32) -> Self {
        self.flat_bonus = flat_bonus;
        self
    }

    pub fn with_advantage(mut self) -> Self {
        self.advantage = true;
        self
    }

    pub fn with_disadvantage(mut self) -> Self {
        self.disadvantage = true;
        self
    }

    pub fn against(mut self, target_number: i32) -> Self {
        self.target_number = Some(target_number);
        self
    }

    pub fn with_raises(mut self, declared_raises: u32) -> Self {
        self.declared_raises = declared_raises;
        self
    }

    pub fn with_wound_penalty(mut self, wound_penalty: u32) -> Self {
        self.wound_penalty = wound_penalty;
        self
    }
}

/// One logical die position in a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollDie {
    index: usize,
    faces: Vec<u8>,
    total: u32,
    exploded: bool,
    rerolled: bool,
}

impl RollDie {
    /// Roll a fresh die, chaining on every 8
    fn roll(index: usize, source: &mut impl FaceSource) -> Self {
        let mut faces = vec![source.roll_face()];
        while faces.last() == Some(&DIE_FACES) {
            faces.push(source.roll_face());
        }
        Self::from_faces(index, faces, false)
    }

    fn from_faces(index: usize, faces: Vec<u8>, rerolled: bool) -> Self {
        let total = faces.iter().map(|&f| u32::from(f)).sum();
        let exploded = faces.len() > 1;
        RollDie {
            index,
            faces,
            total,
            exploded,
            rerolled,
        }
    }

    /// The same die collapsed to a single flat 8
    fn capped(&self) -> Self {
        Self::from_faces(self.index, vec![DIE_FACES], self.rerolled)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Face sequence: the initial face followed by any explosion continuations
    pub fn faces(&self) -> &[u8] {
        &self.faces
    }

    pub fn first_face(&self) -> u8 {
        self.faces[0]
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn exploded(&self) -> bool {
        self.exploded
    }

    pub fn rerolled(&self) -> bool {
        self.rerolled
    }
}

/// Outcome of evaluating a total against a target number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCheck {
    pub base: i32,
    pub declared_raises: u32,
    pub effective: i32,
    pub success: bool,
    pub margin: i32,
}

impl TargetCheck {
    pub fn evaluate(total: i32, base: i32, declared_raises: u32, raise_step: i32) -> Self {
        let raises = i32::try_from(declared_raises).unwrap_or(i32::MAX);
        let effective = base.saturating_add(raise_step.saturating_mul(raises));
        TargetCheck {
            base,
            declared_raises,
            effective,
            success: total >= effective,
            margin: total.saturating_sub(effective),
        }
    }
}

/// Result of one pool roll; immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    dice: Vec<RollDie>,
    kept_indices: Vec<usize>,
    kept: Vec<u32>,
    dropped: Vec<u32>,
    flat_bonus: i32,
    total: i32,
    declared_raises: u32,
    check: Option<TargetCheck>,
}

impl RollResult {
    /// All dice in original index order
    pub fn dice(&self) -> &[RollDie] {
        &self.dice
    }

    /// Kept die totals, highest first
    pub fn kept(&self) -> &[u32] {
        &self.kept
    }

    /// Indices of the kept dice, in kept order
    pub fn kept_indices(&self) -> &[usize] {
        &self.kept_indices
    }

    /// Dropped die totals, highest first
    pub fn dropped(&self) -> &[u32] {
        &self.dropped
    }

    pub fn flat_bonus(&self) -> i32 {
        self.flat_bonus
    }

    pub fn total(&self) -> i32 {
        self.total
    }

    pub fn declared_raises(&self) -> u32 {
        self.declared_raises
    }

    pub fn target_number(&self) -> Option<i32> {
        self.check.map(|c| c.base)
    }

    pub fn effective_target_number(&self) -> Option<i32> {
        self.check.map(|c| c.effective)
    }

    /// `None` when no target number was supplied
    pub fn success(&self) -> Option<bool> {
        self.check.map(|c| c.success)
    }

    pub fn margin(&self) -> Option<i32> {
        self.check.map(|c| c.margin)
    }

    pub fn check(&self) -> Option<&TargetCheck> {
        self.check.as_ref()
    }
}

/// Roll a pool with the default limits (40 dice, keep 8, raise step 4)
pub fn roll_pool(
    source: &mut impl FaceSource,
    pool_size: u32,
    keep: u32,
    options: &RollOptions,
) -> RollResult {
    roll_pool_with_limits(source, pool_size, keep, options, &PoolLimits::default())
}

/// Roll a pool with explicit limits
///
/// Inputs are clamped, never rejected: the pool (after the wound penalty)
/// lands in `1..=max_pool` and keep in `1..=min(pool, max_keep)`.
pub fn roll_pool_with_limits(
    source: &mut impl FaceSource,
    pool_size: u32,
    keep: u32,
    options: &RollOptions,
    limits: &PoolLimits,
) -> RollResult {
    let pool = pool_size
        .saturating_sub(options.wound_penalty)
        .clamp(1, limits.max_pool.max(1));
    let keep = keep.clamp(1, pool.min(limits.max_keep).max(1));

    // Step 1: roll every die
    let mut dice: Vec<RollDie> = (0..pool as usize)
        .map(|index| RollDie::roll(index, source))
        .collect();

    // Step 2: advantage rerolls ones, once
    if options.advantage {
        for die in dice.iter_mut() {
            if die.first_face() == 1 {
                let fresh = RollDie::roll(die.index, source);
                *die = RollDie::from_faces(die.index, fresh.faces, true);
            }
        }
    }

    // Step 3: disadvantage caps every exploded die but the highest
    if options.disadvantage {
        let highest = highest_index(&dice);
        for die in dice.iter_mut() {
            if die.index != highest && die.exploded {
                *die = die.capped();
            }
        }
    }

    // Step 4: order by total, ties by index
    let mut order: Vec<&RollDie> = dice.iter().collect();
    order.sort_by(|a, b| b.total.cmp(&a.total).then(a.index.cmp(&b.index)));

    // Step 5: split kept and dropped
    let (kept_dice, dropped_dice) = order.split_at(keep as usize);
    let kept_indices: Vec<usize> = kept_dice.iter().map(|d| d.index).collect();
    let kept: Vec<u32> = kept_dice.iter().map(|d| d.total).collect();
    let dropped: Vec<u32> = dropped_dice.iter().map(|d| d.total).collect();

    // Step 6: total
    let kept_sum: i64 = kept.iter().map(|&t| i64::from(t)).sum();
    let total = i32::try_from(kept_sum)
        .unwrap_or(i32::MAX)
        .saturating_add(options.flat_bonus);

    // Step 7: target number
    let check = options
        .target_number
        .map(|tn| TargetCheck::evaluate(total, tn, options.declared_raises, limits.raise_step));

    debug!(pool, keep, total, ?kept, success = ?check.map(|c| c.success), "rolled pool");

    RollResult {
        dice,
        kept_indices,
        kept,
        dropped,
        flat_bonus: options.flat_bonus,
        total,
        declared_raises: options.declared_raises,
        check,
    }
}

/// Index of the highest-total die, lowest index on ties
fn highest_index(dice: &[RollDie]) -> usize {
    let mut best = 0;
    for (i, die) in dice.iter().enumerate() {
        if die.total > dice[best].total {
            best = i;
        }
    }
    dice[best].index
}
