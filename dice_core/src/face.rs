//! Face sources - where individual d8 faces come from
//!
//! Every roll in the engine pulls faces through [`FaceSource`], so the same
//! algorithm runs against live randomness, a seeded stream, or a fixed script.

use rand::rngs::ThreadRng;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use tracing::warn;

/// Number of faces on every die in this system
pub const DIE_FACES: u8 = 8;

/// Source of single d8 faces in `1..=8`
pub trait FaceSource {
    /// Roll one face
    fn roll_face(&mut self) -> u8;
}

impl<F: FaceSource + ?Sized> FaceSource for &mut F {
    fn roll_face(&mut self) -> u8 {
        (**self).roll_face()
    }
}

/// Faces drawn uniformly from any `rand` generator
#[derive(Debug, Clone)]
pub struct RngFaces<R: Rng> {
    rng: R,
}

impl<R: Rng> RngFaces<R> {
    pub fn new(rng: R) -> Self {
        RngFaces { rng }
    }
}

impl RngFaces<ThreadRng> {
    /// Faces from the thread-local generator
    pub fn thread() -> Self {
        RngFaces::new(rand::thread_rng())
    }
}

impl<R: Rng> FaceSource for RngFaces<R> {
    fn roll_face(&mut self) -> u8 {
        self.rng.gen_range(1..=DIE_FACES)
    }
}

/// Reproducible faces from a seed (ChaCha8)
#[derive(Debug, Clone)]
pub struct SeededFaces {
    rng: ChaCha8Rng,
}

impl SeededFaces {
    pub fn new(seed: u64) -> Self {
        SeededFaces {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl FaceSource for SeededFaces {
    fn roll_face(&mut self) -> u8 {
        self.rng.gen_range(1..=DIE_FACES)
    }
}

/// Faces replayed from a fixed script, in order
///
/// Out-of-range entries are clamped into `1..=8`. Once the script runs dry
/// every further face is a 1.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFaces {
    faces: VecDeque<u8>,
}

impl ScriptedFaces {
    pub fn new(faces: impl IntoIterator<Item = u8>) -> Self {
        ScriptedFaces {
            faces: faces.into_iter().collect(),
        }
    }

    /// Faces not yet consumed
    pub fn remaining(&self) -> usize {
        self.faces.len()
    }
}

impl FaceSource for ScriptedFaces {
    fn roll_face(&mut self) -> u8 {
        match self.faces.pop_front() {
            Some(face) => face.clamp(1, DIE_FACES),
            None => {
                warn!("scripted face source exhausted, rolling 1");
                1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_replays_in_order() {
        let mut faces = ScriptedFaces::new([3, 8, 1]);
        assert_eq!(faces.roll_face(), 3);
        assert_eq!(faces.roll_face(), 8);
        assert_eq!(faces.remaining(), 1);
        assert_eq!(faces.roll_face(), 1);
        assert_eq!(faces.roll_face(), 1);
    }

    #[test]
    fn test_scripted_clamps_out_of_range() {
        let mut faces = ScriptedFaces::new([0, 12]);
        assert_eq!(faces.roll_face(), 1);
        assert_eq!(faces.roll_face(), 8);
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let mut a = SeededFaces::new(42);
        let mut b = SeededFaces::new(42);
        let left: Vec<u8> = (0..64).map(|_| a.roll_face()).collect();
        let right: Vec<u8> = (0..64).map(|_| b.roll_face()).collect();
        assert_eq!(left, right);
        assert!(left.iter().all(|f| (1..=DIE_FACES).contains(f)));
    }

    #[test]
    fn test_thread_faces_in_range() {
        let mut faces = RngFaces::thread();
        for _ in 0..1000 {
            let face = faces.roll_face();
            assert!((1..=DIE_FACES).contains(&face));
        }
    }
}
