//! Deterministic RNG hierarchy.
//!
//! A master seed generates a sub-seed for each `(model, run)` pair via BLAKE3,
//! so repeated inference runs on a cached model draw from independent but
//! reproducible streams.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Sub-seed for the `run`-th inference of model `model`.
    pub fn sub_seed(&self, model: &str, run: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(model.as_bytes());
        hasher.update(&run.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    pub fn rng_for(&self, model: &str, run: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(model, run))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn sub_seeds_are_deterministic() {
        let h = RngHierarchy::new(42);
        assert_eq!(h.sub_seed("t", 0), h.sub_seed("t", 0));
    }

    #[test]
    fn models_and_runs_get_distinct_streams() {
        let h = RngHierarchy::new(42);
        assert_ne!(h.sub_seed("t", 0), h.sub_seed("normal", 0));
        assert_ne!(h.sub_seed("t", 0), h.sub_seed("t", 1));
        assert_ne!(
            RngHierarchy::new(42).sub_seed("t", 0),
            RngHierarchy::new(43).sub_seed("t", 0)
        );
    }

    #[test]
    fn rng_for_reproduces_stream() {
        let h = RngHierarchy::new(7);
        let a: Vec<u32> = h.rng_for("best", 3).sample_iter(rand::distributions::Standard).take(4).collect();
        let b: Vec<u32> = h.rng_for("best", 3).sample_iter(rand::distributions::Standard).take(4).collect();
        assert_eq!(a, b);
    }
}
