//! Deterministic per-node sequence-number generator.
//!
//! The original draws sequence numbers from the process-global `rand()`,
//! which is fine for a single-threaded C program but would make this crate's
//! node tasks non-reproducible if they each reached for `rand::thread_rng()`.
//! Instead every node's LLC layer owns one seeded generator, derived from the
//! run seed and the node id, so a fixed run seed reproduces byte-identical
//! sequence numbers (and therefore byte-identical scheduling, since ack waits
//! key off them) across runs.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Sequence zero is reserved for ack frames; data frames draw from `1..=65535`.
pub struct SeqGen {
    rng: ChaCha8Rng,
}

impl SeqGen {
    /// Derive a node-local generator from the run seed and node id.
    ///
    /// Folds the node id into the seed rather than reusing the run seed
    /// verbatim so that distinct nodes do not draw identical sequences.
    pub fn for_node(run_seed: u64, node_id: u64) -> Self {
        let seed = run_seed ^ node_id.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Draw a non-zero sequence number uniformly from `1..=65535`.
    pub fn next_seq(&mut self) -> u16 {
        1 + (self.rng.next_u32() % 65535) as u16
    }
}
