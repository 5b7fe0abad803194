//! Randomness for the handshake that is not key material.
//!
//! With [`Config::rng_seed`][crate::Config::rng_seed] set, the client random,
//! made-up session ids and retransmission jitter repeat from run to run.
//! Key exchange secrets always come from the OS.

use std::fmt;

use rand::distributions::{Distribution, Standard};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of handshake randomness, seeded or from the thread rng.
pub struct SeededRng {
    source: Source,
}

enum Source {
    Seeded(StdRng),
    Thread,
}

impl SeededRng {
    pub fn new(seed: Option<u64>) -> Self {
        let source = match seed {
            Some(seed) => Source::Seeded(StdRng::seed_from_u64(seed)),
            None => Source::Thread,
        };
        SeededRng { source }
    }

    pub fn is_seeded(&self) -> bool {
        matches!(self.source, Source::Seeded(_))
    }

    pub fn random<T>(&mut self) -> T
    where
        Standard: Distribution<T>,
    {
        match &mut self.source {
            Source::Seeded(rng) => rng.gen(),
            Source::Thread => rand::thread_rng().gen(),
        }
    }

    pub fn fill(&mut self, dest: &mut [u8]) {
        match &mut self.source {
            Source::Seeded(rng) => rng.fill(dest),
            Source::Thread => rand::thread_rng().fill(dest),
        }
    }
}

impl fmt::Debug for SeededRng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeededRng({})", if self.is_seeded() { "seeded" } else { "os" })
    }
}
