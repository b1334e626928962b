//! Markov-chain transition proposers.

pub mod renyi_mod;
pub mod renyi_sign;
pub mod standard;

pub use renyi_mod::RenyiModPossibleWalk;
pub use renyi_sign::RenyiSignWalk;
pub use standard::StandardWalk;

use rand::Rng;

/// A transition proposer driven by the Metropolis loop: propose a move and
/// report the probability ratio, then accept or reject. Exactly one of
/// `accept_transition` / `reject_transition` must follow every proposal.
pub trait Walk {
    /// Propose a random transition and return the probability ratio
    /// new/old of the walk's stationary weight. A ratio of 0 means the
    /// proposal is impossible; +infinity forces acceptance.
    fn propose_transition<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64;

    fn accept_transition(&mut self);

    fn reject_transition(&mut self);
}
