//! lattice-vmc - Variational Monte Carlo for lattice models in Rust
//!
//! This crate samples particle configurations of lattice fermion and
//! hard-core boson wavefunctions with a Metropolis random walk and estimates
//! observables along the chain, including the second Renyi entanglement
//! entropy via the swap trick, which couples two copies of the system
//! through a subsystem-swapped pair of amplitudes.
//!
//! The numerical core is [`ceperley::CeperleyMatrix`], which keeps each
//! Slater matrix together with its inverse and determinant under low-rank
//! updates, so a proposed single-particle move costs O(N) and a committed
//! one O(N^2).
//!
//! Chains are single-threaded; lattices and orbital tables are immutable
//! and may be shared between chains, everything else is uniquely owned.

pub mod big;
pub mod boundary;
pub mod ceperley;
pub mod estimate;
pub mod input;
pub mod lattice;
pub mod measurement;
pub mod metropolis;
pub mod orbitals;
pub mod positions;
pub mod random;
pub mod subsystem;
pub mod swapped;
pub mod walk;
pub mod wavefunction;

// Re-export commonly used types at crate root
pub use big::Big;
pub use boundary::BoundaryCondition;
pub use ceperley::{Amplitude, CeperleyMatrix};
pub use estimate::{BinnedEstimate, RunningEstimate};
pub use input::{Input, ParseError};
pub use lattice::{HypercubicLattice, Site};
pub use measurement::{
    DensityDensityMeasurement, Measurement, RenyiModMeasurement, RenyiSignMeasurement,
};
pub use metropolis::{MetropolisError, MetropolisSimulation};
pub use orbitals::FilledOrbitals;
pub use positions::{Move, Particle, Positions, SingleParticleMove};
pub use random::{choose_random_particle, random_combination};
pub use subsystem::SimpleSubsystem;
pub use swapped::SwappedSystem;
pub use walk::{RenyiModPossibleWalk, RenyiSignWalk, StandardWalk, Walk};
pub use wavefunction::{Dbl, DMetal, FreeFermion, Jastrow, Rvb, WavefunctionAmplitude};
