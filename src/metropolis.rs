//! The Metropolis driver.

use rand::Rng;
use thiserror::Error;

use crate::measurement::Measurement;
use crate::walk::Walk;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum MetropolisError {
    /// The walk reported a negative or NaN probability ratio. The walk has
    /// been rolled back to a consistent state, but there is generally no
    /// good reason to continue.
    #[error("invalid probability ratio: {0}")]
    InvalidProbability(f64),
}

/// Drives one walk and its measurements with the Metropolis accept/reject
/// rule.
pub struct MetropolisSimulation<W: Walk + 'static, R: Rng> {
    walk: W,
    measurements: Vec<Box<dyn Measurement<W>>>,
    rng: R,
    steps_completed: u64,
    steps_accepted: u64,
    steps_fully_rejected: u64,
    measurement_not_yet_updated: bool,
}

impl<W: Walk + 'static, R: Rng> MetropolisSimulation<W, R> {
    /// Equilibrate the walk, then initialize the measurements. Every
    /// measurement must declare the walk valid.
    pub fn new(
        walk: W,
        measurements: Vec<Box<dyn Measurement<W>>>,
        equilibration_steps: u64,
        rng: R,
    ) -> Result<Self, MetropolisError> {
        for m in &measurements {
            assert!(m.is_valid_walk(&walk), "measurement rejected the walk");
        }

        let mut sim = MetropolisSimulation {
            walk,
            measurements,
            rng,
            steps_completed: 0,
            steps_accepted: 0,
            steps_fully_rejected: 0,
            measurement_not_yet_updated: true,
        };

        for _ in 0..equilibration_steps {
            sim.perform_single_step()?;
        }
        for m in &mut sim.measurements {
            m.initialize(&sim.walk);
        }
        Ok(sim)
    }

    /// Perform `steps` Metropolis steps, updating every measurement once
    /// per step: `step_advanced` on the first step and on every accepted
    /// step, `step_repeated` otherwise.
    pub fn iterate(&mut self, steps: u64) -> Result<(), MetropolisError> {
        for _ in 0..steps {
            let accepted = self.perform_single_step()?;
            if accepted || self.measurement_not_yet_updated {
                for m in &mut self.measurements {
                    m.step_advanced(&self.walk);
                }
                self.measurement_not_yet_updated = false;
            } else {
                for m in &mut self.measurements {
                    m.step_repeated(&self.walk);
                }
            }
        }
        Ok(())
    }

    fn perform_single_step(&mut self) -> Result<bool, MetropolisError> {
        let probability_ratio = self.walk.propose_transition(&mut self.rng);

        // phrased so that NaN also lands in the error branch
        if !(probability_ratio >= 0.0) {
            // restore a consistent state before reporting
            self.walk.reject_transition();
            return Err(MetropolisError::InvalidProbability(probability_ratio));
        }

        self.steps_completed += 1;

        if probability_ratio >= 1.0
            || (probability_ratio > 0.0 && self.rng.gen::<f64>() < probability_ratio)
        {
            self.walk.accept_transition();
            self.steps_accepted += 1;
            Ok(true)
        } else {
            self.walk.reject_transition();
            if probability_ratio == 0.0 {
                self.steps_fully_rejected += 1;
            }
            Ok(false)
        }
    }

    pub fn walk(&self) -> &W {
        &self.walk
    }

    pub fn measurements(&self) -> &[Box<dyn Measurement<W>>] {
        &self.measurements
    }

    pub fn measurement(&self, index: usize) -> &dyn Measurement<W> {
        &*self.measurements[index]
    }

    pub fn steps_completed(&self) -> u64 {
        self.steps_completed
    }

    pub fn steps_accepted(&self) -> u64 {
        self.steps_accepted
    }

    pub fn steps_fully_rejected(&self) -> u64 {
        self.steps_fully_rejected
    }

    pub fn acceptance_rate(&self) -> f64 {
        if self.steps_completed == 0 {
            0.0
        } else {
            self.steps_accepted as f64 / self.steps_completed as f64
        }
    }
}
