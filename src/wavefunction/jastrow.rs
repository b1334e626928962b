//! Jastrow multipliers.
//!
//! A Jastrow factor is a symmetric scalar function of the configuration
//! multiplying the determinantal part of the amplitude. Both factors here
//! act on the double occupancies of a two-species configuration; the
//! projector is the g -> infinity limit of the Gutzwiller factor.

use crate::positions::{Particle, Positions};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jastrow {
    /// Hard projector onto configurations with no doubly-occupied site.
    SingleOccupancy,
    /// exp(-g D), with D the number of doubly-occupied sites.
    Gutzwiller { g: f64 },
}

impl Jastrow {
    /// Evaluate at a configuration. Requires two species.
    pub fn factor(&self, r: &Positions) -> f64 {
        assert!(r.n_species() == 2, "Jastrow factors act on two-species configurations");
        let double_occupancies = (0..r.n_filled(0))
            .filter(|&i| r.is_occupied(r[Particle::new(i, 0)], 1))
            .count();
        match self {
            Jastrow::SingleOccupancy => {
                if double_occupancies > 0 {
                    0.0
                } else {
                    1.0
                }
            }
            Jastrow::Gutzwiller { g } => (-g * double_occupancies as f64).exp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_projector_kills_double_occupancy() {
        let separated = Positions::new(vec![vec![0, 1], vec![2, 3]], 4);
        let stacked = Positions::new(vec![vec![0, 1], vec![1, 3]], 4);
        assert_relative_eq!(Jastrow::SingleOccupancy.factor(&separated), 1.0);
        assert_relative_eq!(Jastrow::SingleOccupancy.factor(&stacked), 0.0);
    }

    #[test]
    fn test_gutzwiller_counts_double_occupancies() {
        let stacked = Positions::new(vec![vec![0, 1], vec![0, 1]], 4);
        let factor = Jastrow::Gutzwiller { g: 0.5 }.factor(&stacked);
        assert_relative_eq!(factor, (-1.0f64).exp(), epsilon = 1e-12);
    }
}
