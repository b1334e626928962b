//! JSON input model.
//!
//! The document is a single object with exactly the keys `rng` and
//! `system`. Unknown keys anywhere in the document are rejected, as are
//! missing keys, wrong types, and out-of-range values.

use serde::Deserialize;
use std::collections::HashSet;
use std::io::Read;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("json input error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

fn invalid(message: impl Into<String>) -> ParseError {
    ParseError::Invalid(message.into())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Input {
    pub rng: RngSection,
    pub system: SystemSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RngSection {
    /// Non-negative integer seed (the type rejects negatives).
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemSection {
    pub lattice: LatticeSection,
    pub wavefunction: WavefunctionSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LatticeSection {
    pub size: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WavefunctionSection {
    #[serde(rename = "type")]
    pub kind: String,
    /// Required for `free-fermion`.
    pub orbitals: Option<OrbitalsSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrbitalsSection {
    pub filling: Vec<Vec<i64>>,
    #[serde(rename = "boundary-conditions")]
    pub boundary_conditions: Vec<i64>,
}

impl Input {
    pub fn from_reader(reader: impl Read) -> Result<Self, ParseError> {
        let input: Input = serde_json::from_reader(reader)?;
        input.validate()?;
        Ok(input)
    }

    pub fn from_str(text: &str) -> Result<Self, ParseError> {
        let input: Input = serde_json::from_str(text)?;
        input.validate()?;
        Ok(input)
    }

    pub fn dimensions(&self) -> usize {
        self.system.lattice.size.len()
    }

    fn validate(&self) -> Result<(), ParseError> {
        let size = &self.system.lattice.size;
        if size.is_empty() || size.len() > 2 {
            return Err(invalid(
                "lattice given has a number of dimensions that is not supported by this build",
            ));
        }
        if size.iter().any(|&l| l <= 0) {
            return Err(invalid("lattice dimensions must be positive integers"));
        }

        if self.system.wavefunction.kind != "free-fermion" {
            return Err(invalid("invalid wavefunction type"));
        }
        let orbitals = self
            .system
            .wavefunction
            .orbitals
            .as_ref()
            .ok_or_else(|| invalid("free-fermion wavefunctions require orbitals"))?;

        if orbitals.boundary_conditions.len() != size.len() {
            return Err(invalid(
                "boundary conditions must match the lattice dimensions",
            ));
        }
        if orbitals.boundary_conditions.iter().any(|&b| b <= 0) {
            return Err(invalid("invalid boundary condition specifier"));
        }

        if orbitals.filling.is_empty() {
            return Err(invalid("at least one momentum must be filled"));
        }
        let mut seen = HashSet::new();
        for momentum in &orbitals.filling {
            if momentum.len() != size.len() {
                return Err(invalid("momentum must match the lattice dimensions"));
            }
            for (d, &m) in momentum.iter().enumerate() {
                if m < 0 || m >= size[d] {
                    return Err(invalid("invalid momentum index"));
                }
            }
            if !seen.insert(momentum.clone()) {
                return Err(invalid("duplicate filled momentum"));
            }
        }
        if orbitals.filling.len() > size.iter().product::<i64>() as usize {
            return Err(invalid("more filled orbitals than lattice sites"));
        }

        Ok(())
    }
}
