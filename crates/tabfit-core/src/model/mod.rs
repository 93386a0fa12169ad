//! Immutable evaluation inputs: atoms with precomputed neighbor and angle
//! lists, configurations partitioning the atom list, reference data, and the
//! flat residual buffer the kernels write into.
//!
//! Neighbor lists are built by the loader, outside this crate: distances,
//! displacement vectors, and spline lookup slots arrive precomputed and are
//! never recomputed here.

use crate::numerics::electrostatics::TailForm;
use crate::numerics::spline::SplineSlot;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("abundance vector has {actual} entries for {expected} species")]
    AbundanceLengthMismatch { expected: usize, actual: usize },
    #[error("abundance of species {species} must be finite and nonzero, got {value}")]
    InvalidAbundance { species: usize, value: f64 },
    #[error(
        "configuration {index} spans atoms {first}..{last} but the previous configuration ends at {expected_first}"
    )]
    NonContiguousConfigurations {
        index: usize,
        first: usize,
        last: usize,
        expected_first: usize,
    },
    #[error("configurations cover {covered} atoms but {total} are present")]
    AtomCoverageMismatch { covered: usize, total: usize },
    #[error("atom {atom} has species {species}, problem declares {species_count}")]
    SpeciesOutOfRange {
        atom: usize,
        species: usize,
        species_count: usize,
    },
    #[error(
        "atom {atom} lists partner {partner} outside its configuration (atoms {first}..{last}); reaction forces cannot cross configurations"
    )]
    CrossConfigurationNeighbor {
        atom: usize,
        partner: usize,
        first: usize,
        last: usize,
    },
    #[error("atom {atom} angle {angle} references neighbor {neighbor} of {neighbor_count}")]
    AngleNeighborOutOfRange {
        atom: usize,
        angle: usize,
        neighbor: usize,
        neighbor_count: usize,
    },
    #[error("reference vector has {actual} entries, layout needs {expected}")]
    ReferenceLengthMismatch { expected: usize, actual: usize },
}

/// Monopole electrostatics settings of a fitting problem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElectrostaticModel {
    /// Real-space cutoff of the tail functions.
    pub cutoff: f64,
    pub form: TailForm,
}

/// One entry of an atom's neighbor list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Global index of the neighbor atom; equal to the owning atom's own
    /// index when the neighbor is a periodic image of the atom itself.
    pub partner: usize,
    pub species: usize,
    pub distance: f64,
    pub displacement: [f64; 3],
    /// Unit displacement vector.
    pub direction: [f64; 3],
    pub inv_distance: f64,
    pub pair_column: usize,
    pub pair_slot: SplineSlot,
    pub cutoff_column: usize,
    pub cutoff_slot: SplineSlot,
}

/// One unordered neighbor pair (j,k) within the angular cutoff, stored with
/// the lookup coordinates of the angular spline at cos θ_jik.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleTriplet {
    /// Index of neighbor j in the atom's neighbor list.
    pub first: usize,
    /// Index of neighbor k in the atom's neighbor list.
    pub second: usize,
    pub cos_theta: f64,
    pub slot: SplineSlot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub species: usize,
    /// Magnitude of the reference force, used by relative force weighting.
    pub reference_force_norm: f64,
    /// Atoms marked false are excluded from the force residual when
    /// contribution filtering is on.
    #[serde(default = "default_true")]
    pub contributes: bool,
    pub neighbors: Vec<Neighbor>,
    pub angles: Vec<AngleTriplet>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub first_atom: usize,
    pub atom_count: usize,
    pub weight: f64,
    pub volume: f64,
    pub use_forces: bool,
    pub use_stress: bool,
}

impl Configuration {
    pub fn atom_range(&self) -> std::ops::Range<usize> {
        self.first_atom..self.first_atom + self.atom_count
    }
}

/// The complete, read-only input of the evaluation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittingProblem {
    pub species_count: usize,
    /// Relative abundance of each species across all configurations; feeds
    /// the electroneutrality constraint on the derived last charge.
    pub abundance: Vec<f64>,
    pub atoms: Vec<Atom>,
    pub configurations: Vec<Configuration>,
    /// Reference forces/energies/stresses in residual-buffer layout.
    pub references: Vec<f64>,
    pub electrostatics: Option<ElectrostaticModel>,
}

impl FittingProblem {
    pub fn layout(&self, with_stress: bool) -> ResidualLayout {
        ResidualLayout {
            atom_count: self.atoms.len(),
            config_count: self.configurations.len(),
            with_stress,
        }
    }

    /// Structural consistency checks run once before the first evaluation.
    pub fn validate(&self, with_stress: bool) -> Result<(), ModelError> {
        if self.abundance.len() != self.species_count {
            return Err(ModelError::AbundanceLengthMismatch {
                expected: self.species_count,
                actual: self.abundance.len(),
            });
        }
        for (species, &ratio) in self.abundance.iter().enumerate() {
            if !ratio.is_finite() || ratio == 0.0 {
                return Err(ModelError::InvalidAbundance {
                    species,
                    value: ratio,
                });
            }
        }

        let mut expected_first = 0;
        for (index, config) in self.configurations.iter().enumerate() {
            if config.first_atom != expected_first {
                return Err(ModelError::NonContiguousConfigurations {
                    index,
                    first: config.first_atom,
                    last: config.first_atom + config.atom_count,
                    expected_first,
                });
            }
            expected_first += config.atom_count;
            if expected_first > self.atoms.len() {
                return Err(ModelError::AtomCoverageMismatch {
                    covered: expected_first,
                    total: self.atoms.len(),
                });
            }

            for local in 0..config.atom_count {
                let atom_index = config.first_atom + local;
                let atom = &self.atoms[atom_index];
                if atom.species >= self.species_count {
                    return Err(ModelError::SpeciesOutOfRange {
                        atom: atom_index,
                        species: atom.species,
                        species_count: self.species_count,
                    });
                }
                for neighbor in &atom.neighbors {
                    if !config.atom_range().contains(&neighbor.partner) {
                        return Err(ModelError::CrossConfigurationNeighbor {
                            atom: atom_index,
                            partner: neighbor.partner,
                            first: config.first_atom,
                            last: config.first_atom + config.atom_count,
                        });
                    }
                }
                for (angle_index, angle) in atom.angles.iter().enumerate() {
                    for neighbor in [angle.first, angle.second] {
                        if neighbor >= atom.neighbors.len() {
                            return Err(ModelError::AngleNeighborOutOfRange {
                                atom: atom_index,
                                angle: angle_index,
                                neighbor,
                                neighbor_count: atom.neighbors.len(),
                            });
                        }
                    }
                }
            }
        }
        if expected_first != self.atoms.len() {
            return Err(ModelError::AtomCoverageMismatch {
                covered: expected_first,
                total: self.atoms.len(),
            });
        }

        let expected_len = self.layout(with_stress).len();
        if self.references.len() != expected_len {
            return Err(ModelError::ReferenceLengthMismatch {
                expected: expected_len,
                actual: self.references.len(),
            });
        }
        Ok(())
    }
}

/// Slot arithmetic of the flat residual buffer: three force components per
/// atom, one energy slot per configuration, then six stress components per
/// configuration when stress is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidualLayout {
    pub atom_count: usize,
    pub config_count: usize,
    pub with_stress: bool,
}

impl ResidualLayout {
    pub const fn force_offset(&self, atom: usize) -> usize {
        3 * atom
    }

    pub const fn energy_offset(&self) -> usize {
        3 * self.atom_count
    }

    pub const fn energy_slot(&self, config: usize) -> usize {
        self.energy_offset() + config
    }

    pub const fn stress_offset(&self) -> usize {
        3 * self.atom_count + self.config_count
    }

    pub const fn stress_slot(&self, config: usize) -> usize {
        self.stress_offset() + 6 * config
    }

    pub const fn len(&self) -> usize {
        if self.with_stress {
            self.stress_offset() + 6 * self.config_count
        } else {
            self.stress_offset()
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Caller-owned accumulation buffer; after an evaluation it holds
/// "predicted minus reference" for every residual component.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualBuffer {
    layout: ResidualLayout,
    values: Vec<f64>,
}

impl ResidualBuffer {
    pub fn new(layout: ResidualLayout) -> Self {
        Self {
            layout,
            values: vec![0.0; layout.len()],
        }
    }

    pub fn layout(&self) -> ResidualLayout {
        self.layout
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn force(&self, atom: usize) -> [f64; 3] {
        let offset = self.layout.force_offset(atom);
        [
            self.values[offset],
            self.values[offset + 1],
            self.values[offset + 2],
        ]
    }

    pub fn energy(&self, config: usize) -> f64 {
        self.values[self.layout.energy_slot(config)]
    }

    pub fn stress(&self, config: usize) -> [f64; 6] {
        let offset = self.layout.stress_slot(config);
        let mut out = [0.0; 6];
        out.copy_from_slice(&self.values[offset..offset + 6]);
        out
    }
}
