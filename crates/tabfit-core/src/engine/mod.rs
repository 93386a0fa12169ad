//! The distributed evaluation controller and the per-configuration
//! assembly it drives.
//!
//! Every rank calls [`EvaluationEngine::evaluate`]; the coordinator returns
//! the globally reduced residual, all other ranks stay inside the worker
//! state machine until a terminate command arrives. One evaluation round is
//! broadcast → table sync → per-configuration assembly → reduce → gather.

mod angular;
mod pair;
mod residual;

use crate::comm::Communicator;
use crate::domain::{ControlFlag, EvalOptions, WorkerState};
use crate::model::{
    Configuration, FittingProblem, ModelError, ResidualBuffer, ResidualLayout,
};
use crate::numerics::electrostatics::TailSample;
use crate::table::{ChargeSet, PotentialTable, TableError};
use rayon::prelude::*;

/// Returned to the optimizer in place of a non-finite residual.
pub const INVALID_RESIDUAL: f64 = 1.0e11;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("residual buffer layout {actual:?} does not match the problem layout {expected:?}")]
    BufferLayoutMismatch {
        expected: ResidualLayout,
        actual: ResidualLayout,
    },
    #[error(
        "problem and table disagree about electrostatics: problem declares it {problem}, table charge block {table}"
    )]
    ChargeBlockMismatch { problem: bool, table: bool },
    #[error("atom {atom} references column {column}, table has {column_count}")]
    ColumnOutOfRange {
        atom: usize,
        column: usize,
        column_count: usize,
    },
}

/// Contiguous block of configurations owned by one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub first_config: usize,
    pub config_count: usize,
}

impl Partition {
    /// Block distribution of `total` configurations over `size` ranks;
    /// deterministic, so every rank can reconstruct every other rank's
    /// block for the gather step.
    pub fn block(rank: usize, size: usize, total: usize) -> Self {
        let base = total / size;
        let extra = total % size;
        Self {
            first_config: rank * base + rank.min(extra),
            config_count: base + usize::from(rank < extra),
        }
    }
}

/// Per-neighbor values computed once per evaluation and shared between the
/// pair and angular passes.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NeighborScratch {
    pub cutoff_value: f64,
    pub cutoff_slope: f64,
    pub tail: TailSample,
}

/// Angular function value and slope cached by the energy pass for the force
/// pass.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AngleScratch {
    pub value: f64,
    pub slope: f64,
}

/// Mutable state of one configuration's assembly. Owned by the evaluation
/// call; nothing here survives into the next evaluation.
pub(crate) struct ConfigWorkspace {
    pub forces: Vec<[f64; 3]>,
    pub energy: f64,
    pub stress: [f64; 6],
    pub neighbor_scratch: Vec<Vec<NeighborScratch>>,
    pub angle_scratch: Vec<Vec<AngleScratch>>,
    pub use_forces: bool,
    pub use_stress: bool,
}

impl ConfigWorkspace {
    fn new(
        problem: &FittingProblem,
        config: &Configuration,
        layout: ResidualLayout,
        use_stress: bool,
    ) -> Self {
        let use_forces = config.use_forces;
        let mut forces = vec![[0.0; 3]; config.atom_count];
        if use_forces {
            // seed with the negated reference so the buffer accumulates
            // "predicted minus reference" directly
            for (local, force) in forces.iter_mut().enumerate() {
                let offset = layout.force_offset(config.first_atom + local);
                *force = [
                    -problem.references[offset],
                    -problem.references[offset + 1],
                    -problem.references[offset + 2],
                ];
            }
        }
        let atoms = &problem.atoms[config.atom_range()];
        Self {
            forces,
            energy: 0.0,
            stress: [0.0; 6],
            neighbor_scratch: atoms
                .iter()
                .map(|atom| vec![NeighborScratch::default(); atom.neighbors.len()])
                .collect(),
            angle_scratch: atoms
                .iter()
                .map(|atom| vec![AngleScratch::default(); atom.angles.len()])
                .collect(),
            use_forces,
            use_stress,
        }
    }
}

/// Result of one configuration's assembly, merged into the flat residual
/// buffer after the parallel section.
pub(crate) struct ConfigOutput {
    pub forces: Vec<[f64; 3]>,
    pub energy: f64,
    pub stress: [f64; 6],
    pub weighted_sum: f64,
}

#[inline]
pub(crate) fn add_assign3(target: &mut [f64; 3], value: [f64; 3]) {
    target[0] += value[0];
    target[1] += value[1];
    target[2] += value[2];
}

#[inline]
pub(crate) fn sub_assign3(target: &mut [f64; 3], value: [f64; 3]) {
    target[0] -= value[0];
    target[1] -= value[1];
    target[2] -= value[2];
}

/// Accumulate `-scale · d ⊗ f` into the six independent stress components
/// (xx, yy, zz, xy, yz, zx).
#[inline]
pub(crate) fn accumulate_stress(stress: &mut [f64; 6], d: [f64; 3], f: [f64; 3], scale: f64) {
    stress[0] -= scale * d[0] * f[0];
    stress[1] -= scale * d[1] * f[1];
    stress[2] -= scale * d[2] * f[2];
    stress[3] -= scale * d[0] * f[1];
    stress[4] -= scale * d[1] * f[2];
    stress[5] -= scale * d[2] * f[0];
}

pub(crate) fn evaluate_configuration(
    problem: &FittingProblem,
    table: &PotentialTable,
    options: &EvalOptions,
    charges: Option<&ChargeSet>,
    config_index: usize,
) -> ConfigOutput {
    let config = &problem.configurations[config_index];
    let layout = problem.layout(options.stress);
    let use_stress = options.stress && config.use_stress;

    let mut workspace = ConfigWorkspace::new(problem, config, layout, use_stress);
    pair::accumulate(&mut workspace, problem, table, charges, config);
    angular::accumulate(&mut workspace, problem, table, config);
    let weighted_sum = residual::finish(
        &mut workspace,
        problem,
        options,
        charges,
        config,
        config_index,
        layout,
    );

    ConfigOutput {
        forces: workspace.forces,
        energy: workspace.energy,
        stress: workspace.stress,
        weighted_sum,
    }
}

/// The long-lived evaluation service one rank runs.
pub struct EvaluationEngine<'a, C: Communicator> {
    comm: &'a C,
    problem: &'a FittingProblem,
    table: PotentialTable,
    options: EvalOptions,
    partition: Partition,
    evaluation_count: u64,
}

impl<'a, C: Communicator> EvaluationEngine<'a, C> {
    pub fn new(
        comm: &'a C,
        problem: &'a FittingProblem,
        table: PotentialTable,
        options: EvalOptions,
    ) -> Result<Self, EngineError> {
        problem.validate(options.stress)?;
        table.validate_shape()?;
        if problem.electrostatics.is_some() != table.with_charges {
            return Err(EngineError::ChargeBlockMismatch {
                problem: problem.electrostatics.is_some(),
                table: table.with_charges,
            });
        }
        let column_count = table.columns.len();
        for (atom_index, atom) in problem.atoms.iter().enumerate() {
            for neighbor in &atom.neighbors {
                for column in [neighbor.pair_column, neighbor.cutoff_column] {
                    if column >= column_count {
                        return Err(EngineError::ColumnOutOfRange {
                            atom: atom_index,
                            column,
                            column_count,
                        });
                    }
                }
            }
        }

        let partition = Partition::block(comm.rank(), comm.size(), problem.configurations.len());
        Ok(Self {
            comm,
            problem,
            table,
            options,
            partition,
            evaluation_count: 0,
        })
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    pub fn table(&self) -> &PotentialTable {
        &self.table
    }

    /// Mutable table access for the coordinator when the parametrization
    /// itself changes (knot positions, cutoffs); follow up with a resync
    /// round so the other ranks pick the new structure up.
    pub fn table_mut(&mut self) -> &mut PotentialTable {
        &mut self.table
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Evaluations this rank has computed since construction.
    pub fn evaluation_count(&self) -> u64 {
        self.evaluation_count
    }

    /// Run the evaluation protocol.
    ///
    /// The coordinator broadcasts `flag` and the parameter vector, computes
    /// its share, and returns `Some(residual)`. Every other rank ignores
    /// its own `flag`, obeys the broadcast one, and only returns (`None`)
    /// once a terminate command arrives; until then it keeps serving
    /// evaluation rounds. A terminate round performs no computation and
    /// leaves the residual buffer untouched on every rank.
    pub fn evaluate(
        &mut self,
        params: &mut [f64],
        residuals: &mut ResidualBuffer,
        flag: ControlFlag,
    ) -> Result<Option<f64>, EngineError> {
        let layout = self.problem.layout(self.options.stress);
        if residuals.layout() != layout {
            return Err(EngineError::BufferLayoutMismatch {
                expected: layout,
                actual: residuals.layout(),
            });
        }
        let expected = self.table.parameter_len();
        if params.len() != expected {
            return Err(EngineError::Table(TableError::ParameterLengthMismatch {
                expected,
                actual: params.len(),
            }));
        }

        let mut state = WorkerState::AwaitingCommand;
        let mut raw_flag = flag.to_raw();
        loop {
            self.comm.broadcast_flag(&mut raw_flag);
            state = state.on_command(ControlFlag::from_raw(raw_flag));

            if state == WorkerState::Terminated {
                return Ok(None);
            }
            if state == WorkerState::Resyncing {
                self.resync_structure()?;
                state = state.on_phase_complete();
            }

            self.comm.broadcast_values(params);
            self.table.sync(params)?;
            let charges = if self.table.with_charges {
                Some(self.table.charges(params, &self.problem.abundance)?)
            } else {
                None
            };

            let mut local_sum = self.compute_partition(charges.as_ref(), residuals);
            if self.comm.is_coordinator() {
                local_sum += self.table.punishment(params);
            }
            let reduced = self.comm.reduce_sum(local_sum);
            self.gather_residuals(residuals);
            self.evaluation_count += 1;
            state = state.on_phase_complete();

            if let Some(total) = reduced {
                if !total.is_finite() {
                    tracing::debug!(total, "non-finite residual replaced by sentinel");
                    return Ok(Some(INVALID_RESIDUAL));
                }
                return Ok(Some(total));
            }
        }
    }

    /// Re-broadcast the table structure (grids, cutoffs, boundary slopes)
    /// from the coordinator; used when the parametrization itself changed,
    /// not just the values.
    fn resync_structure(&mut self) -> Result<(), TableError> {
        let mut payload = self.table.structure_to_vec();
        self.comm.broadcast_values(&mut payload);
        if !self.comm.is_coordinator() {
            self.table.structure_from_vec(&payload)?;
            tracing::debug!(rank = self.comm.rank(), "table structure resynchronized");
        }
        Ok(())
    }

    fn compute_partition(
        &self,
        charges: Option<&ChargeSet>,
        residuals: &mut ResidualBuffer,
    ) -> f64 {
        let layout = residuals.layout();
        let first = self.partition.first_config;
        let problem = self.problem;
        let table = &self.table;
        let options = &self.options;
        let outputs: Vec<(usize, ConfigOutput)> = (first..first + self.partition.config_count)
            .into_par_iter()
            .map(|config_index| {
                (
                    config_index,
                    evaluate_configuration(problem, table, options, charges, config_index),
                )
            })
            .collect();

        let values = residuals.as_mut_slice();
        let mut local_sum = 0.0;
        for (config_index, output) in outputs {
            let config = &self.problem.configurations[config_index];
            for (local, force) in output.forces.iter().enumerate() {
                let offset = layout.force_offset(config.first_atom + local);
                values[offset..offset + 3].copy_from_slice(force);
            }
            values[layout.energy_slot(config_index)] = output.energy;
            if layout.with_stress {
                let offset = layout.stress_slot(config_index);
                values[offset..offset + 6].copy_from_slice(&output.stress);
            }
            local_sum += output.weighted_sum;
        }
        local_sum
    }

    fn gather_residuals(&self, residuals: &mut ResidualBuffer) {
        let size = self.comm.size();
        if size == 1 {
            return;
        }
        let layout = residuals.layout();
        let total = self.problem.configurations.len();
        let partitions: Vec<Partition> = (0..size)
            .map(|rank| Partition::block(rank, size, total))
            .collect();
        let spans: Vec<(usize, usize)> = partitions
            .iter()
            .map(|partition| self.atom_span(*partition))
            .collect();

        let offsets: Vec<usize> = spans
            .iter()
            .map(|(first_atom, _)| layout.force_offset(*first_atom))
            .collect();
        let lengths: Vec<usize> = spans.iter().map(|(_, count)| 3 * count).collect();
        self.comm
            .gather_segments(residuals.as_mut_slice(), &offsets, &lengths);

        let offsets: Vec<usize> = partitions
            .iter()
            .map(|partition| layout.energy_slot(partition.first_config))
            .collect();
        let lengths: Vec<usize> = partitions
            .iter()
            .map(|partition| partition.config_count)
            .collect();
        self.comm
            .gather_segments(residuals.as_mut_slice(), &offsets, &lengths);

        if layout.with_stress {
            let offsets: Vec<usize> = partitions
                .iter()
                .map(|partition| layout.stress_slot(partition.first_config))
                .collect();
            let lengths: Vec<usize> = partitions
                .iter()
                .map(|partition| 6 * partition.config_count)
                .collect();
            self.comm
                .gather_segments(residuals.as_mut_slice(), &offsets, &lengths);
        }
    }

    fn atom_span(&self, partition: Partition) -> (usize, usize) {
        if partition.config_count == 0 {
            return (0, 0);
        }
        let configs = &self.problem.configurations;
        let first = &configs[partition.first_config];
        let last = &configs[partition.first_config + partition.config_count - 1];
        (
            first.first_atom,
            last.first_atom + last.atom_count - first.first_atom,
        )
    }
}
