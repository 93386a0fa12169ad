//! Pair and monopole-electrostatic assembly.
//!
//! Walks every atom's neighbor list once. Neighbor lists are full lists:
//! each physical pair appears as two directed entries, so the short-range
//! energy takes a 0.5 share per visit and the short-range force lands on
//! the visiting atom only, its reaction arriving through the mirrored
//! entry. The electrostatic path instead applies an explicit reaction with
//! a 0.5 visit factor. This pass also fills the per-neighbor scratch
//! (electrostatic tail, cutoff-function value/slope) consumed later by the
//! angular pass.

use super::{ConfigWorkspace, accumulate_stress, add_assign3, sub_assign3};
use crate::model::{Configuration, FittingProblem};
use crate::numerics::electrostatics::{self, COULOMB_PREFACTOR};
use crate::numerics::scale3;
use crate::table::{ChargeSet, PotentialTable};

pub(crate) fn accumulate(
    workspace: &mut ConfigWorkspace,
    problem: &FittingProblem,
    table: &PotentialTable,
    charges: Option<&ChargeSet>,
    config: &Configuration,
) {
    let use_forces = workspace.use_forces;
    let use_stress = workspace.use_stress;
    let charged = problem.electrostatics.as_ref().zip(charges);

    for local in 0..config.atom_count {
        let global = config.first_atom + local;
        let atom = &problem.atoms[global];

        for (n_index, neighbor) in atom.neighbors.iter().enumerate() {
            let pair_column = &table.columns[neighbor.pair_column];

            if neighbor.distance < pair_column.end {
                if use_forces {
                    let (value, gradient) = pair_column.evaluate_with_gradient(neighbor.pair_slot);
                    workspace.energy += 0.5 * value;
                    let force = scale3(neighbor.direction, gradient);
                    add_assign3(&mut workspace.forces[local], force);
                    if use_stress {
                        accumulate_stress(&mut workspace.stress, neighbor.displacement, force, 0.5);
                    }
                } else {
                    workspace.energy += 0.5 * pair_column.evaluate(neighbor.pair_slot);
                }
            }

            if let Some((model, charge_set)) = charged {
                let tail = electrostatics::tail(
                    model.form,
                    neighbor.distance,
                    charge_set.kappa,
                    model.cutoff,
                );
                workspace.neighbor_scratch[local][n_index].tail = tail;

                let q_own = charge_set.charges[atom.species];
                let q_partner = charge_set.charges[neighbor.species];
                // in small cells an atom can neighbor its own periodic image
                let is_self = neighbor.partner == global;

                if neighbor.distance < model.cutoff && (q_own != 0.0 || q_partner != 0.0) {
                    let mut value = q_own * q_partner * tail.value;
                    let mut gradient = q_own * q_partner * tail.gradient;

                    // a core-shell bonded column already carries the bare
                    // Coulomb share in its short-range spring
                    if pair_column.charge_weight == 0.0 && neighbor.distance <= pair_column.end {
                        value -= COULOMB_PREFACTOR * q_own * q_partner * neighbor.inv_distance;
                        gradient = 0.0;
                    }
                    if is_self {
                        value *= 0.5;
                        gradient *= 0.5;
                    }

                    workspace.energy += 0.5 * value;
                    if use_forces {
                        let force = scale3(neighbor.displacement, 0.5 * gradient);
                        add_assign3(&mut workspace.forces[local], force);
                        sub_assign3(
                            &mut workspace.forces[neighbor.partner - config.first_atom],
                            force,
                        );
                        if use_stress {
                            accumulate_stress(
                                &mut workspace.stress,
                                neighbor.displacement,
                                force,
                                1.0,
                            );
                        }
                    }
                }
            }

            let cutoff_column = &table.columns[neighbor.cutoff_column];
            if neighbor.distance < cutoff_column.end {
                let (value, slope) = cutoff_column.evaluate_with_gradient(neighbor.cutoff_slot);
                let scratch = &mut workspace.neighbor_scratch[local][n_index];
                scratch.cutoff_value = value;
                scratch.cutoff_slope = slope;
            }
        }
    }
}
