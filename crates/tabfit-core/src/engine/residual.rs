//! Final per-configuration pass: charge self-energies, normalization
//! against reference data, and the weighted squared sums.

use super::ConfigWorkspace;
use crate::domain::EvalOptions;
use crate::model::{Configuration, FittingProblem, ResidualLayout};
use crate::numerics::electrostatics;
use crate::numerics::{scale3, squared};
use crate::table::ChargeSet;

/// Floor added to the reference force magnitude before relative weighting,
/// keeping near-zero reference forces from blowing up the residual.
pub(crate) const FORCE_WEIGHT_FLOOR: f64 = 0.1;

pub(crate) fn finish(
    workspace: &mut ConfigWorkspace,
    problem: &FittingProblem,
    options: &EvalOptions,
    charges: Option<&ChargeSet>,
    config: &Configuration,
    config_index: usize,
    layout: ResidualLayout,
) -> f64 {
    let electrostatics_model = problem.electrostatics.as_ref().zip(charges);
    let mut sum = 0.0;

    for local in 0..config.atom_count {
        let atom = &problem.atoms[config.first_atom + local];

        if let Some((model, charge_set)) = electrostatics_model {
            let charge = charge_set.charges[atom.species];
            if charge != 0.0 {
                workspace.energy -=
                    electrostatics::self_energy(model.form, charge, charge_set.kappa, model.cutoff);
            }
        }

        if workspace.use_forces {
            if options.force_weighting {
                let scale = 1.0 / (FORCE_WEIGHT_FLOOR + atom.reference_force_norm);
                workspace.forces[local] = scale3(workspace.forces[local], scale);
            }
            if !options.filter_noncontributing || atom.contributes {
                let force = workspace.forces[local];
                sum += config.weight
                    * (squared(force[0]) + squared(force[1]) + squared(force[2]));
            }
        }
    }

    workspace.energy /= config.atom_count as f64;
    workspace.energy -= problem.references[layout.energy_slot(config_index)];
    sum += config.weight * options.energy_weight * squared(workspace.energy);

    if workspace.use_stress {
        let offset = layout.stress_slot(config_index);
        for component in 0..6 {
            workspace.stress[component] /= config.volume;
            workspace.stress[component] -= problem.references[offset + component];
            sum += config.weight * options.stress_weight * squared(workspace.stress[component]);
        }
    }

    sum
}
