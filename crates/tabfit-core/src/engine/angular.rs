//! Three-body angular assembly, `f(r_ij)·f(r_ik)·g(cos θ_jik)`.
//!
//! Two passes per atom: the energy pass evaluates g and dg for every stored
//! triplet and caches them, the force pass then combines both legs' cutoff
//! functions and the cached angular slope into three force vectors whose
//! sum is zero. The cosine stored on the triplet is trusted to lie in the
//! angular column's domain; the force pass uses it to project the radial
//! share out of the angular gradient.

use super::{ConfigWorkspace, accumulate_stress, add_assign3, sub_assign3};
use crate::model::{Configuration, FittingProblem};
use crate::numerics::{add3, scale3};
use crate::table::PotentialTable;

pub(crate) fn accumulate(
    workspace: &mut ConfigWorkspace,
    problem: &FittingProblem,
    table: &PotentialTable,
    config: &Configuration,
) {
    let use_stress = workspace.use_stress;

    for local in 0..config.atom_count {
        let global = config.first_atom + local;
        let atom = &problem.atoms[global];
        let angular_column = &table.columns[table.angular_column_index(atom.species)];

        let mut angular_energy = 0.0;
        for (a_index, triplet) in atom.angles.iter().enumerate() {
            let leg_j = &atom.neighbors[triplet.first];
            let leg_k = &atom.neighbors[triplet.second];
            if leg_j.distance >= table.columns[leg_j.cutoff_column].end
                || leg_k.distance >= table.columns[leg_k.cutoff_column].end
            {
                continue;
            }
            let (value, slope) = angular_column.evaluate_with_gradient(triplet.slot);
            workspace.angle_scratch[local][a_index] = super::AngleScratch { value, slope };

            let f_j = workspace.neighbor_scratch[local][triplet.first].cutoff_value;
            let f_k = workspace.neighbor_scratch[local][triplet.second].cutoff_value;
            angular_energy += f_j * f_k * value;
        }
        workspace.energy += angular_energy;

        if !workspace.use_forces {
            continue;
        }

        for (a_index, triplet) in atom.angles.iter().enumerate() {
            let leg_j = &atom.neighbors[triplet.first];
            let leg_k = &atom.neighbors[triplet.second];
            if leg_j.distance >= table.columns[leg_j.cutoff_column].end
                || leg_k.distance >= table.columns[leg_k.cutoff_column].end
            {
                continue;
            }
            let cached = workspace.angle_scratch[local][a_index];
            let scratch_j = workspace.neighbor_scratch[local][triplet.first];
            let scratch_k = workspace.neighbor_scratch[local][triplet.second];

            // radial derivative along each leg, and the angular derivative
            // split into its two bond directions
            let radial_j = cached.value * scratch_j.cutoff_slope * scratch_k.cutoff_value;
            let radial_k = cached.value * scratch_j.cutoff_value * scratch_k.cutoff_slope;
            let angular = scratch_j.cutoff_value * scratch_k.cutoff_value * cached.slope;

            let lever_j = angular * leg_j.inv_distance;
            let lever_k = angular * leg_k.inv_distance;
            let along_j = radial_j - lever_j * triplet.cos_theta;
            let along_k = radial_k - lever_k * triplet.cos_theta;

            let force_j = add3(
                scale3(leg_j.direction, along_j),
                scale3(leg_k.direction, lever_j),
            );
            let force_k = add3(
                scale3(leg_k.direction, along_k),
                scale3(leg_j.direction, lever_k),
            );

            add_assign3(&mut workspace.forces[local], add3(force_j, force_k));
            sub_assign3(
                &mut workspace.forces[leg_j.partner - config.first_atom],
                force_j,
            );
            sub_assign3(
                &mut workspace.forces[leg_k.partner - config.first_atom],
                force_k,
            );

            if use_stress {
                accumulate_stress(&mut workspace.stress, leg_j.displacement, force_j, 1.0);
                accumulate_stress(&mut workspace.stress, leg_k.displacement, force_k, 1.0);
            }
        }
    }
}
