//! Short-range monopole electrostatics: a screened Coulomb kernel and the
//! two cutoff-smoothed tail variants consumed by the pair assembler.
//!
//! Gradients follow the tabulation convention of the force kernels: the
//! `gradient` field is `(1/r)·dV/dr`, so multiplying it by the displacement
//! vector yields the force contribution directly.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Electrostatic prefactor e²/4πε₀ in eV·Å for charges in units of the
/// elementary charge.
pub const COULOMB_PREFACTOR: f64 = 14.399645;

/// Cutoff smoothing applied to the screened Coulomb interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TailForm {
    /// Energy-shifted Wolf truncation: the potential is continuous at the
    /// cutoff, the force jumps.
    Shifted,
    /// Damped shifted-force truncation: potential and force are both
    /// continuous at the cutoff.
    DampedShiftedForce,
}

/// Value, radial gradient (over r), and curvature of a tail function at one
/// distance.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TailSample {
    pub value: f64,
    pub gradient: f64,
    pub curvature: f64,
}

/// Bare screened kernel `k_e·erfc(κr)/r` with its gradient and curvature.
pub fn screened_kernel(r: f64, kappa: f64) -> TailSample {
    let r2 = r * r;
    let kappa2 = kappa * kappa;
    let prefactor = 2.0 * COULOMB_PREFACTOR * kappa / PI.sqrt();
    let gauss = (-r2 * kappa2).exp();

    let value = COULOMB_PREFACTOR * libm::erfc(kappa * r) / r;
    let gradient = (-value - prefactor * gauss) / r2;
    let curvature = (2.0 * kappa2 * prefactor * gauss - 3.0 * gradient) / r2;
    TailSample {
        value,
        gradient,
        curvature,
    }
}

/// Energy-shifted tail: zero value at the cutoff.
pub fn shifted_tail(r: f64, kappa: f64, cutoff: f64) -> TailSample {
    let at_r = screened_kernel(r, kappa);
    let at_cut = screened_kernel(cutoff, kappa);
    let range_shift = r * r - cutoff * cutoff;
    TailSample {
        value: at_r.value - at_cut.value - range_shift * at_cut.gradient / 2.0,
        gradient: at_r.gradient - at_cut.gradient,
        curvature: 0.0,
    }
}

/// Damped shifted-force tail: zero value and zero radial derivative at the
/// cutoff.
pub fn damped_shifted_force_tail(r: f64, kappa: f64, cutoff: f64) -> TailSample {
    let at_r = screened_kernel(r, kappa);
    let at_cut = screened_kernel(cutoff, kappa);
    TailSample {
        value: at_r.value - at_cut.value - (r - cutoff) * at_cut.gradient * cutoff,
        gradient: at_r.gradient - at_cut.gradient * cutoff / r,
        curvature: 0.0,
    }
}

/// Tail sample for the selected form.
pub fn tail(form: TailForm, r: f64, kappa: f64, cutoff: f64) -> TailSample {
    match form {
        TailForm::Shifted => shifted_tail(r, kappa, cutoff),
        TailForm::DampedShiftedForce => damped_shifted_force_tail(r, kappa, cutoff),
    }
}

/// Per-atom self-energy removed from a configuration's energy for each atom
/// carrying charge `q`.
pub fn self_energy(form: TailForm, charge: f64, kappa: f64, cutoff: f64) -> f64 {
    let qq = charge * charge;
    match form {
        TailForm::Shifted => COULOMB_PREFACTOR * kappa * qq / PI.sqrt(),
        TailForm::DampedShiftedForce => {
            let at_cut = screened_kernel(cutoff, kappa);
            qq * (COULOMB_PREFACTOR * kappa / PI.sqrt()
                + (at_cut.value - at_cut.gradient * cutoff * cutoff) * 0.5)
        }
    }
}
