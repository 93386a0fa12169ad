//! Shared vocabulary of the evaluation protocol: the control flags the
//! coordinator broadcasts, the worker state machine they drive, and the
//! runtime switches of one evaluation pass.

use serde::{Deserialize, Serialize};

/// Command broadcast by the coordinator at the top of every evaluation
/// round.
///
/// The raw encoding is part of the protocol: 1 terminates, 2 resynchronizes
/// the table layout before computing, and every other value (including 0)
/// requests a plain evaluation. Unknown values deliberately fall through to
/// [`ControlFlag::Evaluate`] so a coordinator running a newer protocol
/// revision cannot wedge older workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlFlag {
    Evaluate,
    Terminate,
    Resync,
}

impl ControlFlag {
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Terminate,
            2 => Self::Resync,
            _ => Self::Evaluate,
        }
    }

    pub const fn to_raw(self) -> i32 {
        match self {
            Self::Evaluate => 0,
            Self::Terminate => 1,
            Self::Resync => 2,
        }
    }
}

/// States of the long-lived worker loop.
///
/// Every rank sits in `AwaitingCommand` until a flag arrives, passes through
/// `Resyncing` when the table layout must be re-received, computes, and
/// returns to waiting; only `Terminated` leaves the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    AwaitingCommand,
    Resyncing,
    Computing,
    Terminated,
}

impl WorkerState {
    /// Transition taken when a command arrives in `AwaitingCommand`.
    pub const fn on_command(self, flag: ControlFlag) -> Self {
        match (self, flag) {
            (Self::Terminated, _) => Self::Terminated,
            (_, ControlFlag::Terminate) => Self::Terminated,
            (_, ControlFlag::Resync) => Self::Resyncing,
            (_, ControlFlag::Evaluate) => Self::Computing,
        }
    }

    /// Transition taken when the current phase finishes.
    pub const fn on_phase_complete(self) -> Self {
        match self {
            Self::Resyncing => Self::Computing,
            Self::Computing => Self::AwaitingCommand,
            other => other,
        }
    }
}

/// Runtime switches of one evaluation pass. All combinations are valid;
/// every path stays compiled and testable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalOptions {
    /// Global weight multiplied into every energy residual term.
    pub energy_weight: f64,
    /// Global weight multiplied into every stress residual term.
    pub stress_weight: f64,
    /// Accumulate and compare stress tensors at all.
    pub stress: bool,
    /// Divide each atom's force residual by its reference force magnitude.
    pub force_weighting: bool,
    /// Skip atoms flagged as non-contributing in the force residual sum.
    pub filter_noncontributing: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            energy_weight: 1.0,
            stress_weight: 1.0,
            stress: false,
            force_weighting: false,
            filter_noncontributing: false,
        }
    }
}
