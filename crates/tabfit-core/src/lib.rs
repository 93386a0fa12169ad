//! Force-matching evaluation engine for spline-tabulated interatomic
//! potentials.
//!
//! Given a tabulated potential (pair, cutoff-function, and angular columns,
//! optionally with monopole electrostatics) and a set of atomic
//! configurations with reference forces, energies, and stresses, the engine
//! computes the weighted sum of squared deviations that an outer optimizer
//! minimizes. Evaluation can run on a single process or on an SPMD group of
//! ranks coordinated through the [`comm::Communicator`] abstraction.

pub mod comm;
pub mod domain;
pub mod engine;
pub mod model;
pub mod numerics;
pub mod table;

pub use comm::{Communicator, SoloCommunicator, ThreadGroup};
pub use domain::{ControlFlag, EvalOptions, WorkerState};
pub use engine::{EngineError, EvaluationEngine, INVALID_RESIDUAL};
pub use model::{
    AngleTriplet, Atom, Configuration, ElectrostaticModel, FittingProblem, ModelError, Neighbor,
    ResidualBuffer, ResidualLayout,
};
pub use table::{
    AnalyticForm, AnalyticRule, ChargeSet, KnotGrid, ParamBounds, PotentialTable, SyncMode,
    TableColumn, TableError,
};
